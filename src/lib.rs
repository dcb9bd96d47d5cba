//! A fine-grained reactive graph: mutable [`Source`]s, derived
//! [`Computed`]s, and side-effecting effects/subscribers, wired into a
//! dependency graph that a write keeps consistent with minimal work — a
//! [`Computed`] recomputes only when a transitively reachable [`Source`]
//! has changed *and* it is actually observed, and every recomputation sees
//! a coherent snapshot of its inputs.
//!
//! ```
//! use reactive_core::RuntimeId;
//!
//! let rt = RuntimeId::new();
//! let count = rt.source(1);
//! let doubled = rt.computed(move |_| count.read() * 2);
//! assert_eq!(doubled.read(), 2);
//! count.write(21);
//! assert_eq!(doubled.read(), 42);
//! ```
//!
//! The engine is single-threaded and synchronous by design: every
//! [`RuntimeId`] and node handle is `!Send`/`!Sync`, addressed through a
//! thread-local table rather than shared across threads. See `DESIGN.md`
//! for the grounding of each module and the open questions this
//! implementation decided.

mod batch;
mod computed;
mod dispose;
mod edge;
mod edges;
mod effect;
mod error;
mod node;
mod propagate;
mod runtime;
mod source;
mod subscriber;
mod track;

pub use computed::Computed;
pub use error::{EffectFailureEntry, ReactiveError};
pub use runtime::{RuntimeId, DEFAULT_MAX_REFIRE};
pub use source::Source;
pub use subscriber::Trackable;
