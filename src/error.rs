//! The engine's typed error surface. Every fallible public operation
//! (`try_read`, `try_write`, `try_dispose`, `batch`'s flush) returns
//! [`ReactiveError`] rather than a boxed or stringly-typed error, the way
//! the teacher crate distinguishes its own handful of named failure modes
//! (e.g. `leptos_reactive`'s `SignalWriteError`/`SignalReadError`) instead
//! of reaching for `anyhow`.

use crate::node::NodeId;
use std::fmt;

/// One effect's failure during a single `batch`/flush drain.
#[derive(Debug, Clone)]
pub struct EffectFailureEntry {
    /// Debug label of the effect, if one was given at creation.
    pub name: Option<&'static str>,
    /// Human-readable description of what the closure panicked with.
    pub message: String,
}

impl fmt::Display for EffectFailureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "effect {name:?}: {}", self.message),
            None => write!(f, "effect: {}", self.message),
        }
    }
}

/// Everything that can go wrong observing or driving the reactive graph.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ReactiveError {
    /// A read (direct or transitive) observed a node that is currently
    /// mid-compute on the same call stack — a direct self-read or an
    /// indirect cycle such as A depending on B depending on A. The compute
    /// that discovered the cycle is rolled back to its prior edge
    /// snapshot; every in-flight compute between it and the outermost
    /// reader is likewise abandoned and rolled back as the failure
    /// unwinds.
    #[error("cycle detected in reactive graph")]
    Cycle,

    /// A computed's user closure panicked while recomputing. The computed
    /// keeps its previous value and edge snapshot; the failure is
    /// re-raised to the caller of `read`/`try_read`.
    #[error("compute closure panicked: {message}")]
    ComputeFailure { message: String },

    /// One or more effects panicked during a single flush. Each failing
    /// effect is marked clean (it will not be retried until one of its
    /// dependencies changes again) and the flush continues draining the
    /// rest of the queue; all failures from one flush are aggregated here.
    #[error("{} effect(s) panicked during flush", .0.len())]
    EffectFailure(Vec<EffectFailureEntry>),

    /// The handle's underlying node (or its whole runtime) has already
    /// been disposed.
    #[error("use of disposed reactive handle")]
    UseAfterDispose,

    /// An effect re-dirtied a node still pending dispatch in the same
    /// flush more times than the runtime's configured `max_refire`,
    /// without the queue ever draining — almost always a source written
    /// unconditionally from within its own transitive effect.
    #[error("exceeded max_refire ({limit}) without the effect queue draining")]
    MaxRefireExceeded { limit: u32 },
}

/// Internal panic payload raised by an infallible `read()` when the
/// compute it drove observed [`ReactiveError::Cycle`]. Never exposed
/// outside the crate; `recompute`/`try_read` catch and downcast it rather
/// than letting it escape as an opaque panic message.
#[derive(Debug)]
pub(crate) struct CyclePanic(pub(crate) NodeId);

/// Extracts a human-readable message from an arbitrary panic payload
/// (as produced by `std::panic::catch_unwind`), for embedding in
/// [`ReactiveError::ComputeFailure`] / [`EffectFailureEntry`].
pub(crate) fn describe_panic_payload(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
