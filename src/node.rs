use crate::edge::EdgeId;
use std::{any::Any, cell::RefCell, rc::Rc};

slotmap::new_key_type! {
    /// Unique key assigned to a node (source, computed, effect, or subscriber)
    /// within a [`Runtime`](crate::Runtime)'s arena.
    pub struct NodeId;
}

/// What a node *is*. Kept as a plain tag rather than a trait object so that
/// the hot `state == Clean` check on the read fast path never has to go
/// through a vtable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Source,
    Computed,
    Effect,
    Subscriber,
}

/// A node's validity with respect to its transitive sources.
///
/// Ordered so that `state >= Dirty` is a cheap way to ask "do I need to
/// recompute", and so that `Runtime::mark` can use a plain `>` comparison
/// to avoid ever downgrading a node's staleness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum NodeState {
    Clean,
    Check,
    Dirty,
    Computing,
    Disposed,
}

/// The erased compute body of a [`Computed`](crate::Computed) node.
///
/// `run` downcasts `value` to the concrete `T`, invokes the user closure,
/// compares the result against the prior value with the node's configured
/// equality, stores the new value, and reports whether it changed. This
/// mirrors the teacher's `AnyComputation` trait (`leptos_reactive::effect::AnyComputation`),
/// generalized with an equality check for computeds (memos), not just effects.
pub(crate) trait AnyComputation {
    /// Invokes the user closure, compares the result against the prior
    /// value under the node's configured equality, and stores the new
    /// value if it differs. Returns whether the stored value changed.
    ///
    /// A panicking closure is expected to unwind straight out of this
    /// call; the caller (`Runtime::recompute`) is the one that wraps the
    /// invocation in `catch_unwind`, so this method itself never needs to
    /// catch anything.
    fn run(&self, value: &Rc<RefCell<dyn Any>>) -> bool;
}

/// The erased body of an [`Effect`](crate::Effect) or [`Subscriber`](crate::Subscriber).
///
/// Unlike `AnyComputation`, effects carry no externally observable "changed"
/// flag, but they do carry an optional cleanup callback that must run
/// immediately before the next invocation and on dispose.
pub(crate) trait AnyEffect {
    /// Runs the effect body, first invoking any pending cleanup. A
    /// panicking closure unwinds straight out of this call; the caller
    /// (`Runtime::recompute`) wraps the invocation in `catch_unwind`.
    fn run(&self);

    /// Runs only the cleanup left over from the previous invocation (or
    /// none, if it never ran, or none was registered).
    fn run_cleanup_only(&self);

    /// Routes a failure message to this node's configured `on_error` sink,
    /// if one was given at creation. Returns whether the failure was
    /// handled (and should therefore be excluded from the flush's
    /// aggregated [`crate::error::ReactiveError::EffectFailure`]).
    fn handle_error(&self, _message: &str) -> bool {
        false
    }
}

pub(crate) enum NodeBody {
    Source {
        value: Rc<RefCell<dyn Any>>,
    },
    Computed {
        value: Rc<RefCell<dyn Any>>,
        compute: Rc<dyn AnyComputation>,
    },
    Effect {
        compute: Rc<dyn AnyEffect>,
    },
    Subscriber {
        compute: Rc<dyn AnyEffect>,
    },
}

impl NodeBody {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Source { .. } => NodeKind::Source,
            NodeBody::Computed { .. } => NodeKind::Computed,
            NodeBody::Effect { .. } => NodeKind::Effect,
            NodeBody::Subscriber { .. } => NodeKind::Subscriber,
        }
    }

    pub(crate) fn value(&self) -> Option<Rc<RefCell<dyn Any>>> {
        match self {
            NodeBody::Source { value } | NodeBody::Computed { value, .. } => {
                Some(Rc::clone(value))
            }
            NodeBody::Effect { .. } | NodeBody::Subscriber { .. } => None,
        }
    }
}

/// The common node header described in the data model: kind, state, version,
/// the clock value at which it was last validated, and the head/tail of its
/// two intrusive edge lists.
pub(crate) struct Node {
    pub(crate) body: NodeBody,
    pub(crate) state: NodeState,
    pub(crate) version: u64,
    pub(crate) last_seen_clock: u64,
    pub(crate) inputs_head: Option<EdgeId>,
    pub(crate) inputs_tail: Option<EdgeId>,
    pub(crate) outputs_head: Option<EdgeId>,
    pub(crate) outputs_tail: Option<EdgeId>,
    /// Guards the effect queue's "at most once" invariant (P5/invariant 5).
    pub(crate) queued: bool,
    /// Set by [`crate::Runtime::mark_dirty`] when a write lands on this
    /// node while it is still `Computing` (an effect writing to a source
    /// it transitively depends on, §9). Consulted once the in-flight
    /// compute finishes so the self-dirtying is re-applied instead of
    /// silently lost — see `Runtime::mark_one`.
    pub(crate) dirtied_while_computing: bool,
    /// Debug label, ignored by the engine except for diagnostics.
    pub(crate) name: Option<&'static str>,
    #[cfg(debug_assertions)]
    pub(crate) defined_at: &'static std::panic::Location<'static>,
}

impl Node {
    pub(crate) fn kind(&self) -> NodeKind {
        self.body.kind()
    }

    pub(crate) fn is_consumer(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::Computed | NodeKind::Effect | NodeKind::Subscriber
        )
    }

    pub(crate) fn is_producer(&self) -> bool {
        matches!(self.kind(), NodeKind::Source | NodeKind::Computed)
    }
}
