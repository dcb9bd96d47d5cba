use crate::{
    edge::{Edge, EdgeId},
    error::ReactiveError,
    node::{Node, NodeId, NodeState},
};
use slotmap::SlotMap;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Default bound on how many times, within a single flush, an effect may
/// re-dirty a node that is itself still pending dispatch in the same
/// drain cycle. See the "Behavior when an effect writes to a source it
/// transitively depends on" open question in the spec's design notes.
pub const DEFAULT_MAX_REFIRE: u32 = 1_000;

/// The data structure that owns every node and edge belonging to one
/// reactive graph: the Context of the spec.
///
/// This is deliberately *not* a `thread_local static` by itself (see
/// [`RuntimeId`]) — a graph is addressed through a `Copy` key into a
/// thread-local table, exactly the way the teacher crate resolves a
/// `RuntimeId` through `with_runtime`, so that multiple independent graphs
/// (and, in tests, one graph per test) can coexist in the same thread
/// without any of them becoming an accidental process global.
pub(crate) struct Runtime {
    pub(crate) nodes: RefCell<SlotMap<NodeId, Node>>,
    pub(crate) edges: RefCell<SlotMap<EdgeId, Edge>>,
    /// Disposed/pruned edge slots, recycled by the tracking discipline
    /// instead of letting the slotmap's own free list be the only reuse
    /// mechanism — this keeps edge churn in dynamic-dependency workloads
    /// (spec scenario 5) from touching the allocator at all.
    pub(crate) free_edges: RefCell<Vec<EdgeId>>,

    pub(crate) observer: Cell<Option<NodeId>>,
    /// The producer most recently tracked by the current compute, so that
    /// re-reading the same source/computed twice in a row is a no-op
    /// (§4.3 step 1).
    pub(crate) last_tracked: Cell<Option<NodeId>>,
    /// One frame per nested in-flight compute, holding the edges that
    /// compute allocated fresh (as opposed to reusing a candidate) — used
    /// to roll a failed compute back to its prior snapshot (§7).
    pub(crate) new_edges_stack: RefCell<Vec<Vec<EdgeId>>>,
    pub(crate) batch_depth: Cell<u32>,
    pub(crate) clock: Cell<u64>,
    /// FIFO order of pending effect/subscriber dispatch, preserving
    /// subscription order (P6) even when effects re-enqueue each other.
    pub(crate) effect_queue: RefCell<VecDeque<NodeId>>,
    /// Reusable stack for the push/pull traversals, so that neither one
    /// recurses on the native call stack for deep dependency chains.
    pub(crate) scratch_stack: RefCell<Vec<NodeId>>,
    pub(crate) max_refire: Cell<u32>,
}

impl Runtime {
    pub(crate) fn new() -> Self {
        Self {
            nodes: RefCell::new(SlotMap::with_key()),
            edges: RefCell::new(SlotMap::with_key()),
            free_edges: RefCell::new(Vec::new()),
            observer: Cell::new(None),
            last_tracked: Cell::new(None),
            new_edges_stack: RefCell::new(Vec::new()),
            batch_depth: Cell::new(0),
            clock: Cell::new(0),
            effect_queue: RefCell::new(VecDeque::new()),
            scratch_stack: RefCell::new(Vec::new()),
            max_refire: Cell::new(DEFAULT_MAX_REFIRE),
        }
    }

    pub(crate) fn state_of(&self, node: NodeId) -> NodeState {
        match self.nodes.borrow().get(node) {
            None => NodeState::Disposed,
            Some(n) => n.state,
        }
    }

    pub(crate) fn require_live(&self, node: NodeId) -> Result<(), ReactiveError> {
        if self.state_of(node) == NodeState::Disposed {
            Err(ReactiveError::UseAfterDispose)
        } else {
            Ok(())
        }
    }

    pub(crate) fn with_observer<T>(&self, observer: NodeId, f: impl FnOnce() -> T) -> T {
        let prev = self.observer.take();
        self.observer.set(Some(observer));
        let result = f();
        self.observer.set(prev);
        result
    }

    /// Runs `f` with no current observer, so reads inside it are untracked.
    pub(crate) fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        let prev = self.observer.take();
        let result = f();
        self.observer.set(prev);
        result
    }
}

slotmap::new_key_type! {
    /// A `Copy` handle addressing one [`Runtime`]. This is the engine's
    /// "Context" handle: creating sources, computeds, effects, and
    /// subscribers, plus running `batch`, all go through it.
    pub struct RuntimeId;
}

thread_local! {
    static RUNTIMES: RefCell<SlotMap<RuntimeId, Runtime>> = RefCell::new(SlotMap::with_key());
}

/// Resolves a [`RuntimeId`] against the thread-local runtime table.
///
/// Returns `Err` if the runtime has already been disposed — every public
/// operation on a handle goes through this and turns that into
/// [`ReactiveError::UseAfterDispose`] (or an equivalent panic for the
/// infallible convenience methods), mirroring the teacher's
/// `with_runtime`/`RUNTIMES` pair.
pub(crate) fn with_runtime<T>(id: RuntimeId, f: impl FnOnce(&Runtime) -> T) -> Result<T, ()> {
    RUNTIMES.with(|runtimes| {
        let runtimes = runtimes.borrow();
        match runtimes.get(id) {
            None => Err(()),
            Some(runtime) => Ok(f(runtime)),
        }
    })
}

impl RuntimeId {
    /// Creates a new, empty reactive graph.
    pub fn new() -> Self {
        RUNTIMES.with(|runtimes| runtimes.borrow_mut().insert(Runtime::new()))
    }

    /// Configures the maximum number of times, within one flush, an effect
    /// may re-dirty a node still pending dispatch in the same drain cycle,
    /// before the engine gives up and returns
    /// [`ReactiveError::MaxRefireExceeded`] instead of looping forever.
    pub fn set_max_refire(self, max: u32) {
        let _ = with_runtime(self, |rt| rt.max_refire.set(max));
    }

    /// Disposes every node in this graph and removes it from the
    /// thread-local table. Idempotent: disposing an already-disposed (or
    /// never-created) runtime is a no-op.
    pub fn dispose(self) {
        RUNTIMES.with(|runtimes| {
            runtimes.borrow_mut().remove(self);
        });
    }
}

impl Default for RuntimeId {
    fn default() -> Self {
        Self::new()
    }
}
