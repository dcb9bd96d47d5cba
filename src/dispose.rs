//! Disposal (§4.9/P7): unlinking a node from the graph and releasing its
//! arena slot. Idempotent — disposing an already-disposed (or never
//! valid) node handle is a no-op, mirroring the teacher's own dispose
//! paths rather than panicking on a double-free.

use crate::{node::NodeId, runtime::Runtime};

impl Runtime {
    /// Removes every edge touching `node` (so neither a former producer
    /// nor a former consumer retains a dangling reference to it), then
    /// drops the node's own slot. Safe to call on a node that is
    /// mid-compute elsewhere on the stack only in the sense that it won't
    /// corrupt the arena — any in-flight `read()` of it will still
    /// observe `NodeState::Disposed` on its next state check and fail
    /// with `UseAfterDispose`.
    pub(crate) fn dispose_node(&self, node: NodeId) {
        if !self.nodes.borrow().contains_key(node) {
            return;
        }
        self.unlink_all_edges_of(node);
        self.nodes.borrow_mut().remove(node);

        let mut queue = self.effect_queue.borrow_mut();
        queue.retain(|&n| n != node);
    }
}
