//! The edge candidate/used reuse discipline described in §4.3: rather than
//! discarding a consumer's prior inputs list on every recompute, the engine
//! marks each existing edge `Candidate`, lets the compute re-`Used` the
//! ones it still reads, allocates only for genuinely new producers, and
//! prunes whatever stayed `Candidate` once the compute finishes.

use crate::{
    edge::EdgeId,
    edge::EdgeMark,
    node::NodeId,
    runtime::Runtime,
};

/// Bookkeeping for one in-flight compute, returned by
/// [`Runtime::begin_compute`] and consumed by
/// [`Runtime::end_compute_ok`]/[`Runtime::end_compute_err`].
pub(crate) struct ComputeGuard {
    consumer: NodeId,
    prev_observer: Option<NodeId>,
    prev_last_tracked: Option<NodeId>,
}

impl Runtime {
    /// Enters a compute for `consumer`: marks its prior inputs `Candidate`,
    /// installs it as the current observer, and opens a fresh frame to
    /// record genuinely-new edges allocated during this attempt (needed so
    /// a failed attempt can be rolled back precisely, per §7).
    pub(crate) fn begin_compute(&self, consumer: NodeId) -> ComputeGuard {
        for edge_id in self.collect_inputs(consumer) {
            self.edges.borrow_mut()[edge_id].mark = EdgeMark::Candidate;
        }
        self.new_edges_stack.borrow_mut().push(Vec::new());
        let prev_observer = self.observer.replace(Some(consumer));
        let prev_last_tracked = self.last_tracked.replace(None);
        ComputeGuard {
            consumer,
            prev_observer,
            prev_last_tracked,
        }
    }

    /// Finishes a successful compute: prunes whichever input edges are
    /// still marked `Candidate` (i.e. were not re-read this time) and
    /// restores the outer observer.
    pub(crate) fn end_compute_ok(&self, guard: ComputeGuard) {
        let stale: Vec<EdgeId> = {
            let edges = self.edges.borrow();
            self.collect_inputs(guard.consumer)
                .into_iter()
                .filter(|id| edges[*id].mark == EdgeMark::Candidate)
                .collect()
        };
        for edge_id in stale {
            self.unlink_and_free_edge(edge_id);
        }
        self.new_edges_stack.borrow_mut().pop();
        self.observer.set(guard.prev_observer);
        self.last_tracked.set(guard.prev_last_tracked);
    }

    /// Aborts a failed compute (cycle or compute failure): removes only the
    /// edges that were freshly allocated during this attempt, leaving the
    /// prior snapshot's edges exactly as they were (their `Candidate`
    /// marker is inert outside of a compute and will be reset on the next
    /// attempt). Restores the outer observer.
    pub(crate) fn end_compute_err(&self, guard: ComputeGuard) {
        if let Some(new_edges) = self.new_edges_stack.borrow_mut().pop() {
            for edge_id in new_edges {
                self.unlink_and_free_edge(edge_id);
            }
        }
        self.observer.set(guard.prev_observer);
        self.last_tracked.set(guard.prev_last_tracked);
    }

    /// Called on every producer read. If there is a current observer,
    /// ensures an edge from `producer` to it exists, reusing a candidate
    /// edge from the observer's previous compute when possible.
    pub(crate) fn track(&self, producer: NodeId) {
        let Some(consumer) = self.observer.get() else {
            return;
        };

        // Fast path: the most-recently tracked producer in this compute is
        // the same one being read again (e.g. a value read twice in a
        // row) — nothing to do.
        if self.last_tracked.get() == Some(producer) {
            return;
        }

        let producer_version = match self.nodes.borrow().get(producer) {
            Some(n) => n.version,
            None => return,
        };

        if let Some(edge_id) = self.find_candidate_or_used_input(consumer, producer) {
            let mut edges = self.edges.borrow_mut();
            edges[edge_id].mark = EdgeMark::Used;
            edges[edge_id].producer_version_at_link = producer_version;
        } else {
            let edge_id = self.new_edge(producer, consumer, producer_version);
            if let Some(frame) = self.new_edges_stack.borrow_mut().last_mut() {
                frame.push(edge_id);
            }
        }

        self.last_tracked.set(Some(producer));
    }

    /// Finds an existing edge from `producer` to `consumer` among
    /// `consumer`'s current inputs, whatever its mark.
    fn find_candidate_or_used_input(&self, consumer: NodeId, producer: NodeId) -> Option<EdgeId> {
        let edges = self.edges.borrow();
        let nodes = self.nodes.borrow();
        let mut cur = nodes.get(consumer)?.inputs_head;
        while let Some(id) = cur {
            if edges[id].producer == producer {
                return Some(id);
            }
            cur = edges[id].next_in_inputs;
        }
        None
    }
}
