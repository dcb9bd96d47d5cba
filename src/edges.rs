//! Intrusive doubly-linked list operations over the edge arena: splicing a
//! new edge onto the tail of a producer's outputs / consumer's inputs list,
//! and unlinking an edge from both. Kept separate from [`crate::edge`] (the
//! data definitions) and [`crate::track`] (the candidate/used reuse
//! discipline that calls these) to keep each file narrowly scoped, the way
//! the teacher crate splits `node.rs` from `runtime.rs`.

use crate::{
    edge::{Edge, EdgeId, EdgeMark},
    node::NodeId,
    runtime::Runtime,
};

impl Runtime {
    /// Appends a newly-allocated edge to the tail of `producer`'s outputs
    /// list and `consumer`'s inputs list. Insertion is always at the tail
    /// so that outputs preserve subscription order (P6) and inputs
    /// preserve read order.
    pub(crate) fn splice_edge(&self, edge_id: EdgeId, producer: NodeId, consumer: NodeId) {
        let mut edges = self.edges.borrow_mut();
        let mut nodes = self.nodes.borrow_mut();

        if let Some(producer_node) = nodes.get_mut(producer) {
            let prev_tail = producer_node.outputs_tail;
            edges[edge_id].prev_in_outputs = prev_tail;
            edges[edge_id].next_in_outputs = None;
            if let Some(prev_tail) = prev_tail {
                edges[prev_tail].next_in_outputs = Some(edge_id);
            } else {
                producer_node.outputs_head = Some(edge_id);
            }
            producer_node.outputs_tail = Some(edge_id);
        }

        if let Some(consumer_node) = nodes.get_mut(consumer) {
            let prev_tail = consumer_node.inputs_tail;
            edges[edge_id].prev_in_inputs = prev_tail;
            edges[edge_id].next_in_inputs = None;
            if let Some(prev_tail) = prev_tail {
                edges[prev_tail].next_in_inputs = Some(edge_id);
            } else {
                consumer_node.inputs_head = Some(edge_id);
            }
            consumer_node.inputs_tail = Some(edge_id);
        }
    }

    /// Removes `edge_id` from both of its lists (its producer's outputs
    /// and its consumer's inputs) without freeing the slot.
    pub(crate) fn unlink_edge(&self, edge_id: EdgeId) {
        let (producer, consumer, prev_out, next_out, prev_in, next_in) = {
            let edges = self.edges.borrow();
            let e = &edges[edge_id];
            (
                e.producer,
                e.consumer,
                e.prev_in_outputs,
                e.next_in_outputs,
                e.prev_in_inputs,
                e.next_in_inputs,
            )
        };

        let mut edges = self.edges.borrow_mut();
        let mut nodes = self.nodes.borrow_mut();

        match prev_out {
            Some(prev) => edges[prev].next_in_outputs = next_out,
            None => {
                if let Some(p) = nodes.get_mut(producer) {
                    p.outputs_head = next_out;
                }
            }
        }
        match next_out {
            Some(next) => edges[next].prev_in_outputs = prev_out,
            None => {
                if let Some(p) = nodes.get_mut(producer) {
                    p.outputs_tail = prev_out;
                }
            }
        }

        match prev_in {
            Some(prev) => edges[prev].next_in_inputs = next_in,
            None => {
                if let Some(c) = nodes.get_mut(consumer) {
                    c.inputs_head = next_in;
                }
            }
        }
        match next_in {
            Some(next) => edges[next].prev_in_inputs = prev_in,
            None => {
                if let Some(c) = nodes.get_mut(consumer) {
                    c.inputs_tail = prev_in;
                }
            }
        }
    }

    /// Unlinks and frees `edge_id`, returning its slot to the free list for
    /// the tracking discipline to reuse.
    pub(crate) fn unlink_and_free_edge(&self, edge_id: EdgeId) {
        self.unlink_edge(edge_id);
        self.free_edges.borrow_mut().push(edge_id);
    }

    /// Allocates a new edge from the free list if one is available,
    /// otherwise from the arena, and immediately splices it onto both
    /// lists.
    pub(crate) fn new_edge(
        &self,
        producer: NodeId,
        consumer: NodeId,
        producer_version_at_link: u64,
    ) -> EdgeId {
        let recycled = self.free_edges.borrow_mut().pop();
        let edge_id = match recycled {
            Some(id) => {
                let mut edges = self.edges.borrow_mut();
                edges[id] = Edge {
                    producer,
                    consumer,
                    producer_version_at_link,
                    mark: EdgeMark::Used,
                    prev_in_outputs: None,
                    next_in_outputs: None,
                    prev_in_inputs: None,
                    next_in_inputs: None,
                };
                id
            }
            None => self.edges.borrow_mut().insert(Edge {
                producer,
                consumer,
                producer_version_at_link,
                mark: EdgeMark::Used,
                prev_in_outputs: None,
                next_in_outputs: None,
                prev_in_inputs: None,
                next_in_inputs: None,
            }),
        };
        self.splice_edge(edge_id, producer, consumer);
        edge_id
    }

    /// Removes every inbound and outbound edge touching `node`, freeing
    /// each slot. Used by dispose (P7) and by cycle/failure rollback,
    /// which must revert a partially-rebuilt inputs list.
    pub(crate) fn unlink_all_edges_of(&self, node: NodeId) {
        let inputs: Vec<EdgeId> = self.collect_inputs(node);
        for e in inputs {
            self.unlink_and_free_edge(e);
        }
        let outputs: Vec<EdgeId> = self.collect_outputs(node);
        for e in outputs {
            self.unlink_and_free_edge(e);
        }
    }

    pub(crate) fn collect_inputs(&self, node: NodeId) -> Vec<EdgeId> {
        let mut out = Vec::new();
        let edges = self.edges.borrow();
        let nodes = self.nodes.borrow();
        let Some(n) = nodes.get(node) else {
            return out;
        };
        let mut cur = n.inputs_head;
        while let Some(id) = cur {
            out.push(id);
            cur = edges[id].next_in_inputs;
        }
        out
    }

    pub(crate) fn collect_outputs(&self, node: NodeId) -> Vec<EdgeId> {
        let mut out = Vec::new();
        let edges = self.edges.borrow();
        let nodes = self.nodes.borrow();
        let Some(n) = nodes.get(node) else {
            return out;
        };
        let mut cur = n.outputs_head;
        while let Some(id) = cur {
            out.push(id);
            cur = edges[id].next_in_outputs;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeBody};
    use std::{any::Any, cell::RefCell as StdRefCell, rc::Rc as StdRc};

    fn bare_node(rt: &Runtime) -> NodeId {
        rt.nodes.borrow_mut().insert(Node {
            body: NodeBody::Source {
                value: StdRc::new(StdRefCell::new(0_i32)) as StdRc<StdRefCell<dyn Any>>,
            },
            state: crate::node::NodeState::Clean,
            version: 0,
            last_seen_clock: 0,
            inputs_head: None,
            inputs_tail: None,
            outputs_head: None,
            outputs_tail: None,
            queued: false,
            dirtied_while_computing: false,
            name: None,
            #[cfg(debug_assertions)]
            defined_at: std::panic::Location::caller(),
        })
    }

    #[test]
    fn new_edge_preserves_insertion_order_on_both_lists() {
        let rt = Runtime::new();
        let p = bare_node(&rt);
        let c1 = bare_node(&rt);
        let c2 = bare_node(&rt);
        let c3 = bare_node(&rt);

        rt.new_edge(p, c1, 0);
        rt.new_edge(p, c2, 0);
        rt.new_edge(p, c3, 0);

        let outputs = rt.collect_outputs(p);
        let consumers: Vec<NodeId> = outputs.iter().map(|e| rt.edges.borrow()[*e].consumer).collect();
        assert_eq!(consumers, vec![c1, c2, c3]);
    }

    #[test]
    fn unlink_and_free_edge_removes_it_from_both_lists_and_recycles_the_slot() {
        let rt = Runtime::new();
        let p = bare_node(&rt);
        let c = bare_node(&rt);

        let edge = rt.new_edge(p, c, 0);
        assert_eq!(rt.collect_outputs(p), vec![edge]);
        assert_eq!(rt.collect_inputs(c), vec![edge]);

        rt.unlink_and_free_edge(edge);
        assert!(rt.collect_outputs(p).is_empty());
        assert!(rt.collect_inputs(c).is_empty());
        assert_eq!(*rt.free_edges.borrow(), vec![edge]);

        // A later allocation reuses the freed slot rather than growing the
        // arena.
        let reused = rt.new_edge(p, c, 0);
        assert_eq!(reused, edge);
        assert!(rt.free_edges.borrow().is_empty());
    }

    #[test]
    fn unlinking_a_middle_edge_reconnects_its_neighbors() {
        let rt = Runtime::new();
        let p = bare_node(&rt);
        let c1 = bare_node(&rt);
        let c2 = bare_node(&rt);
        let c3 = bare_node(&rt);

        rt.new_edge(p, c1, 0);
        let middle = rt.new_edge(p, c2, 0);
        rt.new_edge(p, c3, 0);

        rt.unlink_and_free_edge(middle);

        let outputs = rt.collect_outputs(p);
        let consumers: Vec<NodeId> = outputs.iter().map(|e| rt.edges.borrow()[*e].consumer).collect();
        assert_eq!(consumers, vec![c1, c3]);
    }
}
