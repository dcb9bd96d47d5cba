//! The two traversals that keep the graph's `state`/`version` fields
//! consistent with property P3 (glitch-freedom): `mark_dirty` pushes
//! staleness forward from a changed producer to every transitive consumer
//! (promoting `Clean` to `Check` and queuing `Effect`/`Subscriber` nodes),
//! and `update_if_necessary` pulls a consumer up to date by validating its
//! inputs before recomputing, per the candidate/used discipline in
//! [`crate::track`].

use crate::{
    error::{describe_panic_payload, CyclePanic, ReactiveError},
    node::{NodeKind, NodeState},
    runtime::Runtime,
};
use std::panic::AssertUnwindSafe;

impl Runtime {
    fn set_state(&self, node: crate::node::NodeId, state: NodeState) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
            n.state = state;
            // Record the clock at which this node was last confirmed
            // up-to-date, purely as a diagnostic breadcrumb (not consulted
            // by any propagation decision, which goes entirely through
            // per-edge `producer_version_at_link` comparisons).
            if state == NodeState::Clean {
                n.last_seen_clock = self.clock.get();
            }
        }
    }

    /// Applies one step of the push phase to a single `consumer`: promotes
    /// it from `Clean` to `Check`, enqueuing it if it's an effect/subscriber
    /// not already queued. Returns whether the walk should continue past
    /// `consumer` to its own outputs.
    ///
    /// A consumer caught `Computing` (i.e. the write that reached it
    /// happened from inside its own in-flight compute — an effect writing
    /// to a source it transitively depends on, §9) is not marked here;
    /// instead `dirtied_while_computing` is set so that
    /// [`Runtime::recompute`]/[`Runtime::recompute_effect`] can re-apply
    /// this exact step once that compute finishes, the moment it is safe
    /// to do so. This is what turns a self-write during a compute into a
    /// bounded re-fire (§9, `MaxRefireExceeded`) instead of a silently
    /// dropped dirtying.
    fn mark_one(&self, consumer: crate::node::NodeId) -> bool {
        let (kind, state) = {
            let nodes = self.nodes.borrow();
            match nodes.get(consumer) {
                Some(n) => (n.kind(), n.state),
                None => return false,
            }
        };

        if state == NodeState::Computing {
            if let Some(n) = self.nodes.borrow_mut().get_mut(consumer) {
                n.dirtied_while_computing = true;
            }
            return false;
        }

        if state >= NodeState::Check {
            // Already marked (or disposed-adjacent); everything downstream
            // of it has already been visited or will be once its own
            // compute finishes.
            return false;
        }

        self.set_state(consumer, NodeState::Check);

        if matches!(kind, NodeKind::Effect | NodeKind::Subscriber) {
            let already_queued = self
                .nodes
                .borrow()
                .get(consumer)
                .map(|n| n.queued)
                .unwrap_or(false);
            if !already_queued {
                if let Some(n) = self.nodes.borrow_mut().get_mut(consumer) {
                    n.queued = true;
                }
                self.effect_queue.borrow_mut().push_back(consumer);
            }
        }

        true
    }

    /// Push phase (§4.5): walks `node`'s outputs, promoting clean consumers
    /// to `Check` and enqueuing effects/subscribers that are not already
    /// queued. Never recurses past a consumer already at `Check` or
    /// higher, since everything downstream of it is already marked or
    /// queued.
    ///
    /// Uses the runtime's `scratch_stack` instead of native recursion so a
    /// write at the root of a wide or deep fan-out graph can't overflow
    /// the call stack.
    pub(crate) fn mark_dirty(&self, node: crate::node::NodeId) {
        let mut stack = self.scratch_stack.borrow_mut();
        stack.clear();
        stack.push(node);

        while let Some(current) = stack.pop() {
            let outputs = self.collect_outputs(current);
            for edge_id in outputs {
                let consumer = self.edges.borrow()[edge_id].consumer;
                if self.mark_one(consumer) {
                    stack.push(consumer);
                }
            }
        }
    }

    /// Re-applies a dirtying that arrived while `node` was still
    /// `Computing` and was therefore deferred (see [`Runtime::mark_one`]).
    /// Called right after `node` settles into `Clean`, so the deferred
    /// push is indistinguishable from one that arrived a moment later.
    fn apply_deferred_self_dirty(&self, node: crate::node::NodeId) {
        let was_deferred = {
            let mut nodes = self.nodes.borrow_mut();
            match nodes.get_mut(node) {
                Some(n) if n.dirtied_while_computing => {
                    n.dirtied_while_computing = false;
                    true
                }
                _ => false,
            }
        };
        if was_deferred && self.mark_one(node) {
            self.mark_dirty(node);
        }
    }

    /// Pull phase (§4.6). Brings `node` up to date, returning once its
    /// state is `Clean` (nothing changed upstream) or it has recomputed.
    ///
    /// The walk is iterative and does not recurse on the native stack,
    /// whether the nodes along the way are `Check` (the common case when a
    /// write didn't actually change an upstream value) or freshly-created
    /// `Dirty` nodes (a long chain of computeds read for the first time,
    /// none of which have run yet). Either way a node's own producers are
    /// fully resolved to `Clean`/settled *before* that node's `recompute`
    /// is called, so the closure's own `read()` calls on them are O(1) —
    /// the only native recursion left is a closure calling back into this
    /// function for a producer this walk hasn't seen before, which cannot
    /// happen since every producer is pushed onto `stack` first.
    pub(crate) fn update_if_necessary(
        &self,
        node: crate::node::NodeId,
    ) -> Result<(), ReactiveError> {
        match self.state_of(node) {
            NodeState::Disposed => return Err(ReactiveError::UseAfterDispose),
            NodeState::Computing => std::panic::panic_any(CyclePanic(node)),
            NodeState::Clean => return Ok(()),
            NodeState::Dirty | NodeState::Check => {}
        }

        struct Frame {
            node: crate::node::NodeId,
            inputs: Vec<crate::edge::EdgeId>,
            idx: usize,
        }

        let mut stack: Vec<Frame> = vec![Frame {
            node,
            inputs: self.collect_inputs(node),
            idx: 0,
        }];

        'outer: while let Some(frame) = stack.last_mut() {
            while frame.idx < frame.inputs.len() {
                let edge_id = frame.inputs[frame.idx];
                let producer = self.edges.borrow()[edge_id].producer;

                match self.state_of(producer) {
                    NodeState::Computing => std::panic::panic_any(CyclePanic(producer)),
                    NodeState::Disposed => {
                        frame.idx += 1;
                        continue;
                    }
                    NodeState::Check | NodeState::Dirty => {
                        let inputs = self.collect_inputs(producer);
                        stack.push(Frame {
                            node: producer,
                            inputs,
                            idx: 0,
                        });
                        continue 'outer;
                    }
                    NodeState::Clean => {}
                }

                let (linked_version, current_version) = {
                    let edges = self.edges.borrow();
                    let nodes = self.nodes.borrow();
                    (
                        edges[edge_id].producer_version_at_link,
                        nodes[producer].version,
                    )
                };

                if linked_version != current_version {
                    self.set_state(frame.node, NodeState::Dirty);
                    break;
                }

                frame.idx += 1;
            }

            let finished = stack.pop().expect("frame present");
            match self.state_of(finished.node) {
                NodeState::Check => self.set_state(finished.node, NodeState::Clean),
                NodeState::Dirty => self.recompute(finished.node)?,
                _ => {}
            }
        }

        Ok(())
    }

    /// Runs a `Dirty` node's compute, bumping its version (and pushing
    /// staleness to its own consumers) only if the produced value
    /// actually differs under its configured equality (P8).
    ///
    /// Catches a panic raised by the closure (or by a nested infallible
    /// `read()` that discovered a cycle), rolls the compute back to its
    /// prior edge snapshot via [`Runtime::end_compute_err`], and reports
    /// [`ReactiveError::Cycle`] or [`ReactiveError::ComputeFailure`]
    /// accordingly — never leaving the node `Computing`.
    pub(crate) fn recompute(&self, node: crate::node::NodeId) -> Result<(), ReactiveError> {
        use crate::node::NodeBody;

        let compute = {
            let nodes = self.nodes.borrow();
            let n = nodes.get(node).ok_or(ReactiveError::UseAfterDispose)?;
            match &n.body {
                NodeBody::Computed { compute, .. } => compute.clone(),
                NodeBody::Effect { compute } | NodeBody::Subscriber { compute } => {
                    return self.recompute_effect(node, compute.clone());
                }
                NodeBody::Source { .. } => return Ok(()),
            }
        };

        let value = self
            .nodes
            .borrow()
            .get(node)
            .and_then(|n| n.body.value())
            .ok_or(ReactiveError::UseAfterDispose)?;

        self.set_state(node, NodeState::Computing);
        let guard = self.begin_compute(node);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| compute.run(&value)));

        match result {
            Ok(changed) => {
                self.end_compute_ok(guard);
                if changed {
                    let new_clock = self.clock.get() + 1;
                    self.clock.set(new_clock);
                    if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
                        n.version = new_clock;
                    }
                }
                self.set_state(node, NodeState::Clean);
                if changed {
                    self.mark_dirty(node);
                }
                self.apply_deferred_self_dirty(node);
                Ok(())
            }
            Err(payload) => {
                self.end_compute_err(guard);
                self.set_state(node, NodeState::Dirty);
                self.classify_panic(payload)
            }
        }
    }

    fn recompute_effect(
        &self,
        node: crate::node::NodeId,
        compute: std::rc::Rc<dyn crate::node::AnyEffect>,
    ) -> Result<(), ReactiveError> {
        self.set_state(node, NodeState::Computing);
        let guard = self.begin_compute(node);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| compute.run()));

        match result {
            Ok(()) => {
                self.end_compute_ok(guard);
                self.set_state(node, NodeState::Clean);
                self.apply_deferred_self_dirty(node);
                Ok(())
            }
            Err(payload) => {
                self.end_compute_err(guard);
                self.set_state(node, NodeState::Clean);
                self.classify_panic(payload)
            }
        }
    }

    /// Converts a caught panic payload into a typed error: our own
    /// [`CyclePanic`] marker becomes [`ReactiveError::Cycle`]; anything
    /// else (a genuine user panic, or an indirect cycle rethrown by a
    /// nested infallible `read()`) becomes [`ReactiveError::ComputeFailure`].
    fn classify_panic(&self, payload: Box<dyn std::any::Any + Send>) -> Result<(), ReactiveError> {
        match payload.downcast::<CyclePanic>() {
            Ok(_) => Err(ReactiveError::Cycle),
            Err(payload) => Err(ReactiveError::ComputeFailure {
                message: describe_panic_payload(payload.as_ref()),
            }),
        }
    }
}
