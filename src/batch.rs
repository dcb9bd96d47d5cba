//! Batching (§4.5/§6): deferring the effect-queue drain across a run of
//! writes so that N writes inside one `batch` produce at most one pass
//! over each affected effect, instead of one pass per write.

use crate::{
    error::{EffectFailureEntry, ReactiveError},
    node::{AnyEffect, NodeBody, NodeId},
    runtime::Runtime,
};
use rustc_hash::FxHashMap;
use std::rc::Rc;

impl Runtime {
    /// Returns the effect/subscriber's erased compute body, if `node` is
    /// still live and is in fact an `Effect`/`Subscriber` node. Used by
    /// [`Runtime::flush`] to route a failure to a per-effect `on_error`
    /// sink before falling back to the aggregate.
    fn effect_compute(&self, node: NodeId) -> Option<Rc<dyn AnyEffect>> {
        match &self.nodes.borrow().get(node)?.body {
            NodeBody::Effect { compute } | NodeBody::Subscriber { compute } => {
                Some(Rc::clone(compute))
            }
            NodeBody::Source { .. } | NodeBody::Computed { .. } => None,
        }
    }

    /// Routes a failed effect/subscriber recompute through its own
    /// `on_error` sink, if one is configured. Returns `None` if the sink
    /// handled it, `Some` with the failure description otherwise. Shared
    /// by [`Runtime::flush`]'s per-item draining and by
    /// [`Runtime::run_initial`]'s eager first run, so a failure takes the
    /// same path to `on_error` (or the aggregate) no matter which of the
    /// two discovered it.
    fn route_effect_failure(&self, node: NodeId, err: ReactiveError) -> Option<EffectFailureEntry> {
        let message = match err {
            ReactiveError::Cycle => "cycle detected".to_string(),
            ReactiveError::ComputeFailure { message } => message,
            other => other.to_string(),
        };
        let handled = self
            .effect_compute(node)
            .map(|compute| compute.handle_error(&message))
            .unwrap_or(false);
        if handled {
            None
        } else {
            let name = self.nodes.borrow().get(node).and_then(|n| n.name);
            Some(EffectFailureEntry { name, message })
        }
    }

    /// Runs a freshly-created effect/subscriber node's mandatory eager
    /// first invocation (§4.7/§9's "never silently swallowed"), routing
    /// any failure through the same `on_error`/aggregate path `flush`
    /// uses rather than discarding it the way a bare `let _ =
    /// rt.recompute(node)` would. Returns a single-entry
    /// `ReactiveError::EffectFailure` (the same shape a later flush would
    /// raise) only when no `on_error` sink handled the failure; `effect`/
    /// `subscribe`'s infallible public surface then turns that into a
    /// panic, matching every other convenience method in this crate.
    pub(crate) fn run_initial(&self, node: NodeId) -> Result<(), ReactiveError> {
        if let Err(err) = self.recompute(node) {
            if let Some(entry) = self.route_effect_failure(node, err) {
                return Err(ReactiveError::EffectFailure(vec![entry]));
            }
        }
        Ok(())
    }

    /// Increments the batch nesting depth. Writes made while `batch_depth
    /// > 0` still push staleness immediately (§4.5's push phase is never
    /// deferred) but do not drain the effect queue — only the outermost
    /// `end_batch` does.
    pub(crate) fn begin_batch(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    /// Decrements the batch nesting depth and, if it reaches zero, drains
    /// the effect queue.
    pub(crate) fn end_batch(&self) -> Result<(), ReactiveError> {
        let depth = self.batch_depth.get() - 1;
        self.batch_depth.set(depth);
        if depth == 0 {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Runs `f` inside a batch, so that any writes it performs defer their
    /// effect dispatch until `f` returns. Nested batches compose: only the
    /// outermost one actually flushes.
    pub(crate) fn batch<T>(&self, f: impl FnOnce() -> T) -> Result<T, ReactiveError> {
        self.begin_batch();
        let value = f();
        self.end_batch()?;
        Ok(value)
    }

    /// Drains the effect queue in FIFO order, running each queued
    /// effect/subscriber exactly once per drain pass. An effect that
    /// writes to a source during its own run can re-enqueue further
    /// effects (including itself, transitively) — those are appended to
    /// the same queue and drained in the same pass, which is why this
    /// loop re-reads `effect_queue`'s length on every iteration rather
    /// than snapshotting it up front.
    ///
    /// Bounded by `max_refire`: a node queued more than that many times
    /// within one drain without the queue ever fully emptying indicates a
    /// source written unconditionally from its own transitive effect, and
    /// the drain aborts with [`ReactiveError::MaxRefireExceeded`] rather
    /// than looping forever.
    pub(crate) fn flush(&self) -> Result<(), ReactiveError> {
        let mut failures: Vec<EffectFailureEntry> = Vec::new();
        let mut refire_counts: FxHashMap<NodeId, u32> = FxHashMap::default();
        let limit = self.max_refire.get();

        loop {
            let next = self.effect_queue.borrow_mut().pop_front();
            let Some(node) = next else { break };

            if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
                n.queued = false;
            } else {
                continue;
            }

            let count = refire_counts.entry(node).or_insert(0);
            *count += 1;
            if *count > limit {
                return Err(ReactiveError::MaxRefireExceeded { limit });
            }

            if let Err(err) = self.update_if_necessary(node) {
                if let Some(entry) = self.route_effect_failure(node, err) {
                    failures.push(entry);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReactiveError::EffectFailure(failures))
        }
    }
}

impl crate::runtime::RuntimeId {
    /// Runs `f` inside a batch (§4.8/§6): any writes `f` performs defer
    /// their effect dispatch until `f` returns, so N writes to the same
    /// source produce at most one flush instead of N. Nested `batch`
    /// calls collapse into the outermost one. Returns `f`'s value,
    /// wrapped so a flush failure (`EffectFailure`, `MaxRefireExceeded`)
    /// is still reported to the caller even though `f` itself succeeded.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    pub fn batch<T>(self, f: impl FnOnce() -> T) -> Result<T, ReactiveError> {
        crate::runtime::with_runtime(self, |rt| rt.batch(f))
            .unwrap_or(Err(ReactiveError::UseAfterDispose))
    }
}
