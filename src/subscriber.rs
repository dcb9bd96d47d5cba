//! [`RuntimeId::subscribe`]: a restricted, single-target effect (§4.7,
//! §6). Unlike a general [`crate::Effect`], a subscriber always reads
//! exactly one target and only invokes its callback when that target's
//! value has actually changed since the subscriber last fired — the
//! attach itself fires synchronously with the current value, and every
//! later firing is batched like any other effect dispatch.

use crate::{
    computed::Computed,
    node::{AnyEffect, Node, NodeBody, NodeState},
    runtime::{with_runtime, RuntimeId},
    source::Source,
};
use std::{any::Any, cell::RefCell, rc::Rc};

/// A handle whose current value a [`RuntimeId::subscribe`] call can track:
/// implemented by [`Source`] and [`Computed`]. Not implemented for
/// [`crate::Effect`]/subscriber handles themselves, since those carry no
/// externally observable value to subscribe to.
pub trait Trackable<T> {
    /// Reads the current value, establishing a dependency edge exactly as
    /// the handle's own `read()` would.
    fn tracked_read(&self) -> T;

    /// This node's own configured equality. A subscriber gates its
    /// callback on this rather than `T: PartialEq` so that a target
    /// created with `source_with_equals`/`computed_with_equals` fires
    /// exactly when *its own* notion of "changed" (the same one that
    /// bumped its version) says so, not some unrelated comparison that
    /// could disagree with it.
    fn equals(&self, a: &T, b: &T) -> bool;
}

impl<T: Any + Clone> Trackable<T> for Source<T> {
    fn tracked_read(&self) -> T {
        self.read()
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        (self.equals_fn())(a, b)
    }
}

impl<T: Any + Clone> Trackable<T> for Computed<T> {
    fn tracked_read(&self) -> T {
        self.read()
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        (self.equals_fn())(a, b)
    }
}

struct SubscriberState<T, N, F> {
    target: N,
    callback: F,
    /// The value as of the last time `callback` fired, compared against
    /// a fresh read via the target's own `equals` (not `T: PartialEq`) so
    /// this tracks the target's `version` exactly: both `Source::write`
    /// and `Computed`'s recompute bump `version` iff that same `equals`
    /// reports a change, so comparing values through it here is
    /// equivalent to comparing versions directly.
    last_fired: RefCell<Option<T>>,
}

impl<T, N, F> AnyEffect for SubscriberState<T, N, F>
where
    T: Clone + 'static,
    N: Trackable<T>,
    F: Fn(&T),
{
    fn run(&self) {
        let value = self.target.tracked_read();
        let changed = match &*self.last_fired.borrow() {
            Some(prev) => !self.target.equals(prev, &value),
            None => true,
        };
        if changed {
            (self.callback)(&value);
        }
        *self.last_fired.borrow_mut() = Some(value);
    }

    fn run_cleanup_only(&self) {}
}

impl RuntimeId {
    /// Subscribes `callback` to `target`'s value. Fires once synchronously
    /// with the current value on attach; thereafter fires again only at a
    /// batch boundary where `target`'s value is confirmed to have changed
    /// (§4.7, scenario 4). Returns an idempotent `unsubscribe`. A failure
    /// during the mandatory initial attach-time read panics, since this
    /// method has no `Result` to surface it through.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    #[track_caller]
    pub fn subscribe<T, N>(self, target: N, callback: impl Fn(&T) + 'static) -> impl Fn()
    where
        T: Clone + 'static,
        N: Trackable<T> + 'static,
    {
        self.subscribe_impl(target, callback, None)
    }

    /// As [`RuntimeId::subscribe`], with a debug label attached up front
    /// (§6's diagnostics-only `name` option) — a subscriber only ever
    /// hands back its `unsubscribe` closure, so there's no handle to
    /// attach one to afterward.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    #[track_caller]
    pub fn subscribe_named<T, N>(
        self,
        name: &'static str,
        target: N,
        callback: impl Fn(&T) + 'static,
    ) -> impl Fn()
    where
        T: Clone + 'static,
        N: Trackable<T> + 'static,
    {
        self.subscribe_impl(target, callback, Some(name))
    }

    #[track_caller]
    fn subscribe_impl<T, N>(
        self,
        target: N,
        callback: impl Fn(&T) + 'static,
        name: Option<&'static str>,
    ) -> impl Fn()
    where
        T: Clone + 'static,
        N: Trackable<T> + 'static,
    {
        let compute: Rc<dyn AnyEffect> = Rc::new(SubscriberState {
            target,
            callback,
            last_fired: RefCell::new(None),
        });

        let (node, initial_result) = with_runtime(self, |rt| {
            let node = rt.nodes.borrow_mut().insert(Node {
                body: NodeBody::Subscriber {
                    compute: Rc::clone(&compute),
                },
                state: NodeState::Clean,
                version: 0,
                last_seen_clock: 0,
                inputs_head: None,
                inputs_tail: None,
                outputs_head: None,
                outputs_tail: None,
                queued: false,
                dirtied_while_computing: false,
                name,
                #[cfg(debug_assertions)]
                defined_at: std::panic::Location::caller(),
            });
            // Synchronous-on-attach (§9's open question, resolved): the
            // initial firing happens here, outside the effect queue. A
            // failure is routed through the same `on_error`/aggregate
            // path a later flush would use, never silently dropped
            // (§7/§9).
            let mut result = rt.run_initial(node);
            if rt.batch_depth.get() == 0 {
                let flush_result = rt.flush();
                if result.is_ok() {
                    result = flush_result;
                }
            }
            (node, result)
        })
        .expect("tried to create a subscriber on a disposed runtime");

        if let Err(err) = initial_result {
            panic!("RuntimeId::subscribe: {err}");
        }

        move || {
            let _ = with_runtime(self, |rt| rt.dispose_node(node));
        }
    }
}
