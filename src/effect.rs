//! [`Effect`]: a side-effecting consumer (§4.7). Runs once immediately at
//! creation — tracking whatever it reads — and reruns whenever any of
//! those dependencies actually change, the same eager-dispatch contract
//! the teacher's `create_effect` gives its own effects, plus an optional
//! cleanup callback that runs immediately before the next invocation and
//! on dispose.

use crate::{
    node::{AnyEffect, Node, NodeBody, NodeState},
    runtime::{with_runtime, RuntimeId},
};
use std::{cell::RefCell, rc::Rc};

struct EffectState<F> {
    f: F,
    cleanup: RefCell<Option<Box<dyn FnOnce()>>>,
    on_error: Option<Box<dyn Fn(String)>>,
}

impl<F> AnyEffect for EffectState<F>
where
    F: Fn() -> Option<Box<dyn FnOnce()>>,
{
    fn run(&self) {
        self.run_cleanup_only();
        let next_cleanup = (self.f)();
        *self.cleanup.borrow_mut() = next_cleanup;
    }

    fn run_cleanup_only(&self) {
        if let Some(cleanup) = self.cleanup.borrow_mut().take() {
            cleanup();
        }
    }

    fn handle_error(&self, message: &str) -> bool {
        match &self.on_error {
            Some(sink) => {
                sink(message.to_string());
                true
            }
            None => false,
        }
    }
}

impl RuntimeId {
    /// Creates an effect, runs it once immediately, and returns a
    /// disposer. The closure may return a cleanup callback, invoked
    /// immediately before the next run and on dispose (§4.7's scoped
    /// cleanup). Failures — including one from this mandatory first run —
    /// are aggregated into the flush's
    /// [`crate::error::ReactiveError::EffectFailure`]; a failure from the
    /// first run specifically has nowhere to surface as a `Result` (this
    /// method returns a bare disposer), so it panics instead. Use
    /// [`RuntimeId::effect_with_error_handler`] to route them per-effect
    /// instead.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    #[track_caller]
    pub fn effect(self, f: impl Fn() -> Option<Box<dyn FnOnce()>> + 'static) -> impl FnOnce() {
        self.effect_impl(f, None, None)
    }

    /// As [`RuntimeId::effect`], but `on_error` is invoked with this
    /// effect's own failure message instead of letting it join the
    /// flush-wide aggregate (§6's `on_error` configuration option).
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    #[track_caller]
    pub fn effect_with_error_handler(
        self,
        f: impl Fn() -> Option<Box<dyn FnOnce()>> + 'static,
        on_error: impl Fn(String) + 'static,
    ) -> impl FnOnce() {
        self.effect_impl(f, Some(Box::new(on_error)), None)
    }

    /// As [`RuntimeId::effect`], with a debug label attached up front
    /// (§6's diagnostics-only `name` option) — there's no handle to attach
    /// one to afterward, since an effect only ever hands back its
    /// disposer.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    #[track_caller]
    pub fn effect_named(
        self,
        name: &'static str,
        f: impl Fn() -> Option<Box<dyn FnOnce()>> + 'static,
    ) -> impl FnOnce() {
        self.effect_impl(f, None, Some(name))
    }

    #[track_caller]
    fn effect_impl(
        self,
        f: impl Fn() -> Option<Box<dyn FnOnce()>> + 'static,
        on_error: Option<Box<dyn Fn(String)>>,
        name: Option<&'static str>,
    ) -> impl FnOnce() {
        let compute: Rc<dyn AnyEffect> = Rc::new(EffectState {
            f,
            cleanup: RefCell::new(None),
            on_error,
        });

        let (node, initial_result) = with_runtime(self, |rt| {
            let node = rt.nodes.borrow_mut().insert(Node {
                body: NodeBody::Effect {
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
            // Eager dispatch: run once now, outside of the effect queue,
            // so the caller observes its first side effect synchronously
            // and the node's initial dependency set is established. A
            // failure here is routed through this effect's own
            // `on_error` (or aggregated) exactly as a later flush would,
            // never silently dropped (§7/§9). If that first run wrote to
            // one of its own dependencies (§9), the resulting self-dirty
            // was deferred rather than dropped; flush now to apply it
            // immediately, matching the "writes outside a batch flush
            // right away" contract.
            let mut result = rt.run_initial(node);
            if rt.batch_depth.get() == 0 {
                let flush_result = rt.flush();
                if result.is_ok() {
                    result = flush_result;
                }
            }
            (node, result)
        })
        .expect("tried to create an effect on a disposed runtime");

        if let Err(err) = initial_result {
            panic!("RuntimeId::effect: {err}");
        }

        move || {
            let _ = with_runtime(self, |rt| {
                if let Some(n) = rt.nodes.borrow().get(node) {
                    if let NodeBody::Effect { compute } = &n.body {
                        compute.run_cleanup_only();
                    }
                }
                rt.dispose_node(node);
            });
        }
    }
}
