//! [`Source`]: the mutable root of the graph (§4.2). A thin, `Copy`
//! handle over a node holding a plain value with no compute — `write`
//! is gated by an equality check (default `PartialEq::eq`) and otherwise
//! bumps the node's version and pushes staleness to its consumers, the
//! way the teacher's `WriteSignal::set` does for its own signals. `update`
//! mirrors the teacher's `SignalUpdate::update`: it does not auto-memoize
//! and always notifies, since the caller asked for a mutation in place.

use crate::{
    error::ReactiveError,
    node::{Node, NodeBody, NodeKind, NodeState},
    runtime::{with_runtime, RuntimeId},
};
use std::{any::Any, cell::RefCell, marker::PhantomData, rc::Rc};

/// A mutable reactive value. `Copy`, `'static`, cheap to pass around —
/// the actual value lives in its [`crate::Runtime`]'s arena, addressed by
/// `node`.
pub struct Source<T> {
    runtime: RuntimeId,
    node: crate::node::NodeId,
    equals: fn(&T, &T) -> bool,
    ty: PhantomData<fn() -> T>,
    #[cfg(debug_assertions)]
    defined_at: &'static std::panic::Location<'static>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Source<T> {}

impl RuntimeId {
    /// Creates a source with `PartialEq::eq` as its equality gate.
    #[track_caller]
    pub fn source<T: Any + PartialEq>(self, initial: T) -> Source<T> {
        self.source_with_equals(initial, T::eq)
    }

    /// Creates a source with a caller-supplied equality gate, for value
    /// types that don't implement `PartialEq` the way the caller wants
    /// (float tolerance, reference equality for large structures, etc).
    #[track_caller]
    pub fn source_with_equals<T: Any>(self, initial: T, equals: fn(&T, &T) -> bool) -> Source<T> {
        let node = with_runtime(self, |rt| {
            rt.nodes.borrow_mut().insert(Node {
                body: NodeBody::Source {
                    value: Rc::new(RefCell::new(initial)) as Rc<RefCell<dyn Any>>,
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
                name: None,
                #[cfg(debug_assertions)]
                defined_at: std::panic::Location::caller(),
            })
        })
        .expect("tried to create a source on a disposed runtime");

        Source {
            runtime: self,
            node,
            equals,
            ty: PhantomData,
            #[cfg(debug_assertions)]
            defined_at: std::panic::Location::caller(),
        }
    }
}

impl<T: Any + Clone> Source<T> {
    /// Reads the current value, subscribing the current observer (if
    /// any) to this source.
    #[track_caller]
    pub fn read(&self) -> T {
        self.try_read()
            .unwrap_or_else(|e| panic!("Source::read: {e}"))
    }

    /// Fallible form of [`Source::read`]; only fails if the source (or
    /// its runtime) has been disposed.
    pub fn try_read(&self) -> Result<T, ReactiveError> {
        with_runtime(self.runtime, |rt| -> Result<T, ReactiveError> {
            rt.require_live(self.node)?;
            rt.track(self.node);
            let value = rt
                .nodes
                .borrow()
                .get(self.node)
                .and_then(|n| n.body.value())
                .ok_or(ReactiveError::UseAfterDispose)?;
            let value = value.borrow();
            Ok(value
                .downcast_ref::<T>()
                .expect("source value type mismatch")
                .clone())
        })
        .map_err(|()| ReactiveError::UseAfterDispose)?
    }

    /// Reads the current value without subscribing the current observer
    /// (§4.2's `peek`).
    pub fn peek(&self) -> T {
        with_runtime(self.runtime, |rt| -> Result<T, ReactiveError> {
            rt.require_live(self.node)?;
            Ok(rt.untracked(|| {
                let value = rt
                    .nodes
                    .borrow()
                    .get(self.node)
                    .and_then(|n| n.body.value())
                    .expect("source value missing");
                let value = value.borrow();
                value
                    .downcast_ref::<T>()
                    .expect("source value type mismatch")
                    .clone()
            }))
        })
        .expect("tried to peek a source on a disposed runtime")
        .unwrap_or_else(|e| panic!("Source::peek: {e}"))
    }
}

impl<T: Any> Source<T> {
    /// Replaces the value. A no-op (no version bump, no propagation) if
    /// the new value equals the old one under this source's configured
    /// equality (P8).
    #[track_caller]
    pub fn write(&self, new_value: T) {
        self.try_write(new_value)
            .unwrap_or_else(|e| panic!("Source::write: {e}"))
    }

    pub fn try_write(&self, new_value: T) -> Result<(), ReactiveError> {
        let equals = self.equals;
        self.notify_if(move |slot| {
            let changed = !equals(slot, &new_value);
            if changed {
                *slot = new_value;
            }
            changed
        })
    }

    /// Mutates the value in place and always notifies, even if the
    /// mutation leaves the value equal to what it was — this does not
    /// auto-memoize the way [`Source::write`] does, matching the
    /// teacher's own `update`.
    #[track_caller]
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.try_update(f)
            .unwrap_or_else(|e| panic!("Source::update: {e}"))
    }

    pub fn try_update(&self, f: impl FnOnce(&mut T)) -> Result<(), ReactiveError> {
        self.notify_if(move |slot| {
            f(slot);
            true
        })
    }

    fn notify_if(&self, f: impl FnOnce(&mut T) -> bool) -> Result<(), ReactiveError> {
        with_runtime(self.runtime, |rt| -> Result<(), ReactiveError> {
            rt.require_live(self.node)?;
            let value = rt
                .nodes
                .borrow()
                .get(self.node)
                .and_then(|n| n.body.value())
                .ok_or(ReactiveError::UseAfterDispose)?;
            let changed = {
                let mut value = value.borrow_mut();
                let slot = value
                    .downcast_mut::<T>()
                    .expect("source value type mismatch");
                f(slot)
            };
            if changed {
                let new_clock = rt.clock.get() + 1;
                rt.clock.set(new_clock);
                if let Some(n) = rt.nodes.borrow_mut().get_mut(self.node) {
                    n.version = new_clock;
                }
                rt.mark_dirty(self.node);
                if rt.batch_depth.get() == 0 {
                    rt.flush()?;
                }
            }
            Ok(())
        })
        .map_err(|()| ReactiveError::UseAfterDispose)?
    }

    /// Permanently removes this source from its runtime. Idempotent.
    pub fn dispose(&self) {
        let _ = with_runtime(self.runtime, |rt| rt.dispose_node(self.node));
    }

    /// This source's own configured equality — exposed so a
    /// [`crate::RuntimeId::subscribe`] can gate its callback on the same
    /// notion of "changed" the node itself uses, instead of a separate
    /// `PartialEq` comparison that could diverge from it.
    pub(crate) fn equals_fn(&self) -> fn(&T, &T) -> bool {
        self.equals
    }

    /// Attaches a debug label, used only in `Debug` output and panic
    /// messages (§6's diagnostics-only `name` option) — never consulted by
    /// propagation.
    pub fn named(self, name: &'static str) -> Self {
        let _ = with_runtime(self.runtime, |rt| {
            if let Some(n) = rt.nodes.borrow_mut().get_mut(self.node) {
                n.name = Some(name);
            }
        });
        self
    }

    pub(crate) fn kind(&self) -> NodeKind {
        NodeKind::Source
    }
}
