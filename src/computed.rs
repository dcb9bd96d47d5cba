//! [`Computed`]: a lazily-evaluated, cached derivation (§4.4) — the
//! engine's memo. Created `Dirty` so the first read performs the initial
//! compute, exactly as the teacher's `create_memo` inserts its node
//! already dirty "will be run the first time we ask for it".

use crate::{
    error::ReactiveError,
    node::{AnyComputation, Node, NodeBody, NodeKind, NodeState},
    runtime::{with_runtime, RuntimeId},
};
use std::{any::Any, cell::RefCell, marker::PhantomData, rc::Rc};

struct ComputedState<T, F> {
    f: F,
    equals: fn(&T, &T) -> bool,
    ty: PhantomData<fn() -> T>,
}

impl<T, F> AnyComputation for ComputedState<T, F>
where
    T: 'static,
    F: Fn(Option<&T>) -> T,
{
    fn run(&self, value: &Rc<RefCell<dyn Any>>) -> bool {
        let mut value = value.borrow_mut();
        let slot = value
            .downcast_mut::<Option<T>>()
            .expect("computed value type mismatch");
        let new_value = (self.f)(slot.as_ref());
        let changed = match slot.as_ref() {
            Some(prev) => !(self.equals)(prev, &new_value),
            None => true,
        };
        if changed {
            *slot = Some(new_value);
        }
        changed
    }
}

/// A lazily-evaluated, memoized derivation of one or more [`Source`]s or
/// other [`Computed`]s. `Copy`, `'static`. Recomputes at most once per
/// actual change of any transitive input (P8).
pub struct Computed<T> {
    runtime: RuntimeId,
    node: crate::node::NodeId,
    equals: fn(&T, &T) -> bool,
    ty: PhantomData<fn() -> T>,
    #[cfg(debug_assertions)]
    defined_at: &'static std::panic::Location<'static>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Computed<T> {}

impl RuntimeId {
    /// Creates a computed with `PartialEq::eq` as its equality gate.
    #[track_caller]
    pub fn computed<T>(self, f: impl Fn(Option<&T>) -> T + 'static) -> Computed<T>
    where
        T: Any + PartialEq,
    {
        self.computed_with_equals(f, T::eq)
    }

    /// Creates a computed with a caller-supplied equality gate.
    #[track_caller]
    pub fn computed_with_equals<T>(
        self,
        f: impl Fn(Option<&T>) -> T + 'static,
        equals: fn(&T, &T) -> bool,
    ) -> Computed<T>
    where
        T: Any,
    {
        let compute: Rc<dyn AnyComputation> = Rc::new(ComputedState {
            f,
            equals,
            ty: PhantomData,
        });

        let node = with_runtime(self, |rt| {
            rt.nodes.borrow_mut().insert(Node {
                body: NodeBody::Computed {
                    value: Rc::new(RefCell::new(None::<T>)) as Rc<RefCell<dyn Any>>,
                    compute,
                },
                // Memos are lazy: dirty until the first read forces them.
                state: NodeState::Dirty,
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
        .expect("tried to create a computed on a disposed runtime");

        Computed {
            runtime: self,
            node,
            equals,
            ty: PhantomData,
            #[cfg(debug_assertions)]
            defined_at: std::panic::Location::caller(),
        }
    }
}

impl<T: Any + Clone> Computed<T> {
    /// Brings the value up to date if necessary, subscribes the current
    /// observer, and returns a clone of it. Panics (propagating
    /// [`ReactiveError::Cycle`] or [`ReactiveError::ComputeFailure`] as a
    /// message) if validation or recompute failed; see [`Computed::try_read`]
    /// for a non-panicking form.
    #[track_caller]
    pub fn read(&self) -> T {
        self.try_read()
            .unwrap_or_else(|e| panic!("Computed::read: {e}"))
    }

    /// Fallible form of [`Computed::read`].
    pub fn try_read(&self) -> Result<T, ReactiveError> {
        with_runtime(self.runtime, |rt| -> Result<T, ReactiveError> {
            rt.require_live(self.node)?;
            rt.update_if_necessary(self.node)?;
            rt.track(self.node);
            let value = rt
                .nodes
                .borrow()
                .get(self.node)
                .and_then(|n| n.body.value())
                .ok_or(ReactiveError::UseAfterDispose)?;
            let value = value.borrow();
            let slot = value
                .downcast_ref::<Option<T>>()
                .expect("computed value type mismatch");
            Ok(slot.clone().expect("computed value missing after update"))
        })
        .map_err(|()| ReactiveError::UseAfterDispose)?
    }

    /// Reads the current cached value without subscribing the current
    /// observer. Still brings the value up to date first — `peek` skips
    /// *tracking*, not *validation*.
    pub fn peek(&self) -> T {
        with_runtime(self.runtime, |rt| -> Result<T, ReactiveError> {
            rt.require_live(self.node)?;
            rt.untracked(|| rt.update_if_necessary(self.node))?;
            let value = rt
                .nodes
                .borrow()
                .get(self.node)
                .and_then(|n| n.body.value())
                .ok_or(ReactiveError::UseAfterDispose)?;
            let value = value.borrow();
            let slot = value
                .downcast_ref::<Option<T>>()
                .expect("computed value type mismatch");
            Ok(slot.clone().expect("computed value missing after update"))
        })
        .expect("tried to peek a computed on a disposed runtime")
        .unwrap_or_else(|e| panic!("Computed::peek: {e}"))
    }
}

impl<T> Computed<T> {
    /// Permanently removes this computed from its runtime. Idempotent.
    pub fn dispose(&self) {
        let _ = with_runtime(self.runtime, |rt| rt.dispose_node(self.node));
    }

    /// This computed's own configured equality — exposed so a
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
        NodeKind::Computed
    }
}
