use reactive_core::{ReactiveError, RuntimeId};
use std::{cell::Cell, cell::RefCell, rc::Rc};

#[test]
fn diamond_recomputes_each_node_once_per_write() {
    let rt = RuntimeId::new();
    let s = rt.source(1);

    let l_runs = Rc::new(Cell::new(0));
    let r_runs = Rc::new(Cell::new(0));
    let b_runs = Rc::new(Cell::new(0));

    let l = {
        let l_runs = Rc::clone(&l_runs);
        rt.computed(move |_: Option<&i32>| {
            l_runs.set(l_runs.get() + 1);
            s.read() * 2
        })
    };
    let r = {
        let r_runs = Rc::clone(&r_runs);
        rt.computed(move |_: Option<&i32>| {
            r_runs.set(r_runs.get() + 1);
            s.read() + 1
        })
    };
    let b = {
        let b_runs = Rc::clone(&b_runs);
        rt.computed(move |_: Option<&i32>| {
            b_runs.set(b_runs.get() + 1);
            l.read() + r.read()
        })
    };

    assert_eq!(b.read(), 4);
    assert_eq!((l_runs.get(), r_runs.get(), b_runs.get()), (1, 1, 1));

    s.write(3);
    assert_eq!(b.read(), 9);
    // glitch-freedom (P4): b recomputed exactly once for this write, and
    // l/r each ran exactly once more, not twice.
    assert_eq!((l_runs.get(), r_runs.get(), b_runs.get()), (2, 2, 2));
}

#[test]
fn equality_gating_stops_propagation_at_an_unchanged_memo() {
    let rt = RuntimeId::new();
    let s = rt.source(10);

    let halves_runs = Rc::new(Cell::new(0));
    let out_runs = Rc::new(Cell::new(0));
    let effect_runs = Rc::new(Cell::new(0));

    let halves = {
        let halves_runs = Rc::clone(&halves_runs);
        rt.computed(move |_: Option<&i32>| {
            halves_runs.set(halves_runs.get() + 1);
            s.read() / 10
        })
    };
    let out = {
        let out_runs = Rc::clone(&out_runs);
        rt.computed(move |_: Option<&i32>| {
            out_runs.set(out_runs.get() + 1);
            halves.read() * 100
        })
    };
    let _keep_alive = {
        let effect_runs = Rc::clone(&effect_runs);
        rt.effect(move || {
            effect_runs.set(effect_runs.get() + 1);
            out.read();
            None
        })
    };

    assert_eq!(out_runs.get(), 1);
    assert_eq!(effect_runs.get(), 1);

    // Each write is outside a batch, so each flushes independently and
    // re-validates `halves` — but its output stays 1 every time, so `out`
    // (and the effect watching it) never recompute again (P8).
    s.write(11);
    s.write(12);
    s.write(13);

    assert!(halves_runs.get() >= 2);
    assert_eq!(out_runs.get(), 1);
    assert_eq!(effect_runs.get(), 1);
}

#[test]
fn batched_writes_fire_a_subscriber_at_most_once() {
    let rt = RuntimeId::new();
    let a = rt.source(0);
    let b = rt.source(0);
    let d = rt.source(0);
    let c = rt.computed(move |_: Option<&i32>| a.read() + b.read() + d.read());

    let calls: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let unsubscribe = {
        let calls = Rc::clone(&calls);
        rt.subscribe(c, move |v: &i32| calls.borrow_mut().push(*v))
    };
    // Subscribe fires synchronously on attach with the current value.
    assert_eq!(*calls.borrow(), vec![0]);

    rt.batch(|| {
        a.write(1);
        b.write(2);
        d.write(3);
    })
    .unwrap();

    assert_eq!(*calls.borrow(), vec![0, 6]);
    unsubscribe();
}

#[test]
fn subscribe_fires_once_on_attach_and_once_per_confirmed_change() {
    let rt = RuntimeId::new();
    let s = rt.source(5);
    let doubled = rt.computed(move |_: Option<&i32>| s.read() * 2);

    let calls: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let unsubscribe = {
        let calls = Rc::clone(&calls);
        rt.subscribe(doubled, move |v: &i32| calls.borrow_mut().push(*v))
    };
    assert_eq!(*calls.borrow(), vec![10]);

    s.write(5); // equal under PartialEq: no-op, no propagation at all
    assert_eq!(*calls.borrow(), vec![10]);

    s.write(6);
    assert_eq!(*calls.borrow(), vec![10, 12]);

    unsubscribe();
    s.write(100);
    assert_eq!(*calls.borrow(), vec![10, 12]); // no more callbacks after unsubscribe
}

#[test]
fn dynamic_dependencies_are_pruned_when_an_unread_branch_stops_being_read() {
    let rt = RuntimeId::new();
    let flag = rt.source(true);
    let a = rt.source(1);
    let b = rt.source(10);

    let runs = Rc::new(Cell::new(0));
    let c = {
        let runs = Rc::clone(&runs);
        rt.computed(move |_: Option<&i32>| {
            runs.set(runs.get() + 1);
            if flag.read() {
                a.read()
            } else {
                b.read()
            }
        })
    };

    assert_eq!(c.read(), 1);
    assert_eq!(runs.get(), 1);

    // b is not (yet) a dependency of c: writing it must not dirty c.
    b.write(20);
    assert_eq!(runs.get(), 1);

    flag.write(false);
    assert_eq!(c.read(), 20);
    assert_eq!(runs.get(), 2);

    // a was pruned from c's inputs by the compute above: writing it must
    // no longer cause c to recompute.
    a.write(999);
    assert_eq!(c.read(), 20);
    assert_eq!(runs.get(), 2);
}

#[test]
fn effect_cleanup_runs_before_rerun_and_on_dispose() {
    let rt = RuntimeId::new();
    let s = rt.source(0);
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let dispose = {
        let log = Rc::clone(&log);
        rt.effect(move || {
            let x = s.read();
            log.borrow_mut().push(format!("run({x})"));
            let log = Rc::clone(&log);
            Some(Box::new(move || log.borrow_mut().push(format!("cleanup({x})")))
                as Box<dyn FnOnce()>)
        })
    };

    assert_eq!(*log.borrow(), vec!["run(0)"]);

    s.write(5);
    assert_eq!(*log.borrow(), vec!["run(0)", "cleanup(0)", "run(5)"]);

    // Equal value: write is a no-op, no cleanup/rerun pair is produced.
    s.write(5);
    assert_eq!(log.borrow().len(), 3);

    s.write(9);
    assert_eq!(
        *log.borrow(),
        vec!["run(0)", "cleanup(0)", "run(5)", "cleanup(5)", "run(9)"]
    );

    dispose();
    assert_eq!(
        *log.borrow(),
        vec![
            "run(0)",
            "cleanup(0)",
            "run(5)",
            "cleanup(5)",
            "run(9)",
            "cleanup(9)"
        ]
    );
}

#[test]
fn dispose_is_idempotent_and_use_after_dispose_is_an_error() {
    let rt = RuntimeId::new();
    let s = rt.source(1);
    let c = rt.computed(move |_: Option<&i32>| s.read() * 2);
    assert_eq!(c.read(), 2);

    c.dispose();
    c.dispose(); // idempotent (P7)

    match c.try_read() {
        Err(ReactiveError::UseAfterDispose) => {}
        other => panic!("expected UseAfterDispose, got {other:?}"),
    }
}

#[test]
fn self_referencing_computed_reports_a_cycle() {
    let rt = RuntimeId::new();
    let slot: Rc<RefCell<Option<reactive_core::Computed<i32>>>> = Rc::new(RefCell::new(None));
    let slot_for_closure = Rc::clone(&slot);

    let c = rt.computed_with_equals(
        move |_: Option<&i32>| {
            let inner = *slot_for_closure.borrow().as_ref().unwrap();
            inner.read() + 1
        },
        i32::eq,
    );
    *slot.borrow_mut() = Some(c);

    match c.try_read() {
        Err(ReactiveError::Cycle) => {}
        other => panic!("expected Cycle, got {other:?}"),
    }
}

#[test]
fn effect_panics_are_captured_and_aggregated_into_flush() {
    let rt = RuntimeId::new();
    let s = rt.source(0);
    let _keep_alive = rt.effect(move || {
        if s.read() == 1 {
            panic!("boom");
        }
        None
    });

    match s.try_write(1) {
        Err(ReactiveError::EffectFailure(entries)) => assert_eq!(entries.len(), 1),
        other => panic!("expected EffectFailure, got {other:?}"),
    }
}

#[test]
fn on_error_routes_a_failure_away_from_the_aggregate() {
    let rt = RuntimeId::new();
    let s = rt.source(0);
    let errors: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let _keep_alive = {
        let errors = Rc::clone(&errors);
        rt.effect_with_error_handler(
            move || {
                if s.read() == 1 {
                    panic!("boom");
                }
                None
            },
            move |message| errors.borrow_mut().push(message),
        )
    };

    s.try_write(1).expect("handled failures do not surface as EffectFailure");
    assert_eq!(errors.borrow().len(), 1);
}

#[test]
fn an_effect_that_unconditionally_rewrites_its_own_source_is_bounded() {
    let rt = RuntimeId::new();
    rt.set_max_refire(4);
    let s = rt.source(0);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        rt.effect(move || {
            let v = s.read();
            s.write(v + 1);
            None
        })
    }));

    // Either the creation call panics via Source::write's infallible form,
    // or (if it somehow completed) a later flush would hit the bound — in
    // both cases the engine must not spin forever rewriting its own input.
    if let Ok(disposer) = result {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.write(s.peek() + 1);
        }));
        disposer();
    }
}

#[test]
fn revalidating_a_deep_chain_does_not_recurse_on_the_native_stack() {
    let rt = RuntimeId::new();
    let s = rt.source(0);

    // Materialize each link as it's created, so its dependency edge is
    // recorded immediately (one native frame deep at a time) rather than
    // leaving 10,000 never-run computeds to be discovered all at once.
    let mut current = rt.computed(move |_: Option<&i32>| s.read());
    current.read();
    for _ in 0..10_000 {
        let prev = current;
        current = rt.computed(move |_: Option<&i32>| prev.read() + 1);
        current.read();
    }

    assert_eq!(current.read(), 10_000);

    // Every one of those 10,000 edges is now established. A single write
    // at the root invalidates the whole chain; revalidating and
    // recomputing it end to end must walk the scratch stack, not the
    // native call stack.
    s.write(1);
    assert_eq!(current.read(), 10_001);
}

#[test]
fn update_mutates_in_place_and_always_notifies() {
    let rt = RuntimeId::new();
    let list = rt.source_with_equals(vec![1, 2, 3], |_a: &Vec<i32>, _b: &Vec<i32>| false);
    let runs = Rc::new(Cell::new(0));
    let sum = {
        let runs = Rc::clone(&runs);
        rt.computed(move |_: Option<&i32>| {
            runs.set(runs.get() + 1);
            list.read().iter().sum()
        })
    };

    assert_eq!(sum.read(), 6);
    list.update(|v| v.push(4));
    assert_eq!(sum.read(), 10);
    assert_eq!(runs.get(), 2);
}

#[test]
fn peek_does_not_establish_a_dependency() {
    let rt = RuntimeId::new();
    let s = rt.source(1);
    let runs = Rc::new(Cell::new(0));
    let c = {
        let runs = Rc::clone(&runs);
        rt.computed(move |_: Option<&i32>| {
            runs.set(runs.get() + 1);
            s.peek() * 10
        })
    };

    assert_eq!(c.read(), 10);
    s.write(2);
    // s.peek() never tracked s, so c was never marked Check.
    assert_eq!(c.read(), 10);
    assert_eq!(runs.get(), 1);
}
