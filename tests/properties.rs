//! Property-based invariants of the completion protocol.
//!
//! Case count defaults to a CI-friendly 32 and can be raised through
//! `STAGECRAFT_PROPTEST_CASES`.

mod common;

use common::{init_logging, proptest_cases};
use proptest::prelude::*;
use stagecraft::{completed, supply_async, Outcome, OutcomeCell, PanicPayload, Stage};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: proptest_cases(),
        ..ProptestConfig::default()
    }
}

/// One write attempt of an arbitrary outcome kind.
#[derive(Debug, Clone)]
enum Write {
    Value(i32),
    Err,
    Panic(String),
    Done,
}

fn write_strategy() -> impl Strategy<Value = Write> {
    prop_oneof![
        any::<i32>().prop_map(Write::Value),
        Just(Write::Err),
        "[a-z]{1,8}".prop_map(Write::Panic),
        Just(Write::Done),
    ]
}

fn apply(cell: &OutcomeCell<i32>, write: &Write) -> bool {
    match write {
        Write::Value(v) => cell.set_value(*v),
        Write::Err => cell.set_err(stagecraft::Error::cancelled()),
        Write::Panic(msg) => cell.set_panicked(PanicPayload::new(msg.clone())),
        Write::Done => cell.set_outcome(Outcome::Done),
    }
}

fn same_kind(a: &Outcome<i32>, b: &Outcome<i32>) -> bool {
    matches!(
        (a, b),
        (Outcome::Value(_), Outcome::Value(_))
            | (Outcome::Err(_), Outcome::Err(_))
            | (Outcome::Panicked(_), Outcome::Panicked(_))
            | (Outcome::Done, Outcome::Done)
    )
}

proptest! {
    #![proptest_config(config())]

    /// Writes after the first successful one are total no-ops; the
    /// visible outcome equals the first.
    #[test]
    fn first_writer_wins(writes in proptest::collection::vec(write_strategy(), 1..6)) {
        init_logging();
        let cell = OutcomeCell::new();

        prop_assert!(apply(&cell, &writes[0]));
        for later in &writes[1..] {
            prop_assert!(!apply(&cell, later));
        }

        let observed = cell.try_get().expect("filled");
        let expected = {
            let reference = OutcomeCell::new();
            apply(&reference, &writes[0]);
            reference.try_get().expect("filled")
        };
        prop_assert!(same_kind(&observed, &expected));
        if let (Outcome::Value(seen), Write::Value(first)) = (&observed, &writes[0]) {
            prop_assert_eq!(*seen, *first);
        }
    }

    /// A derived stage of a cancelled source observes Done, for any value.
    #[test]
    fn derived_of_done_is_done(value in any::<i32>()) {
        init_logging();
        let source = supply_async(
            move || {
                std::thread::sleep(std::time::Duration::from_millis(200));
                value
            },
            None,
        );
        source.cancel();
        let derived = source.then_apply(|n| n + 1);
        prop_assert!(derived.get().expect_err("done").is_cancelled());
    }

    /// The recover family is observable (filled) on a panicked source.
    #[test]
    fn recover_family_fills_on_panic(message in "[a-z]{1,12}") {
        init_logging();
        let make_failed = || -> Stage<i32> {
            let m = message.clone();
            supply_async(move || panic!("{m}"), None)
        };

        prop_assert_eq!(make_failed().exceptionally(|_| 7).get().expect("filled"), 7);
        prop_assert_eq!(
            make_failed().handle(|_, p| i32::from(p.is_some())).get().expect("filled"),
            1
        );
        let pass_through = make_failed().when_complete(|_, _| {});
        let caught = catch_unwind(AssertUnwindSafe(|| pass_through.get()));
        prop_assert!(caught.is_err());
    }

    /// Every other combinator inherits a panic without invoking its
    /// callback.
    #[test]
    fn non_recover_combinators_short_circuit(message in "[a-z]{1,12}") {
        init_logging();
        let m = message.clone();
        let failed: Stage<i32> = supply_async(move || panic!("{m}"), None);
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);

        let derived = failed.then_apply(move |n| {
            flag.store(true, Ordering::Release);
            n
        });

        let caught = catch_unwind(AssertUnwindSafe(|| derived.get())).expect_err("inherited");
        let payload = PanicPayload::from_panic(caught);
        prop_assert_eq!(payload.message(), message.as_str());
        prop_assert!(!invoked.load(Ordering::Acquire));
    }

    /// `get` called twice returns the same outcome both times.
    #[test]
    fn get_is_idempotent(value in any::<i32>()) {
        init_logging();
        let stage = completed(value);
        prop_assert_eq!(stage.get().expect("first"), value);
        prop_assert_eq!(stage.get().expect("second"), value);
    }

    /// Lazy `join` is idempotent: the producer runs once and both joins
    /// observe the same stage.
    #[test]
    fn lazy_join_is_idempotent(value in any::<i32>()) {
        init_logging();
        let runs = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&runs);
        let chain = stagecraft::lazy::supply_async(
            move || {
                assert!(!flag.swap(true, Ordering::SeqCst), "producer ran twice");
                value
            },
            None,
        );

        let first = chain.join();
        let second = chain.join();
        prop_assert_eq!(first.get().expect("value"), value);
        prop_assert_eq!(second.get().expect("value"), value);
    }

    /// External completion beats a slow producer for any injected value.
    #[test]
    fn external_completion_wins(value in any::<i32>()) {
        init_logging();
        let stage = supply_async(
            || {
                std::thread::sleep(std::time::Duration::from_millis(150));
                i32::MIN
            },
            None,
        );
        prop_assert!(stage.complete(value));
        prop_assert_eq!(stage.get().expect("value"), value);
    }
}
