//! Binary join: wait for two sources, combine or consume both results.
//!
//! The two outcomes are collected independently; a cancellation mid-wait
//! keeps whatever was already collected and marks the missing outcome
//! `Done`. When both sources fail, the first source's outcome wins (it is
//! checked first).
//!
//! Cancelling the derived stage fires *both* source triggers.

use super::run_catching;
use crate::executor::ExecutorHandle;
use crate::stage::{submit_task, Stage};
use crate::types::{Canceller, Outcome, Unit};

/// Combines two collected outcomes into the derived one, applying the
/// callback only when both carry values.
fn combine_outcomes<T, U, V, F>(first: Outcome<T>, second: Outcome<U>, f: F) -> Outcome<V>
where
    F: FnOnce(T, U) -> V,
{
    match (first, second) {
        (Outcome::Value(a), Outcome::Value(b)) => run_catching(move || f(a, b)),
        (Outcome::Value(_), failed) => failed.inherit(),
        (failed, _) => failed.inherit(),
    }
}

impl<T: Clone + Send + 'static> Stage<T> {
    /// Derives a stage holding `f` of both sources' values.
    ///
    /// # Example
    ///
    /// ```
    /// use stagecraft::completed;
    ///
    /// let left = completed("Hello".to_string());
    /// let right = completed(" world".to_string());
    /// let joined = left.then_combine(&right, |a, b| a + &b);
    /// assert_eq!(joined.get().unwrap(), "Hello world");
    /// ```
    pub fn then_combine<U, V, F>(&self, other: &Stage<U>, f: F) -> Stage<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V,
    {
        let derived = Stage::derived(
            self.scope(),
            Canceller::joined(self.canceller(), other.canceller()),
        );
        let (first, second) = self.cell().both(other.cell(), Some(self.scope()));
        derived.cell().set_outcome(combine_outcomes(first, second, f));
        self.mark_done();
        derived
    }

    /// Async form of [`then_combine`](Self::then_combine).
    pub fn then_combine_async<U, V, F>(
        &self,
        other: &Stage<U>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> Stage<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let derived: Stage<V> = Stage::derived(
            self.scope(),
            Canceller::joined(self.canceller(), other.canceller()),
        );
        let source = self.clone();
        let second_source = other.clone();
        let target = derived.clone();
        submit_task(executor, &derived, move || {
            let (first, second) = source
                .cell()
                .both(second_source.cell(), Some(source.scope()));
            target.cell().set_outcome(combine_outcomes(first, second, f));
            source.mark_done();
        });
        derived
    }

    /// Derives a unit stage that consumes both sources' values.
    pub fn then_accept_both<U, F>(&self, other: &Stage<U>, f: F) -> Stage<Unit>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T, U),
    {
        self.then_combine(other, move |a, b| {
            f(a, b);
            Unit
        })
    }

    /// Async form of [`then_accept_both`](Self::then_accept_both).
    pub fn then_accept_both_async<U, F>(
        &self,
        other: &Stage<U>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> Stage<Unit>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        self.then_combine_async(
            other,
            move |a, b| {
                f(a, b);
                Unit
            },
            executor,
        )
    }

    /// Derives a unit stage that runs `f` once both sources complete
    /// normally.
    pub fn run_after_both<U, F>(&self, other: &Stage<U>, f: F) -> Stage<Unit>
    where
        U: Clone + Send + 'static,
        F: FnOnce(),
    {
        self.then_combine(other, move |_, _| {
            f();
            Unit
        })
    }

    /// Async form of [`run_after_both`](Self::run_after_both).
    pub fn run_after_both_async<U, F>(
        &self,
        other: &Stage<U>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> Stage<Unit>
    where
        U: Clone + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.then_combine_async(
            other,
            move |_, _| {
                f();
                Unit
            },
            executor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{completed, supply_async};
    use crate::types::PanicPayload;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn combine_waits_for_the_slower_source() {
        let fast = supply_async(
            || {
                thread::sleep(Duration::from_millis(50));
                "Hello".to_string()
            },
            None,
        );
        let slow = supply_async(
            || {
                thread::sleep(Duration::from_millis(150));
                " world".to_string()
            },
            None,
        );

        let start = Instant::now();
        let joined = fast.then_combine(&slow, |a, b| a + &b);
        assert_eq!(joined.get().expect("value"), "Hello world");
        assert!(start.elapsed() >= Duration::from_millis(140));
    }

    #[test]
    fn combine_mixes_value_types() {
        let number = completed(7);
        let text = completed("x".to_string());
        let joined = number.then_combine(&text, |n, s| format!("{s}{n}"));
        assert_eq!(joined.get().expect("value"), "x7");
    }

    #[test]
    fn accept_both_consumes_both_values() {
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        let stage = completed(1).then_accept_both(&completed(2), move |a, b| {
            assert_eq!(a + b, 3);
            flag.store(true, Ordering::Release);
        });
        stage.get().expect("unit");
        assert!(seen.load(Ordering::Acquire));
    }

    #[test]
    fn run_after_both_runs_once_both_complete() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        completed(1)
            .run_after_both(&completed(2), move || flag.store(true, Ordering::Release))
            .get()
            .expect("unit");
        assert!(ran.load(Ordering::Acquire));
    }

    #[test]
    fn first_source_failure_wins_and_skips_callback() {
        let failing: Stage<i32> = supply_async(|| panic!("left broke"), None);
        let ok = completed(2);
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);

        let joined = failing.then_combine(&ok, move |a, b| {
            flag.store(true, Ordering::Release);
            a + b
        });

        let caught = catch_unwind(AssertUnwindSafe(|| joined.get())).expect_err("inherited");
        assert_eq!(PanicPayload::from_panic(caught).message(), "left broke");
        assert!(!invoked.load(Ordering::Acquire));
    }

    #[test]
    fn second_source_failure_is_inherited_not_the_first() {
        let ok = completed(1);
        let failing: Stage<i32> = supply_async(|| panic!("right broke"), None);

        let joined = ok.then_combine(&failing, |a, b| a + b);
        let caught = catch_unwind(AssertUnwindSafe(|| joined.get())).expect_err("inherited");
        assert_eq!(PanicPayload::from_panic(caught).message(), "right broke");
    }

    #[test]
    fn async_combine_does_not_block_the_caller() {
        let slow = supply_async(
            || {
                thread::sleep(Duration::from_millis(200));
                1
            },
            None,
        );
        let other = completed(2);

        let start = Instant::now();
        let joined = slow.then_combine_async(&other, |a, b| a + b, None);
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(joined.get().expect("value"), 3);
    }

    #[test]
    fn cancelling_derived_cancels_both_sources() {
        let left = supply_async(
            || {
                thread::sleep(Duration::from_millis(400));
                1
            },
            None,
        );
        let right = supply_async(
            || {
                thread::sleep(Duration::from_millis(400));
                2
            },
            None,
        );
        let joined = left.then_combine_async(&right, |a, b| a + b, None);

        thread::sleep(Duration::from_millis(30));
        joined.cancel();

        assert!(left.is_cancelled());
        assert!(right.is_cancelled());
        assert!(joined.get().expect_err("done").is_cancelled());
    }
}
