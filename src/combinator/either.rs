//! Binary race: act on whichever of two same-typed sources fills first.
//!
//! The first outcome *delivered* wins, whatever its kind: a panic that
//! arrives first short-circuits even if the other source would have
//! produced a value. When both are ready on the same tick the receiving
//! side's check order decides; callers must not rely on the tie-break.
//!
//! Both sources carry the same value type; the signatures enforce what a
//! dynamic implementation would check at registration.

use super::run_catching;
use crate::executor::ExecutorHandle;
use crate::stage::{submit_task, Stage};
use crate::types::{Canceller, Outcome, Unit};

impl<T: Clone + Send + 'static> Stage<T> {
    /// Derives a stage holding `f` of the first source to fill.
    ///
    /// # Example
    ///
    /// ```
    /// use stagecraft::{completed, supply_async};
    /// use std::time::Duration;
    ///
    /// let quick = completed(1);
    /// let slow = supply_async(
    ///     || {
    ///         std::thread::sleep(Duration::from_millis(200));
    ///         2
    ///     },
    ///     None,
    /// );
    /// let winner = quick.apply_to_either(&slow, |n| n * 100);
    /// assert_eq!(winner.get().unwrap(), 100);
    /// ```
    pub fn apply_to_either<U, F>(&self, other: &Stage<T>, f: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U,
    {
        let derived = Stage::derived(
            self.scope(),
            Canceller::joined(self.canceller(), other.canceller()),
        );
        let winner = self.cell().select(other.cell(), Some(self.scope()));
        let result = match winner {
            Outcome::Value(value) => run_catching(move || f(value)),
            other_outcome => other_outcome.inherit(),
        };
        derived.cell().set_outcome(result);
        self.mark_done();
        derived
    }

    /// Async form of [`apply_to_either`](Self::apply_to_either).
    pub fn apply_to_either_async<U, F>(
        &self,
        other: &Stage<T>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let derived: Stage<U> = Stage::derived(
            self.scope(),
            Canceller::joined(self.canceller(), other.canceller()),
        );
        let source = self.clone();
        let second_source = other.clone();
        let target = derived.clone();
        submit_task(executor, &derived, move || {
            let winner = source
                .cell()
                .select(second_source.cell(), Some(source.scope()));
            let result = match winner {
                Outcome::Value(value) => run_catching(move || f(value)),
                other_outcome => other_outcome.inherit(),
            };
            target.cell().set_outcome(result);
            source.mark_done();
        });
        derived
    }

    /// Derives a unit stage that consumes the first value to arrive.
    pub fn accept_either<F>(&self, other: &Stage<T>, f: F) -> Stage<Unit>
    where
        F: FnOnce(T),
    {
        self.apply_to_either(other, move |value| {
            f(value);
            Unit
        })
    }

    /// Async form of [`accept_either`](Self::accept_either).
    pub fn accept_either_async<F>(
        &self,
        other: &Stage<T>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> Stage<Unit>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.apply_to_either_async(
            other,
            move |value| {
                f(value);
                Unit
            },
            executor,
        )
    }

    /// Derives a unit stage that runs `f` once either source completes
    /// normally.
    pub fn run_after_either<F>(&self, other: &Stage<T>, f: F) -> Stage<Unit>
    where
        F: FnOnce(),
    {
        self.apply_to_either(other, move |_| {
            f();
            Unit
        })
    }

    /// Async form of [`run_after_either`](Self::run_after_either).
    pub fn run_after_either_async<F>(
        &self,
        other: &Stage<T>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> Stage<Unit>
    where
        F: FnOnce() + Send + 'static,
    {
        self.apply_to_either_async(
            other,
            move |_| {
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
    use crate::stage::supply_async;
    use crate::types::PanicPayload;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn sleepy(ms: u64, value: &'static str) -> Stage<String> {
        supply_async(
            move || {
                thread::sleep(Duration::from_millis(ms));
                value.to_string()
            },
            None,
        )
    }

    #[test]
    fn faster_source_wins() {
        let fast = sleepy(50, "Hello");
        let slow = sleepy(250, " world");

        let start = Instant::now();
        let winner = fast.apply_to_either(&slow, |s| s);
        assert_eq!(winner.get().expect("value"), "Hello");
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn faster_source_wins_from_the_other_side() {
        let slow = sleepy(250, "slow");
        let fast = sleepy(50, "fast");

        let winner = slow.apply_to_either(&fast, |s| s);
        assert_eq!(winner.get().expect("value"), "fast");
    }

    #[test]
    fn accept_either_consumes_the_winner() {
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        let stage = sleepy(30, "winner").accept_either(&sleepy(300, "loser"), move |s| {
            assert_eq!(s, "winner");
            flag.store(true, Ordering::Release);
        });
        stage.get().expect("unit");
        assert!(seen.load(Ordering::Acquire));
    }

    #[test]
    fn run_after_either_fires_on_first_completion() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let start = Instant::now();
        sleepy(30, "a")
            .run_after_either(&sleepy(400, "b"), move || flag.store(true, Ordering::Release))
            .get()
            .expect("unit");
        assert!(ran.load(Ordering::Acquire));
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn first_delivered_panic_short_circuits() {
        let failing: Stage<String> = supply_async(|| panic!("early failure"), None);
        let slow_ok = sleepy(300, "late value");

        let derived = failing.apply_to_either(&slow_ok, |s| s);
        let caught = catch_unwind(AssertUnwindSafe(|| derived.get())).expect_err("inherited");
        assert_eq!(PanicPayload::from_panic(caught).message(), "early failure");
    }

    #[test]
    fn async_race_does_not_block_the_caller() {
        let a = sleepy(150, "a");
        let b = sleepy(200, "b");

        let start = Instant::now();
        let winner = a.apply_to_either_async(&b, |s| s, None);
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(winner.get().expect("value"), "a");
    }

    #[test]
    fn cancelling_derived_cancels_both_racers() {
        let a = sleepy(400, "a");
        let b = sleepy(400, "b");
        let winner = a.apply_to_either_async(&b, |s| s, None);

        thread::sleep(Duration::from_millis(30));
        winner.cancel();

        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(winner.get().expect_err("done").is_cancelled());
    }
}
