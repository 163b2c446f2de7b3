//! Flat-map: a combinator whose callback returns another stage.
//!
//! The sync form hands the inner stage straight back once the source
//! produces a value. The async form resolves the inner stage inside the
//! submitted task and the derived cell adopts the inner outcome; the wait
//! on the inner stage is governed by the derived scope, so cancelling the
//! composed stage interrupts a chain of compositions at whatever depth it
//! has reached.
//!
//! Cancellation linkage: the derived trigger fires the outer source's
//! trigger always, and the inner stage's trigger once the callback has
//! produced it (late-bound slot).

use crate::executor::ExecutorHandle;
use crate::stage::{submit_task, Stage};
use crate::types::cancel::LateCanceller;
use crate::types::{Canceller, Outcome, PanicPayload};
use std::panic::{catch_unwind, AssertUnwindSafe};

impl<T: Clone + Send + 'static> Stage<T> {
    /// Derives a stage from the stage returned by `f`.
    ///
    /// Samples the source on the calling thread; a value source yields the
    /// callback's stage directly, a failed source yields a stage carrying
    /// the inherited outcome.
    ///
    /// # Example
    ///
    /// ```
    /// use stagecraft::{completed, supply_async};
    ///
    /// let stage = completed(2)
    ///     .then_compose(|n| supply_async(move || n * 10, None));
    /// assert_eq!(stage.get().unwrap(), 20);
    /// ```
    pub fn then_compose<U, F>(&self, f: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Stage<U>,
    {
        let derived: Stage<U> = Stage::derived(self.scope(), self.canceller().clone());
        match self.sample() {
            Outcome::Value(value) => match catch_unwind(AssertUnwindSafe(move || f(value))) {
                Ok(inner) => {
                    self.mark_done();
                    return inner;
                }
                Err(panic) => {
                    derived
                        .cell()
                        .set_panicked(PanicPayload::from_panic(panic));
                }
            },
            other => {
                derived.cell().set_outcome(other.inherit());
            }
        }
        self.mark_done();
        derived
    }

    /// Async form of [`then_compose`](Self::then_compose): the derived
    /// stage adopts the inner stage's outcome once both have resolved.
    pub fn then_compose_async<U, F>(&self, f: F, executor: Option<ExecutorHandle>) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Stage<U> + Send + 'static,
    {
        let late = LateCanceller::new();
        let derived: Stage<U> = Stage::derived(
            self.scope(),
            Canceller::joined(self.canceller(), &late.handle()),
        );
        let source = self.clone();
        let target = derived.clone();
        submit_task(executor, &derived, move || {
            let result = match source.sample() {
                Outcome::Value(value) => {
                    match catch_unwind(AssertUnwindSafe(move || f(value))) {
                        Ok(inner) => {
                            late.bind(inner.canceller().clone());
                            // Follow the inner stage under the derived
                            // scope: cancelling the composition unblocks
                            // this wait with Done.
                            inner.cell().get(Some(target.scope()), None)
                        }
                        Err(panic) => Outcome::Panicked(PanicPayload::from_panic(panic)),
                    }
                }
                other => other.inherit(),
            };
            target.cell().set_outcome(result);
            source.mark_done();
        });
        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{completed, supply_async};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn sync_compose_returns_the_inner_stage() {
        let stage = completed("id-7".to_string())
            .then_compose(|id| completed(format!("record for {id}")));
        assert_eq!(stage.get().expect("value"), "record for id-7");
    }

    #[test]
    fn async_compose_follows_the_inner_stage() {
        let stage = supply_async(|| 5, None).then_compose_async(
            |n| {
                supply_async(
                    move || {
                        thread::sleep(Duration::from_millis(80));
                        n * 2
                    },
                    None,
                )
            },
            None,
        );
        assert_eq!(stage.get().expect("value"), 10);
    }

    #[test]
    fn compose_chain_is_followed_transitively() {
        let stage = completed(1)
            .then_compose(|n| completed(n + 1))
            .then_compose(|n| completed(n + 1))
            .then_compose(|n| completed(n + 1));
        assert_eq!(stage.get().expect("value"), 4);
    }

    #[test]
    fn failed_source_short_circuits_compose() {
        let failing: Stage<i32> = supply_async(|| panic!("no input"), None);
        let derived = failing.then_compose(|n| completed(n));
        let caught = catch_unwind(AssertUnwindSafe(|| derived.get())).expect_err("inherited");
        assert_eq!(
            crate::types::PanicPayload::from_panic(caught).message(),
            "no input"
        );
    }

    #[test]
    fn panicking_callback_becomes_the_outcome() {
        let derived = completed(1).then_compose(|_| -> Stage<i32> { panic!("composer failed") });
        let caught = catch_unwind(AssertUnwindSafe(|| derived.get())).expect_err("trapped");
        assert_eq!(
            crate::types::PanicPayload::from_panic(caught).message(),
            "composer failed"
        );
    }

    #[test]
    fn cancelling_the_composition_cancels_the_inner_stage() {
        let inner = supply_async(
            || {
                thread::sleep(Duration::from_millis(500));
                1
            },
            None,
        );
        let inner_probe = inner.clone();

        let derived = completed(0).then_compose_async(move |_| inner, None);
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        derived.cancel();
        assert!(derived.get().expect_err("done").is_cancelled());
        assert!(start.elapsed() < Duration::from_millis(400));
        assert!(inner_probe.is_cancelled());
    }
}
