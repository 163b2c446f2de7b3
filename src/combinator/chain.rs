//! Unary chaining: transform, consume, or follow a single source.
//!
//! `then_apply` maps the source value, `then_accept` consumes it,
//! `then_run` ignores it. The sync forms block the calling thread until
//! the source is ready; the `_async` forms run the same body as a task.

use super::run_catching;
use crate::executor::ExecutorHandle;
use crate::stage::{submit_task, Stage};
use crate::types::{Outcome, Unit};

impl<T: Clone + Send + 'static> Stage<T> {
    /// Derives a stage holding `f` of this stage's value.
    ///
    /// Samples the source on the calling thread.
    ///
    /// # Example
    ///
    /// ```
    /// let stage = stagecraft::completed(2).then_apply(|n| n * 10);
    /// assert_eq!(stage.get().unwrap(), 20);
    /// ```
    pub fn then_apply<U, F>(&self, f: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U,
    {
        let derived = Stage::derived(self.scope(), self.canceller().clone());
        let result = match self.sample() {
            Outcome::Value(value) => run_catching(move || f(value)),
            other => other.inherit(),
        };
        derived.cell().set_outcome(result);
        self.mark_done();
        derived
    }

    /// Async form of [`then_apply`](Self::then_apply); `None` selects the
    /// default executor.
    pub fn then_apply_async<U, F>(&self, f: F, executor: Option<ExecutorHandle>) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let derived: Stage<U> = Stage::derived(self.scope(), self.canceller().clone());
        let source = self.clone();
        let target = derived.clone();
        submit_task(executor, &derived, move || {
            let result = match source.sample() {
                Outcome::Value(value) => run_catching(move || f(value)),
                other => other.inherit(),
            };
            target.cell().set_outcome(result);
            source.mark_done();
        });
        derived
    }

    /// Derives a unit stage that consumes this stage's value with `f`.
    pub fn then_accept<F>(&self, f: F) -> Stage<Unit>
    where
        F: FnOnce(T),
    {
        self.then_apply(move |value| {
            f(value);
            Unit
        })
    }

    /// Async form of [`then_accept`](Self::then_accept).
    pub fn then_accept_async<F>(&self, f: F, executor: Option<ExecutorHandle>) -> Stage<Unit>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.then_apply_async(
            move |value| {
                f(value);
                Unit
            },
            executor,
        )
    }

    /// Derives a unit stage that runs `f` once this stage completes
    /// normally, discarding the value.
    pub fn then_run<F>(&self, f: F) -> Stage<Unit>
    where
        F: FnOnce(),
    {
        self.then_apply(move |_| {
            f();
            Unit
        })
    }

    /// Async form of [`then_run`](Self::then_run).
    pub fn then_run_async<F>(&self, f: F, executor: Option<ExecutorHandle>) -> Stage<Unit>
    where
        F: FnOnce() + Send + 'static,
    {
        self.then_apply_async(
            move |_| {
                f();
                Unit
            },
            executor,
        )
    }
}
