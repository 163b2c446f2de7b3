//! Failure handling: the three combinators that are observable even when
//! their source panicked.
//!
//! - `exceptionally` substitutes a value for a panic and passes values
//!   through untouched
//! - `when_complete` observes value or panic without consuming either; the
//!   source outcome passes through unless the callback itself panics
//! - `handle` converts either path into a fresh value, consuming a panic
//!
//! Logical errors and `Done` take the ordinary short-circuit path through
//! all three: the callback's two inputs are the value and the panic.

use super::run_catching;
use crate::executor::ExecutorHandle;
use crate::stage::{submit_task, Stage};
use crate::types::{Outcome, PanicPayload};

impl<T: Clone + Send + 'static> Stage<T> {
    /// Derives a stage that recovers from a panicked source: `f` maps the
    /// captured payload to a substitute value. A value source passes
    /// through unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use stagecraft::{supply_async, Stage};
    ///
    /// let stage: Stage<&str> = supply_async(|| panic!("boom"), None)
    ///     .exceptionally(|_| "fallback");
    /// assert_eq!(stage.get().unwrap(), "fallback");
    /// ```
    pub fn exceptionally<F>(&self, f: F) -> Stage<T>
    where
        F: FnOnce(PanicPayload) -> T,
    {
        let derived = Stage::derived(self.scope(), self.canceller().clone());
        let result = match self.sample() {
            Outcome::Value(value) => Outcome::Value(value),
            Outcome::Panicked(payload) => run_catching(move || f(payload)),
            other => other,
        };
        derived.cell().set_outcome(result);
        self.mark_done();
        derived
    }

    /// Async form of [`exceptionally`](Self::exceptionally).
    pub fn exceptionally_async<F>(&self, f: F, executor: Option<ExecutorHandle>) -> Stage<T>
    where
        F: FnOnce(PanicPayload) -> T + Send + 'static,
    {
        let derived: Stage<T> = Stage::derived(self.scope(), self.canceller().clone());
        let source = self.clone();
        let target = derived.clone();
        submit_task(executor, &derived, move || {
            let result = match source.sample() {
                Outcome::Value(value) => Outcome::Value(value),
                Outcome::Panicked(payload) => run_catching(move || f(payload)),
                other => other,
            };
            target.cell().set_outcome(result);
            source.mark_done();
        });
        derived
    }

    /// Derives a pass-through stage that lets `f` observe the source's
    /// value or panic. The source outcome flows into the derived cell
    /// unchanged (a panic is *not* consumed) unless the callback itself
    /// panics, which replaces the outcome.
    pub fn when_complete<F>(&self, f: F) -> Stage<T>
    where
        F: FnOnce(Option<&T>, Option<&PanicPayload>),
    {
        let derived = Stage::derived(self.scope(), self.canceller().clone());
        derived.cell().set_outcome(Self::observe(self.sample(), f));
        self.mark_done();
        derived
    }

    /// Async form of [`when_complete`](Self::when_complete).
    pub fn when_complete_async<F>(&self, f: F, executor: Option<ExecutorHandle>) -> Stage<T>
    where
        F: FnOnce(Option<&T>, Option<&PanicPayload>) + Send + 'static,
    {
        let derived: Stage<T> = Stage::derived(self.scope(), self.canceller().clone());
        let source = self.clone();
        let target = derived.clone();
        submit_task(executor, &derived, move || {
            target.cell().set_outcome(Self::observe(source.sample(), f));
            source.mark_done();
        });
        derived
    }

    fn observe<F>(source: Outcome<T>, f: F) -> Outcome<T>
    where
        F: FnOnce(Option<&T>, Option<&PanicPayload>),
    {
        match source {
            Outcome::Value(value) => {
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    f(Some(&value), None);
                })) {
                    Ok(()) => Outcome::Value(value),
                    Err(panic) => Outcome::Panicked(PanicPayload::from_panic(panic)),
                }
            }
            Outcome::Panicked(payload) => {
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    f(None, Some(&payload));
                })) {
                    Ok(()) => Outcome::Panicked(payload),
                    Err(panic) => Outcome::Panicked(PanicPayload::from_panic(panic)),
                }
            }
            other => other,
        }
    }

    /// Derives a stage from `f` of the source's value-or-panic. A prior
    /// panic is consumed: the derived outcome is whatever `f` returns (or
    /// `f`'s own panic).
    ///
    /// # Example
    ///
    /// ```
    /// use stagecraft::{supply_async, Stage};
    ///
    /// let stage: Stage<i32> = supply_async(|| panic!("boom"), None)
    ///     .handle(|_value, panic| if panic.is_some() { 2 } else { 1 });
    /// assert_eq!(stage.get().unwrap(), 2);
    /// ```
    pub fn handle<U, F>(&self, f: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Option<T>, Option<PanicPayload>) -> U,
    {
        let derived = Stage::derived(self.scope(), self.canceller().clone());
        let result = match self.sample() {
            Outcome::Value(value) => run_catching(move || f(Some(value), None)),
            Outcome::Panicked(payload) => run_catching(move || f(None, Some(payload))),
            other => other.inherit(),
        };
        derived.cell().set_outcome(result);
        self.mark_done();
        derived
    }

    /// Async form of [`handle`](Self::handle).
    pub fn handle_async<U, F>(&self, f: F, executor: Option<ExecutorHandle>) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Option<T>, Option<PanicPayload>) -> U + Send + 'static,
    {
        let derived: Stage<U> = Stage::derived(self.scope(), self.canceller().clone());
        let source = self.clone();
        let target = derived.clone();
        submit_task(executor, &derived, move || {
            let result = match source.sample() {
                Outcome::Value(value) => run_catching(move || f(Some(value), None)),
                Outcome::Panicked(payload) => run_catching(move || f(None, Some(payload))),
                other => other.inherit(),
            };
            target.cell().set_outcome(result);
            source.mark_done();
        });
        derived
    }
}
