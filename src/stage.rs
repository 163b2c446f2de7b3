//! The stage handle: one future outcome plus the operations that derive,
//! complete, cancel, and retrieve it.
//!
//! A [`Stage<T>`] owns a single-assignment [`OutcomeCell`], a node in the
//! cancellation scope tree, the trigger its `cancel()` fires, a
//! completion-status word, and a memoised terminal outcome. Handles are
//! cheap `Arc` clones; every clone addresses the same stage.
//!
//! # Lifecycle
//!
//! ```text
//!   pending ──(cell fills: value / error / panic)──► done
//!      │
//!      └───(cancel() before fill)────────────────► cancelled
//! ```
//!
//! The status word moves `none → done` or `none → cancelled` exactly once.
//! External actors force an outcome through the completion face
//! (`complete`, `complete_error`, `complete_exceptionally`); whichever
//! writer reaches the cell first wins and the rest are silent no-ops.

use crate::cell::OutcomeCell;
use crate::error::{Error, Result};
use crate::executor::{default_executor, ExecutorHandle};
use crate::types::{Canceller, Outcome, PanicPayload, Scope, Unit};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const STATE_NONE: u8 = 0;
const STATE_DONE: u8 = 1;
const STATE_CANCELLED: u8 = 2;

/// A handle onto a future outcome, with operations to derive further
/// stages, force completion, cancel, and retrieve.
///
/// # Example
///
/// ```
/// use stagecraft::completed;
///
/// let stage = completed(21).then_apply(|n| n * 2);
/// assert_eq!(stage.get().unwrap(), 42);
/// ```
pub struct Stage<T> {
    inner: Arc<StageInner<T>>,
}

struct StageInner<T> {
    cell: OutcomeCell<T>,
    scope: Scope,
    canceller: Canceller,
    state: AtomicU8,
    memo: Mutex<Option<Outcome<T>>>,
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> std::fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.inner.state.load(Ordering::Acquire) {
            STATE_DONE => "done",
            STATE_CANCELLED => "cancelled",
            _ => "pending",
        };
        f.debug_struct("Stage")
            .field("state", &state)
            .field("filled", &self.inner.cell.is_filled())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Stage<T> {
    /// Builds a stage over an explicit scope and trigger.
    pub(crate) fn with_scope(scope: Scope, canceller: Canceller) -> Self {
        Self {
            inner: Arc::new(StageInner {
                cell: OutcomeCell::new(),
                scope,
                canceller,
                state: AtomicU8::new(STATE_NONE),
                memo: Mutex::new(None),
            }),
        }
    }

    /// Builds a producer stage: fresh root scope, trigger fires it.
    pub(crate) fn root() -> Self {
        let scope = Scope::root();
        let canceller = Canceller::for_scope(&scope);
        Self::with_scope(scope, canceller)
    }

    /// Builds a derived stage: child scope of `parent`, sharing the given
    /// trigger (the source's, or a binary/late-bound composite).
    pub(crate) fn derived(parent: &Scope, canceller: Canceller) -> Self {
        Self::with_scope(parent.child(), canceller)
    }

    pub(crate) fn cell(&self) -> &OutcomeCell<T> {
        &self.inner.cell
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub(crate) fn canceller(&self) -> &Canceller {
        &self.inner.canceller
    }

    /// Samples the cell under this stage's own scope. Combinators use this
    /// raw (un-memoised) read.
    pub(crate) fn sample(&self) -> Outcome<T> {
        self.inner.cell.get(Some(&self.inner.scope), None)
    }

    /// Marks the stage done if it is still pending.
    pub(crate) fn mark_done(&self) -> bool {
        self.inner
            .state
            .compare_exchange(STATE_NONE, STATE_DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // ------------------------------------------------------------------
    // Completion face
    // ------------------------------------------------------------------

    /// Forces a value outcome. Returns true iff this call won the cell.
    pub fn complete(&self, value: T) -> bool {
        let won = self.inner.cell.set_value(value);
        if won {
            tracing::debug!("stage completed externally");
        }
        won
    }

    /// Forces a logical-error outcome. Returns true iff this call won.
    pub fn complete_error(&self, error: Error) -> bool {
        self.inner.cell.set_err(error)
    }

    /// Forces an abnormal-termination outcome. Returns true iff this call
    /// won. The payload re-raises from `get`.
    pub fn complete_exceptionally(&self, payload: impl Into<PanicPayload>) -> bool {
        self.inner.cell.set_panicked(payload.into())
    }

    /// Cancels the stage: moves the status `none → cancelled` and fires the
    /// cancel trigger (reaching this stage's sources and, through the scope
    /// tree, every derived stage).
    ///
    /// Returns true iff the status transition happened here; a stage that
    /// already completed reports false. The trigger fires either way, so a
    /// repeat cancel still tears down late-added descendants.
    pub fn cancel(&self) -> bool {
        let transitioned = self
            .inner
            .state
            .compare_exchange(
                STATE_NONE,
                STATE_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        self.inner.canceller.fire();
        if transitioned {
            tracing::debug!("stage cancelled");
        }
        transitioned
    }

    /// True if this stage was cancelled, or its scope was cancelled from
    /// elsewhere in the graph.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == STATE_CANCELLED
            || self.inner.scope.is_cancelled()
    }

    /// True once the stage reached any terminal state (completed, sampled
    /// by a dependant or `get`, or cancelled).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != STATE_NONE
    }

    // ------------------------------------------------------------------
    // Retrieval face
    // ------------------------------------------------------------------

    /// Blocks until the outcome exists, then returns it.
    ///
    /// - a value returns `Ok`
    /// - a logical error returns `Err`
    /// - cancellation returns an [`ErrorKind::Cancelled`] error
    /// - a captured panic **re-raises** via `std::panic::panic_any`
    ///
    /// The outcome is memoised: repeated calls observe the first result.
    ///
    /// [`ErrorKind::Cancelled`]: crate::ErrorKind::Cancelled
    pub fn get(&self) -> Result<T> {
        self.await_outcome(None)
    }

    /// Like [`get`](Self::get) but gives up after `timeout`, reporting
    /// cancellation. A timed-out retrieval is memoised like any other.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        self.await_outcome(Some(Instant::now() + timeout))
    }

    fn await_outcome(&self, deadline: Option<Instant>) -> Result<T> {
        let outcome = {
            let mut memo = self.inner.memo.lock();
            match memo.as_ref() {
                Some(outcome) => outcome.clone(),
                None => {
                    let outcome = self.inner.cell.get(Some(&self.inner.scope), deadline);
                    *memo = Some(outcome.clone());
                    outcome
                }
            }
        };
        self.mark_done();
        match outcome {
            Outcome::Value(v) => Ok(v),
            Outcome::Err(e) => Err(e),
            Outcome::Done => Err(Error::cancelled()),
            Outcome::Panicked(payload) => std::panic::panic_any(payload),
        }
    }
}

// ----------------------------------------------------------------------
// Factories
// ----------------------------------------------------------------------

/// Returns an already-completed stage holding `value`.
///
/// # Example
///
/// ```
/// let stage = stagecraft::completed("ready");
/// assert!(stage.is_done());
/// assert_eq!(stage.get().unwrap(), "ready");
/// ```
pub fn completed<T: Clone + Send + 'static>(value: T) -> Stage<T> {
    let stage = Stage::root();
    stage.inner.cell.set_value(value);
    stage.mark_done();
    stage
}

/// Schedules `f` on an executor (`None` selects the process default) and
/// returns the stage of its result.
///
/// A panic inside `f` becomes the stage's abnormal outcome; a rejected
/// submission does too.
pub fn supply_async<T, F>(f: F, executor: Option<ExecutorHandle>) -> Stage<T>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let stage = Stage::root();
    let producer = stage.clone();
    submit_task(executor, &stage, move || {
        let outcome = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Outcome::Value(value),
            Err(panic) => Outcome::Panicked(PanicPayload::from_panic(panic)),
        };
        producer.inner.cell.set_outcome(outcome);
        producer.mark_done();
    });
    stage
}

/// Schedules `f` for its effect and returns a unit stage that completes
/// when it finishes.
pub fn run_async<F>(f: F, executor: Option<ExecutorHandle>) -> Stage<Unit>
where
    F: FnOnce() + Send + 'static,
{
    supply_async(
        move || {
            f();
            Unit
        },
        executor,
    )
}

/// Submits a task, storing a rejected submission in `fallback`'s cell as a
/// captured panic so the stage stays observable.
pub(crate) fn submit_task<T: Clone + Send + 'static>(
    executor: Option<ExecutorHandle>,
    fallback: &Stage<T>,
    task: impl FnOnce() + Send + 'static,
) {
    let chosen = executor.unwrap_or_else(default_executor);
    if let Err(e) = chosen.run(Box::new(task)) {
        fallback
            .cell()
            .set_panicked(PanicPayload::new(e.to_string()));
        fallback.mark_done();
    }
}

// ----------------------------------------------------------------------
// Erased face (consumed by the lazy recorder)
// ----------------------------------------------------------------------

/// Object-safe view of a stage's completion face, with `Any`-erased value
/// delivery. The lazy chain stores stages of differing types and routes
/// external completion through this trait.
pub(crate) trait StageOps: Send + Sync {
    /// Delivers a boxed value; a type mismatch is rejected without effect.
    fn complete_boxed(&self, value: Box<dyn Any + Send>) -> Result<()>;
    fn complete_error_erased(&self, error: Error) -> bool;
    fn complete_exceptionally_erased(&self, payload: PanicPayload) -> bool;
    fn cancel_erased(&self) -> bool;
    fn is_done_erased(&self) -> bool;
    fn is_cancelled_erased(&self) -> bool;
}

impl<T: Clone + Send + 'static> StageOps for Stage<T> {
    fn complete_boxed(&self, value: Box<dyn Any + Send>) -> Result<()> {
        match value.downcast::<T>() {
            Ok(v) => {
                self.complete(*v);
                Ok(())
            }
            Err(_) => Err(Error::new(crate::ErrorKind::TypeMismatch)),
        }
    }

    fn complete_error_erased(&self, error: Error) -> bool {
        self.complete_error(error)
    }

    fn complete_exceptionally_erased(&self, payload: PanicPayload) -> bool {
        self.complete_exceptionally(payload)
    }

    fn cancel_erased(&self) -> bool {
        self.cancel()
    }

    fn is_done_erased(&self) -> bool {
        self.is_done()
    }

    fn is_cancelled_erased(&self) -> bool {
        self.is_cancelled()
    }
}
