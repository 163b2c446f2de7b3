//! Single-assignment outcome cell.
//!
//! The cell is the only shared mutable state in a stage graph. It is
//! written at most once: writers race through a compare-and-swap on the
//! status word and only the winner installs an outcome; every losing
//! writer is a silent no-op, so a canceller racing a normal completion
//! cannot corrupt state.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                FIRST-WRITER-WINS PROTOCOL                    │
//! │                                                              │
//! │  writer A ── CAS none→value ── ok ──► install, notify        │
//! │  writer B ── CAS none→panic ── fail ─► silent no-op          │
//! │                                                              │
//! │  reader ──── clone outcome out (never consumes)              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers never consume the slot, so one source cell can feed any number
//! of derived stages. Blocking waits park on a condvar and re-check the
//! governing [`Scope`] on a short tick; a cancelled wait yields
//! [`Outcome::Done`] without touching the slot.

use crate::types::{Outcome, PanicPayload, Scope};
use crate::Error;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

const STATUS_NONE: u8 = 0;
const STATUS_VALUE: u8 = 1;
const STATUS_ERR: u8 = 2;
const STATUS_PANICKED: u8 = 3;
const STATUS_DONE: u8 = 4;

/// How often a blocked wait re-checks cancellation and deadlines.
///
/// Fills wake waiters immediately through the condvar; the tick only bounds
/// how late a cross-cell or cancellation event is observed.
const WAIT_TICK: Duration = Duration::from_millis(5);

/// A single-assignment container for one [`Outcome`].
#[derive(Debug)]
pub struct OutcomeCell<T> {
    status: AtomicU8,
    slot: Mutex<Option<Outcome<T>>>,
    filled: Condvar,
}

impl<T: Clone> OutcomeCell<T> {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(STATUS_NONE),
            slot: Mutex::new(None),
            filled: Condvar::new(),
        }
    }

    /// Installs a value. Returns true iff this writer won.
    pub fn set_value(&self, value: T) -> bool {
        self.install(STATUS_VALUE, Outcome::Value(value))
    }

    /// Installs a logical error. Returns true iff this writer won.
    pub fn set_err(&self, error: Error) -> bool {
        self.install(STATUS_ERR, Outcome::Err(error))
    }

    /// Installs a captured panic. Returns true iff this writer won.
    pub fn set_panicked(&self, payload: PanicPayload) -> bool {
        self.install(STATUS_PANICKED, Outcome::Panicked(payload))
    }

    /// Installs a cloned upstream outcome without reconstructing its kind.
    ///
    /// This is the short-circuit propagation form; it accepts `Done` so a
    /// derived cell of a cancelled source is observable.
    pub fn set_outcome(&self, outcome: Outcome<T>) -> bool {
        let status = match &outcome {
            Outcome::Value(_) => STATUS_VALUE,
            Outcome::Err(_) => STATUS_ERR,
            Outcome::Panicked(_) => STATUS_PANICKED,
            Outcome::Done => STATUS_DONE,
        };
        self.install(status, outcome)
    }

    fn install(&self, status: u8, outcome: Outcome<T>) -> bool {
        // CAS first: the slot is only touched by the winning writer.
        if self
            .status
            .compare_exchange(STATUS_NONE, status, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let mut slot = self.slot.lock();
        *slot = Some(outcome);
        self.filled.notify_all();
        true
    }

    /// Returns true once an outcome has been installed.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status.load(Ordering::Acquire) != STATUS_NONE
    }

    /// Returns a clone of the outcome if one is installed.
    #[must_use]
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.slot.lock().clone()
    }

    /// Blocks until the cell fills, the scope cancels, or the deadline
    /// passes. The latter two yield [`Outcome::Done`] without consuming
    /// anything.
    pub fn get(&self, scope: Option<&Scope>, deadline: Option<Instant>) -> Outcome<T> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            if scope.is_some_and(Scope::is_cancelled) {
                return Outcome::Done;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Outcome::Done;
            }
            self.filled.wait_for(&mut slot, WAIT_TICK);
        }
    }

    /// Returns whichever of `self` or `other` fills first, or `Done` if the
    /// scope cancels before either does.
    ///
    /// If both are ready on the same tick, `self` is sampled first; callers
    /// must not rely on the tie-break.
    pub fn select(&self, other: &Self, scope: Option<&Scope>) -> Outcome<T> {
        loop {
            if let Some(outcome) = self.try_get() {
                return outcome;
            }
            if let Some(outcome) = other.try_get() {
                return outcome;
            }
            if scope.is_some_and(Scope::is_cancelled) {
                return Outcome::Done;
            }
            std::thread::sleep(WAIT_TICK);
        }
    }

    /// Waits for both cells, independently. A mid-wait cancellation leaves
    /// any outcome already collected intact and reports the missing one as
    /// `Done`.
    pub fn both<U: Clone>(
        &self,
        other: &OutcomeCell<U>,
        scope: Option<&Scope>,
    ) -> (Outcome<T>, Outcome<U>) {
        let mut first: Option<Outcome<T>> = None;
        let mut second: Option<Outcome<U>> = None;
        loop {
            if first.is_none() {
                first = self.try_get();
            }
            if second.is_none() {
                second = other.try_get();
            }
            match (&first, &second) {
                (Some(_), Some(_)) => break,
                _ if scope.is_some_and(Scope::is_cancelled) => break,
                _ => std::thread::sleep(WAIT_TICK),
            }
        }
        (
            first.unwrap_or(Outcome::Done),
            second.unwrap_or(Outcome::Done),
        )
    }
}

impl<T: Clone> Default for OutcomeCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for every cell, in input order. Each entry is `Done` if the scope
/// cancelled before that cell filled.
pub fn all_of_cells<T: Clone>(
    cells: &[&OutcomeCell<T>],
    scope: Option<&Scope>,
) -> Vec<Outcome<T>> {
    cells.iter().map(|cell| cell.get(scope, None)).collect()
}

/// Returns the index and outcome of the first filled cell, or
/// `(cells.len(), Done)` if the scope cancels first.
///
/// An empty input can never fill and reports `(0, Done)` immediately.
pub fn any_of_cells<T: Clone>(
    cells: &[&OutcomeCell<T>],
    scope: Option<&Scope>,
) -> (usize, Outcome<T>) {
    if cells.is_empty() {
        return (0, Outcome::Done);
    }
    loop {
        for (i, cell) in cells.iter().enumerate() {
            if let Some(outcome) = cell.try_get() {
                return (i, outcome);
            }
        }
        if scope.is_some_and(Scope::is_cancelled) {
            return (cells.len(), Outcome::Done);
        }
        std::thread::sleep(WAIT_TICK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn first_writer_wins() {
        let cell = OutcomeCell::new();
        assert!(cell.set_value(1));
        assert!(!cell.set_value(2));
        assert!(!cell.set_panicked(PanicPayload::new("late")));

        match cell.try_get() {
            Some(Outcome::Value(v)) => assert_eq!(v, 1),
            other => panic!("expected first value, got {other:?}"),
        }
    }

    #[test]
    fn losing_writer_is_silent_across_kinds() {
        let cell: OutcomeCell<i32> = OutcomeCell::new();
        assert!(cell.set_panicked(PanicPayload::new("boom")));
        assert!(!cell.set_err(Error::cancelled()));
        assert!(!cell.set_outcome(Outcome::Done));
        assert!(cell.try_get().is_some_and(|o| o.is_panicked()));
    }

    #[test]
    fn set_outcome_accepts_done() {
        let cell: OutcomeCell<i32> = OutcomeCell::new();
        assert!(cell.set_outcome(Outcome::Done));
        assert!(cell.is_filled());
        assert!(cell.try_get().is_some_and(|o| o.is_done()));
    }

    #[test]
    fn reads_do_not_consume() {
        let cell = OutcomeCell::new();
        cell.set_value("shared".to_string());

        for _ in 0..3 {
            match cell.get(None, None) {
                Outcome::Value(v) => assert_eq!(v, "shared"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn get_blocks_until_filled() {
        let cell = Arc::new(OutcomeCell::new());
        let writer = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                cell.set_value(7);
            })
        };

        let outcome = cell.get(None, None);
        writer.join().expect("writer panicked");
        assert!(matches!(outcome, Outcome::Value(7)));
    }

    #[test]
    fn get_observes_scope_cancellation() {
        let cell: Arc<OutcomeCell<i32>> = Arc::new(OutcomeCell::new());
        let scope = Scope::root();
        let canceller = {
            let scope = scope.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                scope.cancel();
            })
        };

        let outcome = cell.get(Some(&scope), None);
        canceller.join().expect("canceller panicked");
        assert!(outcome.is_done());
        assert!(!cell.is_filled());
    }

    #[test]
    fn get_observes_deadline() {
        let cell: OutcomeCell<i32> = OutcomeCell::new();
        let start = Instant::now();
        let outcome = cell.get(None, Some(start + Duration::from_millis(40)));
        assert!(outcome.is_done());
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn select_returns_first_filled() {
        let slow: Arc<OutcomeCell<i32>> = Arc::new(OutcomeCell::new());
        let fast = Arc::new(OutcomeCell::new());
        {
            let fast = Arc::clone(&fast);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                fast.set_value(2);
            });
        }

        let outcome = slow.select(&fast, None);
        assert!(matches!(outcome, Outcome::Value(2)));
    }

    #[test]
    fn both_preserves_collected_outcome_on_cancel() {
        let ready = OutcomeCell::new();
        ready.set_value(1);
        let never: OutcomeCell<i32> = OutcomeCell::new();
        let scope = Scope::root();
        scope.cancel();

        let (first, second) = ready.both(&never, Some(&scope));
        assert!(matches!(first, Outcome::Value(1)));
        assert!(second.is_done());
    }

    #[test]
    fn both_waits_for_the_slower_cell() {
        let a = Arc::new(OutcomeCell::new());
        a.set_value(1);
        let b = Arc::new(OutcomeCell::new());
        {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                b.set_value(2);
            });
        }

        let (first, second) = a.both(&b, None);
        assert!(matches!(first, Outcome::Value(1)));
        assert!(matches!(second, Outcome::Value(2)));
    }

    #[test]
    fn all_of_cells_aligns_with_input() {
        let a = OutcomeCell::new();
        let b = OutcomeCell::new();
        a.set_value(10);
        b.set_err(Error::new(ErrorKind::Cancelled));

        let outcomes = all_of_cells(&[&a, &b], None);
        assert!(matches!(outcomes[0], Outcome::Value(10)));
        assert!(outcomes[1].is_err());
    }

    #[test]
    fn all_of_cells_marks_unfilled_done_on_cancel() {
        let filled = OutcomeCell::new();
        filled.set_value(1);
        let empty: OutcomeCell<i32> = OutcomeCell::new();
        let scope = Scope::root();
        scope.cancel();

        let outcomes = all_of_cells(&[&filled, &empty], Some(&scope));
        assert!(matches!(outcomes[0], Outcome::Value(1)));
        assert!(outcomes[1].is_done());
    }

    #[test]
    fn any_of_cells_reports_winner_index() {
        let a: OutcomeCell<i32> = OutcomeCell::new();
        let b = OutcomeCell::new();
        b.set_value(5);

        let (index, outcome) = any_of_cells(&[&a, &b], None);
        assert_eq!(index, 1);
        assert!(matches!(outcome, Outcome::Value(5)));
    }

    #[test]
    fn any_of_cells_reports_len_on_cancel() {
        let a: OutcomeCell<i32> = OutcomeCell::new();
        let b: OutcomeCell<i32> = OutcomeCell::new();
        let scope = Scope::root();
        scope.cancel();

        let (index, outcome) = any_of_cells(&[&a, &b], Some(&scope));
        assert_eq!(index, 2);
        assert!(outcome.is_done());
    }

    #[test]
    fn any_of_cells_empty_input() {
        let (index, outcome) = any_of_cells::<i32>(&[], None);
        assert_eq!(index, 0);
        assert!(outcome.is_done());
    }
}
