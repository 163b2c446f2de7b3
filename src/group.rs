//! Group operations over stage sequences.
//!
//! [`all_of`] completes with [`Unit`] when every source has filled;
//! [`any_of`] adopts the outcome of whichever source fills first, value
//! included. Both return immediately; the wait runs as a task on the
//! default executor.
//!
//! Cancellation policy:
//!
//! - cancelling an `all_of` stage cancels every source
//! - cancelling an `any_of` stage cancels only the group's own wait;
//!   losers keep running either way (first-completion does not cancel them)
//!
//! Element types are homogeneous; mixed groups erase to `Stage<Unit>`
//! first (for example with `then_apply(|_| Unit)`).

use crate::cell::any_of_cells;
use crate::stage::{submit_task, Stage};
use crate::types::{Canceller, Outcome, Scope, Unit};

/// Returns a stage that completes with `Unit` once every source has
/// filled.
///
/// The first non-value outcome in input order is inherited: a panicked
/// source makes the group re-raise that payload at `get`, while the
/// sources remain individually retrievable. An empty input completes
/// immediately.
///
/// # Example
///
/// ```
/// use stagecraft::{all_of, supply_async};
///
/// let stages: Vec<_> = (0..3).map(|n| supply_async(move || n, None)).collect();
/// all_of(&stages).get().unwrap();
/// assert_eq!(stages[2].get().unwrap(), 2);
/// ```
pub fn all_of<T: Clone + Send + 'static>(stages: &[Stage<T>]) -> Stage<Unit> {
    let scope = Scope::root();
    let mut triggers = vec![Canceller::for_scope(&scope)];
    triggers.extend(stages.iter().map(|s| s.canceller().clone()));
    let group = Stage::with_scope(scope, Canceller::fan_out(triggers));

    let sources = stages.to_vec();
    let target = group.clone();
    submit_task(None, &group, move || {
        let outcomes: Vec<Outcome<T>> = sources
            .iter()
            .map(|stage| stage.cell().get(Some(target.scope()), None))
            .collect();
        let result = outcomes
            .into_iter()
            .find(|outcome| !outcome.is_value())
            .map_or(Outcome::Value(Unit), Outcome::inherit);
        target.cell().set_outcome(result);
        target.mark_done();
    });
    group
}

/// Returns a stage that adopts the outcome of the first source to fill.
///
/// Losing sources are left running. An empty input can never fill and the
/// group reports cancellation from `get`.
///
/// # Example
///
/// ```
/// use stagecraft::{any_of, completed, supply_async};
/// use std::time::Duration;
///
/// let slow = supply_async(
///     || {
///         std::thread::sleep(Duration::from_millis(200));
///         1
///     },
///     None,
/// );
/// let quick = completed(2);
/// assert_eq!(any_of(&[slow, quick]).get().unwrap(), 2);
/// ```
pub fn any_of<T: Clone + Send + 'static>(stages: &[Stage<T>]) -> Stage<T> {
    let scope = Scope::root();
    let canceller = Canceller::for_scope(&scope);
    let group = Stage::with_scope(scope, canceller);

    let sources = stages.to_vec();
    let target = group.clone();
    submit_task(None, &group, move || {
        let cells: Vec<_> = sources.iter().map(Stage::cell).collect();
        let (_, outcome) = any_of_cells(&cells, Some(target.scope()));
        target.cell().set_outcome(outcome);
        target.mark_done();
    });
    group
}
