//! The derivation vocabulary of [`Stage`](crate::Stage).
//!
//! Combinators take one or two source stages plus a user callback and
//! produce a fresh derived stage:
//!
//! - [`chain`]: unary dependence (`then_apply`, `then_accept`, `then_run`)
//! - [`both`]: binary join (`then_combine`, `then_accept_both`,
//!   `run_after_both`)
//! - [`either`]: binary race (`apply_to_either`, `accept_either`,
//!   `run_after_either`)
//! - [`compose`]: flat-map (`then_compose`)
//! - [`recover`]: failure handling (`exceptionally`, `when_complete`,
//!   `handle`)
//!
//! Every family has a sync form, which samples its sources on the calling
//! thread, and an `_async` twin, which submits the same body to an
//! executor and never blocks the caller.
//!
//! # Shared Contract
//!
//! 1. A source holding a logical error or a captured panic short-circuits:
//!    the derived cell receives a clone of that outcome and the callback is
//!    not invoked (the recover family exempts the panic path)
//! 2. A source observed as `Done` fills the derived cell with `Done`
//! 3. A panic inside the callback is trapped at the boundary and stored as
//!    the derived outcome; it never unwinds through the combinator
//! 4. The derived stage's trigger fires its source triggers, so cancelling
//!    downstream tears down upstream
//! 5. A rejected async submission becomes a captured-panic outcome on the
//!    derived cell
//! 6. After sampling, the source stage is marked done

pub mod both;
pub mod chain;
pub mod compose;
pub mod either;
pub mod recover;

use crate::types::{Outcome, PanicPayload};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs a user callback under the panic interceptor, producing the derived
/// outcome.
pub(crate) fn run_catching<U>(f: impl FnOnce() -> U) -> Outcome<U> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Outcome::Value(value),
        Err(panic) => Outcome::Panicked(PanicPayload::from_panic(panic)),
    }
}
