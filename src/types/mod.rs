//! Core vocabulary: outcomes, panic payloads, cancellation scopes.

pub mod cancel;
pub mod outcome;

pub use cancel::{Canceller, Scope};
pub use outcome::{Outcome, PanicPayload, Unit};
