//! Four-state outcome type for completion stages.
//!
//! The outcome type represents the terminal state of a stage:
//!
//! - `Value(T)`: success with a typed value
//! - `Err(Error)`: a recoverable logical error, returned from `get`
//! - `Panicked(PanicPayload)`: a user callback panicked; re-raised by `get`
//! - `Done`: the governing scope was cancelled before the cell filled
//!
//! `Done` is synthesised by a cancelled retrieval; it is additionally cloned
//! into derived cells on the short-circuit path so that a stage derived from
//! a cancelled source is itself observable.

use crate::error::Error;
use core::fmt;
use std::any::Any;
use std::backtrace::Backtrace;

/// Upper bound on the rendered backtrace stored in a [`PanicPayload`].
/// Tuneable; traces past the cap are truncated.
pub const BACKTRACE_CAPTURE_LIMIT: usize = 160 * 1024;

/// Payload from a caught panic.
///
/// Wraps the panic value for transport across stage boundaries, together
/// with a size-bounded backtrace captured at the interception point. A
/// payload re-raised by `get` and caught again by a downstream combinator
/// keeps its original backtrace.
#[derive(Debug, Clone)]
pub struct PanicPayload {
    message: String,
    backtrace: Option<String>,
}

impl PanicPayload {
    /// Creates a payload with the given message, capturing a backtrace if
    /// backtraces are enabled for the process.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            backtrace: capture_backtrace(),
        }
    }

    /// Creates a payload from a `catch_unwind` result.
    ///
    /// String-ish panic values are used verbatim; a re-thrown
    /// [`PanicPayload`] is preserved including its original backtrace;
    /// anything else is rendered opaquely.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Self>() {
            Ok(existing) => return *existing,
            Err(other) => other,
        };
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "opaque panic payload".to_string()
        };
        Self::new(message)
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the captured backtrace, if one was recorded.
    #[must_use]
    pub fn backtrace(&self) -> Option<&str> {
        self.backtrace.as_deref()
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

impl From<&str> for PanicPayload {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for PanicPayload {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

fn capture_backtrace() -> Option<String> {
    let bt = Backtrace::capture();
    if matches!(bt.status(), std::backtrace::BacktraceStatus::Captured) {
        let mut rendered = bt.to_string();
        if rendered.len() > BACKTRACE_CAPTURE_LIMIT {
            let mut end = BACKTRACE_CAPTURE_LIMIT;
            while !rendered.is_char_boundary(end) {
                end -= 1;
            }
            rendered.truncate(end);
        }
        Some(rendered)
    } else {
        None
    }
}

/// The terminal state of a stage.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// Success with a value.
    Value(T),
    /// A recoverable logical error.
    Err(Error),
    /// A user callback panicked.
    Panicked(PanicPayload),
    /// The governing scope was cancelled before the cell filled.
    Done,
}

impl<T> Outcome<T> {
    /// Returns true if this outcome carries a value.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true if this outcome carries a logical error.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    /// Returns true if this outcome carries a captured panic.
    #[must_use]
    pub const fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Returns true if this outcome reports cancellation.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Re-tags a non-value outcome for a differently-typed derived cell.
    ///
    /// This is the short-circuit propagation step: errors, panics, and
    /// `Done` cross type boundaries untouched.
    ///
    /// # Panics
    ///
    /// Panics if called on `Value`; a value cannot cross a type boundary.
    #[must_use]
    pub(crate) fn inherit<U>(self) -> Outcome<U> {
        match self {
            Self::Value(_) => panic!("a value outcome cannot be inherited across stage types"),
            Self::Err(e) => Outcome::Err(e),
            Self::Panicked(p) => Outcome::Panicked(p),
            Self::Done => Outcome::Done,
        }
    }
}

/// The zero-sized result of consume- and run-family combinators, and of
/// group stages.
///
/// Callers who do not care about a result `get` a `Unit` and discard it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unit;

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit")
    }
}
