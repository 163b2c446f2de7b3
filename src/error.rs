//! Error types for stage retrieval and completion.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors compose with the [`Outcome`](crate::types::Outcome) channels:
//!   a logical error is carried as `Outcome::Err`, while panics travel as
//!   `Outcome::Panicked` and only re-surface in `get`
//! - Cancellation is reported as an error kind, never as a panic

use crate::executor::SubmitError;
use core::fmt;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The stage was cancelled (or a timed wait elapsed) before an outcome
    /// existed.
    Cancelled,
    /// An erased completion carried a value of the wrong type.
    TypeMismatch,
    /// The executor's task queue rejected a submission.
    QueueFull,
    /// The executor is shut down.
    Shutdown,
}

/// The main error type surfaced by stage retrieval and completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error reports cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Creates a cancellation error.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Cancelled => write!(f, "cancelled")?,
            ErrorKind::TypeMismatch => write!(f, "type not match")?,
            ErrorKind::QueueFull => write!(f, "task queue is full")?,
            ErrorKind::Shutdown => write!(f, "executor is shut down")?,
        }
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<SubmitError> for Error {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::QueueFull => Self::new(ErrorKind::QueueFull),
            SubmitError::Shutdown => Self::new(ErrorKind::Shutdown),
            SubmitError::Spawn(reason) => Self::new(ErrorKind::Shutdown).with_context(reason),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_retrieval_surface() {
        assert_eq!(Error::cancelled().to_string(), "cancelled");
        assert_eq!(
            Error::new(ErrorKind::TypeMismatch).to_string(),
            "type not match"
        );
    }

    #[test]
    fn context_is_appended() {
        let err = Error::cancelled().with_context("get timed out");
        assert_eq!(err.to_string(), "cancelled: get timed out");
        assert!(err.is_cancelled());
    }

    #[test]
    fn submit_errors_convert() {
        let err: Error = SubmitError::QueueFull.into();
        assert_eq!(err.kind(), ErrorKind::QueueFull);

        let err: Error = SubmitError::Shutdown.into();
        assert_eq!(err.kind(), ErrorKind::Shutdown);
    }

    #[test]
    fn kind_is_preserved() {
        let err = Error::new(ErrorKind::QueueFull);
        assert_eq!(err.kind(), ErrorKind::QueueFull);
        assert!(!err.is_cancelled());
    }
}
