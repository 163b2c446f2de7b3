//! Stagecraft: composable completion stages for Rust.
//!
//! # Overview
//!
//! A [`Stage<T>`] is a handle onto a value that will become available in the
//! future, together with a combinator vocabulary for deriving further stages:
//! chaining dependent computations, joining or racing independent ones,
//! recovering from panics, and externally completing or cancelling work in
//! flight. Producers run on a bounded worker pool; outcomes (a value, a
//! logical error, or a captured panic) propagate strictly along the
//! dependency graph.
//!
//! # Core Guarantees
//!
//! - **Single-writer outcomes**: every stage's cell is written at most once;
//!   a losing writer (a canceller racing a normal completion, a duplicate
//!   external `complete`) is a silent no-op
//! - **Panic isolation**: panics raised by user callbacks are caught at the
//!   combinator boundary, stored as an outcome, and re-raised only by `get`
//! - **Cascading cancellation**: every stage owns a node in a scope tree;
//!   cancelling a derived stage cancels its sources, and cancelling a source
//!   reaches every descendant
//! - **Observable derivation**: a derived stage is usable the moment its
//!   combinator returns, even though its cell fills later
//!
//! # Module Structure
//!
//! - [`types`]: outcome and cancellation vocabulary ([`Outcome`],
//!   [`PanicPayload`], [`Scope`], [`Unit`])
//! - [`cell`]: the single-assignment outcome cell and its n-ary waits
//! - [`stage`]: the [`Stage`] handle, factories, completion and retrieval
//! - [`combinator`]: the derivation vocabulary (chain, both, either,
//!   compose, recover families)
//! - [`group`]: [`all_of`] and [`any_of`] over stage sequences
//! - [`lazy`]: the recording front-end that materialises chains on demand
//! - [`executor`]: the consumed executor contract and the bounded default pool
//! - [`config`]: pool sizing configuration with environment overrides
//! - [`error`]: error types
//!
//! # Example
//!
//! ```
//! use stagecraft::supply_async;
//!
//! let greeting = supply_async(|| "Hello".to_string(), None)
//!     .then_apply(|s| s + " world");
//! assert_eq!(greeting.get().unwrap(), "Hello world");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod cell;
pub mod combinator;
pub mod config;
pub mod error;
pub mod executor;
pub mod group;
pub mod lazy;
pub mod stage;
pub mod types;

// Re-exports for convenient access to core types
pub use cell::OutcomeCell;
pub use config::{ConfigError, PoolConfig};
pub use error::{Error, ErrorKind, Result};
pub use executor::{
    default_executor, set_default_executor, Executor, ExecutorHandle, FixedWorkerPool,
    SubmitError, Task, ThreadPerTaskExecutor,
};
pub use group::{all_of, any_of};
pub use stage::{completed, run_async, supply_async, Stage};
pub use types::{Outcome, PanicPayload, Scope, Unit};
