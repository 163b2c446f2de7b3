#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

use std::sync::Once;
use std::time::{Duration, Instant};

static INIT_LOGGING: Once = Once::new();

/// Environment variable overriding the property-test case count.
pub const PROPTEST_CASES_ENV: &str = "STAGECRAFT_PROPTEST_CASES";

/// Installs the test subscriber once per binary. `RUST_LOG` filters as
/// usual.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Property-test case count: env override or a CI-friendly default.
#[must_use]
pub fn proptest_cases() -> u32 {
    std::env::var(PROPTEST_CASES_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(32)
}

/// Runs `f` and returns its result with the elapsed wall time.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

/// Asserts `elapsed` lies within `[min, max)`, with a readable failure.
pub fn assert_elapsed_between(elapsed: Duration, min: Duration, max: Duration) {
    assert!(
        elapsed >= min && elapsed < max,
        "elapsed {elapsed:?} outside [{min:?}, {max:?})"
    );
}
