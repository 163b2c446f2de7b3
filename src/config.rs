//! Worker-pool configuration.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic** — fields set on a [`PoolConfig`] value
//! 2. **Environment variables** — `STAGECRAFT_*` overrides
//! 3. **Defaults** — [`PoolConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `STAGECRAFT_WORKERS` | `usize` | `workers` |
//! | `STAGECRAFT_QUEUE_CAPACITY` | `usize` | `queue_capacity` |
//! | `STAGECRAFT_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `STAGECRAFT_IDLE_TIMEOUT_MS` | `u64` | `idle_timeout` |

use std::time::Duration;

/// Environment variable name for the worker-thread cap.
pub const ENV_WORKERS: &str = "STAGECRAFT_WORKERS";
/// Environment variable name for the task queue capacity.
pub const ENV_QUEUE_CAPACITY: &str = "STAGECRAFT_QUEUE_CAPACITY";
/// Environment variable name for the worker thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "STAGECRAFT_THREAD_NAME_PREFIX";
/// Environment variable name for the idle-worker retirement timeout (ms).
pub const ENV_IDLE_TIMEOUT_MS: &str = "STAGECRAFT_IDLE_TIMEOUT_MS";

/// Default worker-thread cap.
pub const DEFAULT_WORKERS: usize = 1024;
/// Default bounded task-queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Error raised for unusable configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// The offending variable name.
        var: &'static str,
        /// Why the value is unusable.
        reason: String,
    },
}

/// Configuration for [`FixedWorkerPool`](crate::executor::FixedWorkerPool).
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `workers` | 1024 |
/// | `core_workers` | 1 |
/// | `queue_capacity` | 256 |
/// | `idle_timeout` | 10 s |
/// | `thread_name_prefix` | `"stagecraft-worker"` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of worker threads.
    pub workers: usize,
    /// Workers kept alive through idle periods.
    pub core_workers: usize,
    /// Capacity of the bounded task queue; submissions beyond it fail.
    pub queue_capacity: usize,
    /// Idle time after which workers above `core_workers` retire.
    pub idle_timeout: Duration,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            core_workers: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_timeout: Duration::from_secs(10),
            thread_name_prefix: "stagecraft-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Normalizes values to safe ones: at least one worker, a non-zero
    /// queue, `core_workers` within the cap, a non-empty name prefix.
    pub fn normalize(&mut self) {
        if self.workers == 0 {
            self.workers = 1;
        }
        if self.queue_capacity == 0 {
            self.queue_capacity = 1;
        }
        if self.core_workers > self.workers {
            self.core_workers = self.workers;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = "stagecraft-worker".to_string();
        }
    }

    /// Applies `STAGECRAFT_*` environment overrides.
    ///
    /// Only variables that are set are applied. Returns an error if a
    /// variable is set but unparseable.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(val) = read_env(ENV_WORKERS) {
            self.workers = parse_usize(ENV_WORKERS, &val)?;
        }
        if let Some(val) = read_env(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = parse_usize(ENV_QUEUE_CAPACITY, &val)?;
        }
        if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
            self.thread_name_prefix = val;
        }
        if let Some(val) = read_env(ENV_IDLE_TIMEOUT_MS) {
            self.idle_timeout = Duration::from_millis(parse_u64(ENV_IDLE_TIMEOUT_MS, &val)?);
        }
        Ok(())
    }

    /// Builds the configuration the default executor uses: defaults,
    /// environment overrides, normalization. An unparseable variable is
    /// reported through `tracing` and ignored.
    #[must_use]
    pub fn resolved() -> Self {
        let mut config = Self::default();
        if let Err(e) = config.apply_env_overrides() {
            tracing::warn!(error = %e, "ignoring invalid pool configuration override");
        }
        config.normalize();
        config
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            var,
            reason: format!("expected unsigned integer, got {val:?} ({e})"),
        })
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            var,
            reason: format!("expected u64, got {val:?} ({e})"),
        })
}
