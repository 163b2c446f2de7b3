//! The executor contract consumed by the core, and the executors the crate
//! ships.
//!
//! Async combinators submit zero-argument tasks through [`Executor::run`].
//! Submission is fallible: a bounded pool may reject when its queue is full
//! or after shutdown, and that failure is stored in the derived stage's
//! cell as a captured panic. [`Executor::stop`] requests shutdown; the core
//! never calls it.
//!
//! The process-wide default executor is a [`FixedWorkerPool`] built lazily
//! on first use from [`PoolConfig::resolved`] and replaceable through
//! [`set_default_executor`].

mod pool;

pub use pool::FixedWorkerPool;

use crate::config::PoolConfig;
use std::sync::{Arc, OnceLock, RwLock};

/// A unit of work accepted by an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A shared executor reference, as accepted by every async combinator.
pub type ExecutorHandle = Arc<dyn Executor>;

/// Error returned when a task cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The bounded task queue is full.
    #[error("task queue is full")]
    QueueFull,
    /// The executor has been stopped.
    #[error("executor is shut down")]
    Shutdown,
    /// The host refused to spawn a worker thread.
    #[error("worker thread could not be spawned: {0}")]
    Spawn(String),
}

/// A worker pool that runs zero-argument tasks.
pub trait Executor: Send + Sync {
    /// Submits a task. Fails if the executor cannot accept it.
    fn run(&self, task: Task) -> Result<(), SubmitError>;

    /// Requests shutdown. Queued tasks may still drain; new submissions
    /// fail.
    fn stop(&self);
}

/// An executor that spawns one thread per task and never queues.
///
/// Unbounded by design; useful in tests and for workloads that must not
/// contend with the shared pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPerTaskExecutor;

impl Executor for ThreadPerTaskExecutor {
    fn run(&self, task: Task) -> Result<(), SubmitError> {
        std::thread::Builder::new()
            .name("stagecraft-adhoc".to_string())
            .spawn(task)
            .map(|_| ())
            .map_err(|e| SubmitError::Spawn(e.to_string()))
    }

    fn stop(&self) {}
}

fn registry() -> &'static RwLock<ExecutorHandle> {
    static DEFAULT: OnceLock<RwLock<ExecutorHandle>> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        RwLock::new(Arc::new(FixedWorkerPool::with_config(PoolConfig::resolved())) as ExecutorHandle)
    })
}

/// Returns the process-wide default executor, constructing it on first use.
#[must_use]
pub fn default_executor() -> ExecutorHandle {
    registry()
        .read()
        .expect("executor registry lock poisoned")
        .clone()
}

/// Replaces the process-wide default executor.
///
/// Stages created before the call keep running on the executor they were
/// submitted to; only subsequent submissions see the replacement.
pub fn set_default_executor(executor: ExecutorHandle) {
    *registry()
        .write()
        .expect("executor registry lock poisoned") = executor;
}
