//! Bounded worker pool, the crate's default executor.
//!
//! A fixed-capacity task queue drained by worker threads that are spawned
//! lazily up to a cap. Idle workers park on a condvar; workers above the
//! configured floor retire after an idle timeout.
//!
//! # Design
//!
//! Submission never blocks: a full queue rejects with
//! [`SubmitError::QueueFull`] and the caller decides what that means (for
//! async combinators it becomes a captured-panic outcome on the derived
//! stage). Workers re-check the queue under the park mutex before waiting,
//! so a submission cannot slip between the empty-check and the park.

use super::{Executor, SubmitError, Task};
use crate::config::PoolConfig;
use crossbeam_queue::ArrayQueue;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// The bounded default worker pool.
pub struct FixedWorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// Maximum number of worker threads.
    max_workers: usize,
    /// Workers kept alive through idle periods.
    core_workers: usize,
    /// Idle time after which excess workers retire.
    idle_timeout: std::time::Duration,
    /// Worker thread name prefix.
    name_prefix: String,
    /// Bounded task queue; fullness is the rejection signal.
    queue: ArrayQueue<Task>,
    /// Current number of live workers.
    active: AtomicUsize,
    /// Workers currently executing a task.
    busy: AtomicUsize,
    /// Monotonic id source for thread names.
    next_worker_id: AtomicUsize,
    /// Shutdown flag; set once, never cleared.
    shutdown: AtomicBool,
    /// Park mutex for the condvar.
    mutex: Mutex<()>,
    /// Parked-worker wakeup.
    condvar: Condvar,
}

impl FixedWorkerPool {
    /// Creates a pool with the default configuration
    /// (1024 workers, 256 queue slots).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a pool from an explicit configuration. The configuration is
    /// normalized first.
    #[must_use]
    pub fn with_config(mut config: PoolConfig) -> Self {
        config.normalize();
        let inner = Arc::new(PoolInner {
            max_workers: config.workers,
            core_workers: config.core_workers,
            idle_timeout: config.idle_timeout,
            name_prefix: config.thread_name_prefix,
            queue: ArrayQueue::new(config.queue_capacity),
            active: AtomicUsize::new(0),
            busy: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        });

        for _ in 0..inner.core_workers {
            spawn_worker(&inner);
        }

        Self { inner }
    }

    /// Returns the number of live worker threads.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Returns the number of workers currently executing a task.
    #[must_use]
    pub fn busy_workers(&self) -> usize {
        self.inner.busy.load(Ordering::Relaxed)
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

impl Default for FixedWorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for FixedWorkerPool {
    fn run(&self, task: Task) -> Result<(), SubmitError> {
        if self.is_shutdown() {
            return Err(SubmitError::Shutdown);
        }
        if self.inner.queue.push(task).is_err() {
            tracing::warn!(
                capacity = self.inner.queue.capacity(),
                "task rejected: queue is full"
            );
            return Err(SubmitError::QueueFull);
        }
        maybe_spawn_worker(&self.inner);
        let _guard = self.inner.mutex.lock().expect("pool mutex poisoned");
        self.inner.condvar.notify_one();
        Ok(())
    }

    fn stop(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let _guard = self.inner.mutex.lock().expect("pool mutex poisoned");
        self.inner.condvar.notify_all();
        tracing::debug!("worker pool shutdown requested");
    }
}

impl Drop for FixedWorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FixedWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWorkerPool")
            .field("max_workers", &self.inner.max_workers)
            .field("active", &self.active_workers())
            .field("busy", &self.busy_workers())
            .field("queued", &self.inner.queue.len())
            .finish()
    }
}

fn spawn_worker(inner: &Arc<PoolInner>) {
    let worker_id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
    inner.active.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-{}", inner.name_prefix, worker_id);
    let pool = Arc::clone(inner);
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            tracing::trace!(worker_id, "worker started");
            worker_loop(&pool);
            pool.active.fetch_sub(1, Ordering::Relaxed);
            tracing::trace!(worker_id, "worker exited");
        })
        .expect("failed to spawn pool worker thread");
}

/// Spawn another worker when demand (running plus queued work) exceeds the
/// live worker count.
fn maybe_spawn_worker(inner: &Arc<PoolInner>) {
    let active = inner.active.load(Ordering::Relaxed);
    let busy = inner.busy.load(Ordering::Relaxed);
    let queued = inner.queue.len();
    if active < inner.max_workers && busy + queued > active {
        spawn_worker(inner);
    }
}

fn worker_loop(inner: &Arc<PoolInner>) {
    loop {
        if let Some(task) = inner.queue.pop() {
            inner.busy.fetch_add(1, Ordering::Relaxed);
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                // Tasks produced by this crate trap their own panics; this
                // guards directly-submitted user tasks.
                tracing::error!("submitted task panicked");
            }
            inner.busy.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let guard = inner.mutex.lock().expect("pool mutex poisoned");
        // Re-check under the park mutex: a submit may have landed between
        // the failed pop and this lock.
        if !inner.queue.is_empty() || inner.shutdown.load(Ordering::Acquire) {
            continue;
        }
        if inner.active.load(Ordering::Relaxed) > inner.core_workers {
            let (guard, timeout) = inner
                .condvar
                .wait_timeout(guard, inner.idle_timeout)
                .expect("pool mutex poisoned");
            drop(guard);
            if timeout.timed_out()
                && inner.queue.is_empty()
                && !inner.shutdown.load(Ordering::Acquire)
                && inner.active.load(Ordering::Relaxed) > inner.core_workers
            {
                break;
            }
        } else {
            let guard = inner.condvar.wait(guard).expect("pool mutex poisoned");
            drop(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::Barrier;
    use std::time::{Duration, Instant};

    fn small_pool(workers: usize, queue: usize) -> FixedWorkerPool {
        FixedWorkerPool::with_config(PoolConfig {
            workers,
            core_workers: 1,
            queue_capacity: queue,
            idle_timeout: Duration::from_millis(50),
            thread_name_prefix: "pool-test".to_string(),
        })
    }

    fn wait_until(deadline: Duration, mut ready: impl FnMut() -> bool) {
        let stop = Instant::now() + deadline;
        while !ready() {
            assert!(Instant::now() < stop, "condition never became true");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn runs_submitted_tasks() {
        let pool = small_pool(4, 16);
        let counter = Arc::new(AtomicI32::new(0));

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.run(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }))
            .expect("submission accepted");
        }

        wait_until(Duration::from_secs(2), || {
            counter.load(Ordering::Relaxed) == 20
        });
    }

    #[test]
    fn rejects_when_queue_is_full() {
        let pool = small_pool(1, 2);
        let gate = Arc::new(Barrier::new(2));

        let blocker = Arc::clone(&gate);
        pool.run(Box::new(move || {
            blocker.wait();
        }))
        .expect("blocker accepted");
        wait_until(Duration::from_secs(2), || pool.busy_workers() == 1);

        pool.run(Box::new(|| {})).expect("first fill accepted");
        pool.run(Box::new(|| {})).expect("second fill accepted");
        assert_eq!(pool.run(Box::new(|| {})), Err(SubmitError::QueueFull));

        gate.wait();
    }

    #[test]
    fn rejects_after_stop() {
        let pool = small_pool(2, 4);
        pool.stop();
        assert!(pool.is_shutdown());
        assert_eq!(pool.run(Box::new(|| {})), Err(SubmitError::Shutdown));
    }

    #[test]
    fn scales_workers_under_load() {
        let pool = small_pool(3, 8);
        let gate = Arc::new(Barrier::new(4));

        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            pool.run(Box::new(move || {
                gate.wait();
            }))
            .expect("submission accepted");
        }

        wait_until(Duration::from_secs(2), || pool.busy_workers() == 3);
        assert!(pool.active_workers() >= 3);
        gate.wait();
    }

    #[test]
    fn excess_workers_retire_when_idle() {
        let pool = small_pool(3, 8);
        let gate = Arc::new(Barrier::new(4));

        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            pool.run(Box::new(move || {
                gate.wait();
            }))
            .expect("submission accepted");
        }
        wait_until(Duration::from_secs(2), || pool.busy_workers() == 3);
        gate.wait();

        wait_until(Duration::from_secs(2), || pool.active_workers() <= 1);
    }

    #[test]
    fn survives_a_panicking_task() {
        let pool = small_pool(1, 4);
        pool.run(Box::new(|| panic!("intentional"))).expect("accepted");

        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        pool.run(Box::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        }))
        .expect("accepted after panic");

        wait_until(Duration::from_secs(2), || {
            counter.load(Ordering::Relaxed) == 1
        });
    }
}
