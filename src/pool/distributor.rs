//! # Task Distributor
//!
//! The pool coordinator: a shared pending queue plus a fixed set of
//! [`TaskWorker`] threads, each draining its own private dispatcher.
//! Producers dispatch into the shared queue; workers pull work out of it one
//! task at a time as they go idle. Tasks handed to different workers may
//! complete out of enqueue order — that is the load balancing, not a bug.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use serde::Deserialize;

use crate::core::ManualResetEvent;
use crate::dispatch::queue::TaskQueue;
use crate::dispatch::task::Task;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::pool::thread::DISPOSE_TIMEOUT;
use crate::pool::worker::{current_worker_of, TaskWorker};

static NEXT_DISTRIBUTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration of a [`TaskDistributor`].
///
/// `worker_threads == 0` asks for the hardware default: available
/// parallelism × 3, sized generously because pool tasks are expected to
/// spend part of their time blocked rather than saturating a core each.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Number of worker threads; `0` means available parallelism × 3.
    pub worker_threads: usize,
    /// Start the workers during construction. Disable to queue work first
    /// and spin the pool up later with [`TaskDistributor::start`].
    pub auto_start: bool,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            auto_start: true,
        }
    }
}

/// State shared between the distributor handle and its workers.
pub(crate) struct PoolShared {
    queue: TaskQueue,
    id: u64,
}

impl PoolShared {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn data_event(&self) -> &ManualResetEvent {
        self.queue.data_event()
    }

    /// Moves one task from the shared queue into `target`. A no-op when the
    /// shared queue is empty; never loses or duplicates a task, since the
    /// splice happens under the queue lock.
    pub(crate) fn fill(&self, target: &Dispatcher) {
        target.add_tasks(self.queue.isolate(1));
    }
}

/// A pool of background worker threads fed from one shared task queue.
///
/// # Examples
/// ```
/// use task_dispatch::pool::{DistributorConfig, TaskDistributor};
///
/// let pool = TaskDistributor::new(DistributorConfig {
///     worker_threads: 2,
///     auto_start: true,
/// });
///
/// let task = pool.dispatch(|| 2 + 2).unwrap();
/// assert_eq!(task.wait_result(), Some(4));
/// ```
pub struct TaskDistributor {
    shared: Arc<PoolShared>,
    workers: Vec<TaskWorker>,
}

impl TaskDistributor {
    /// Creates a distributor per `config`, starting the workers right away
    /// unless `auto_start` is off.
    ///
    /// # Arguments
    /// * `config` - Worker count and start behaviour; see
    ///   [`DistributorConfig`]
    ///
    /// # Returns
    /// A distributor whose workers are running when `auto_start` is set,
    /// and dormant until [`start`](Self::start) otherwise.
    pub fn new(config: DistributorConfig) -> Self {
        let worker_count = if config.worker_threads == 0 {
            let parallelism = thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1);
            log::info!("available parallelism: {parallelism}");
            parallelism * 3
        } else {
            config.worker_threads
        };
        log::info!("task distributor created with {worker_count} worker threads");

        let distributor = Self {
            shared: Arc::new(PoolShared {
                queue: TaskQueue::new(),
                id: NEXT_DISTRIBUTOR_ID.fetch_add(1, Ordering::Relaxed),
            }),
            workers: (0..worker_count).map(|_| TaskWorker::new()).collect(),
        };

        if config.auto_start {
            distributor.start();
        }
        distributor
    }

    /// Starts every worker that is not already running. Each one is
    /// pre-loaded with an even share of the queued backlog before its
    /// thread spins up, so a pool started late begins balanced.
    pub fn start(&self) {
        for worker in &self.workers {
            if !worker.is_alive() {
                worker
                    .dispatcher()
                    .add_tasks(self.shared.queue.split(self.workers.len()));
                worker.start(self.shared.clone());
            }
        }
    }

    /// Enqueues `work` for the pool and returns its handle immediately.
    ///
    /// # Errors
    /// [`DispatchError::OwnDistributor`] when called from one of this
    /// distributor's own worker threads. A task that needs to fan out
    /// further must use a different distributor or dispatcher; feeding the
    /// pool from within is how pools starve themselves.
    pub fn dispatch<T, F>(&self, work: F) -> Result<Task<T>, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if current_worker_of() == Some(self.shared.id) {
            return Err(DispatchError::OwnDistributor);
        }
        let (task, runnable) = Task::new_pair(work);
        self.shared.queue.add(runnable);
        Ok(task)
    }

    /// Number of tasks still waiting in the shared queue. Tasks already
    /// pulled into a worker's private queue no longer count here.
    pub fn task_count(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of worker threads in the pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for TaskDistributor {
    fn default() -> Self {
        Self::new(DistributorConfig::default())
    }
}

impl Drop for TaskDistributor {
    fn drop(&mut self) {
        log::info!("disposing task distributor with {} workers", self.workers.len());
        // Stop the pulls first, then resolve everything still pending so no
        // waiter is left hanging on a queue nobody drains anymore.
        for worker in &self.workers {
            worker.exit();
        }
        self.shared.queue.drain_cancel();
        for worker in &self.workers {
            worker.dispatcher().cancel_all();
        }
        for worker in &self.workers {
            worker.abort_wait_timeout(DISPOSE_TIMEOUT);
        }
    }
}
