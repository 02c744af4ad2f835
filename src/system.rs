//! # Task System
//!
//! The bootstrap object tying the pieces together for a frame-driven host:
//! one dispatcher bound to the host's main thread, one worker pool, and a
//! registry of spawned background threads. The host constructs a
//! [`TaskSystem`] at startup, calls [`TaskSystem::process_tasks`] once per
//! tick of its loop, and drops the system at shutdown to stop everything.
//!
//! There are no hidden globals: anything that wants to reach "the" main
//! dispatcher or "the" pool is handed a clone or a reference explicitly.
//!
//! ## Example
//! ```
//! use task_dispatch::system::{TaskSystem, TaskSystemConfig};
//!
//! let system = TaskSystem::new(TaskSystemConfig::default());
//!
//! // Background work on the pool, result handling on the main thread.
//! let computed = system.distributor().dispatch(|| 6 * 7).unwrap();
//!
//! // In the host loop:
//! while !computed.has_ended() {
//!     system.process_tasks();
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! system.process_tasks();
//! assert_eq!(computed.wait_result(), Some(42));
//! ```

use std::sync::Mutex;

use serde::Deserialize;

use crate::dispatch::Dispatcher;
use crate::pool::{ActionThread, DistributorConfig, TaskDistributor, ThreadContext};

/// Configuration of a [`TaskSystem`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskSystemConfig {
    /// Settings of the worker pool the system owns.
    pub distributor: DistributorConfig,
}

/// Owns the main-thread dispatcher, the default worker pool and every
/// thread spawned through [`spawn_thread`](Self::spawn_thread).
///
/// Construct it on the thread that runs the host loop; that thread becomes
/// the home of the main dispatcher. Dropping the system drains both queues,
/// stops the pool and joins the registered threads (bounded).
pub struct TaskSystem {
    // Threads go down first: their contexts post to the dispatcher, which
    // must still resolve those tasks during its own teardown below.
    threads: Mutex<Vec<ActionThread>>,
    distributor: TaskDistributor,
    dispatcher: Dispatcher,
}

impl TaskSystem {
    /// Creates the system on the calling thread.
    ///
    /// # Panics
    /// Panics when the calling thread already has a bound dispatcher, since
    /// the system binds one of its own.
    pub fn new(config: TaskSystemConfig) -> Self {
        let system = Self {
            threads: Mutex::new(Vec::new()),
            distributor: TaskDistributor::new(config.distributor),
            dispatcher: Dispatcher::new(),
        };
        log::info!("task system initialized");
        system
    }

    /// The dispatcher bound to the thread that created the system. Clone it
    /// into producers that need to post work back to the host thread.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The system's worker pool.
    pub fn distributor(&self) -> &TaskDistributor {
        &self.distributor
    }

    /// Spawns a registered background thread whose context targets the main
    /// dispatcher, so the body can `dispatch_and_wait` results onto the host
    /// thread. The thread is stopped at system teardown; a body that
    /// finishes earlier is reaped by [`process_tasks`](Self::process_tasks).
    ///
    /// # Arguments
    /// * `action` - The thread body; expected to poll
    ///   [`ThreadContext::should_stop`](crate::pool::ThreadContext::should_stop)
    ///   in its loop
    pub fn spawn_thread<F>(&self, action: F)
    where
        F: FnOnce(&ThreadContext) + Send + 'static,
    {
        let thread = ActionThread::spawn(Some(self.dispatcher.clone()), action);
        self.threads.lock().unwrap().push(thread);
    }

    /// Number of registered background threads still alive.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    /// One tick of housekeeping, to be called from the host loop on the
    /// thread that created the system: drains the main dispatcher and reaps
    /// finished background threads.
    pub fn process_tasks(&self) {
        self.dispatcher.process_tasks();
        self.threads.lock().unwrap().retain(ActionThread::is_alive);
    }
}
