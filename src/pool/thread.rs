//! # Thread Wrappers
//!
//! A thin lifecycle layer over `std::thread`: an exit request the body is
//! expected to poll, a finished flag raised even when the body panics, and a
//! bounded join for disposal. [`ActionThread`] is the public face, running a
//! user closure with a [`ThreadContext`] that can post work back to a target
//! dispatcher; pool workers reuse the same core internally.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::core::ManualResetEvent;
use crate::dispatch::task::Task;
use crate::dispatch::{DispatchError, Dispatcher};

/// How long disposal waits for a thread before detaching it.
pub(crate) const DISPOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared lifecycle state of one wrapped OS thread.
pub(crate) struct ThreadCore {
    exit_event: ManualResetEvent,
    finished_event: ManualResetEvent,
    handle: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

// Raises the finished flag when the thread body returns, unwinding included,
// so a bounded join never waits on a thread that is already gone.
struct FinishedGuard(ManualResetEvent);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

impl ThreadCore {
    pub(crate) fn new() -> Self {
        Self {
            exit_event: ManualResetEvent::new(false),
            finished_event: ManualResetEvent::new(false),
            handle: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub(crate) fn spawn<F>(&self, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = FinishedGuard(self.finished_event.clone());
        let handle = thread::spawn(move || {
            let _guard = guard;
            body();
        });
        *self.handle.lock().unwrap() = Some(handle);
        self.started.store(true, Ordering::Release);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.finished_event.is_set()
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.exit_event.is_set()
    }

    pub(crate) fn exit_event(&self) -> &ManualResetEvent {
        &self.exit_event
    }

    /// Requests the thread to stop; returns immediately.
    pub(crate) fn exit(&self) {
        self.exit_event.set();
    }

    /// Requests the thread to stop and joins it.
    pub(crate) fn abort(&self) {
        self.exit();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            if handle.join().is_err() {
                log::error!("thread terminated by panic");
            }
        }
    }

    /// Requests the thread to stop and waits up to `timeout` for it to
    /// finish. On expiry the join handle is detached and the thread leaked;
    /// there is no safe way to terminate a running OS thread, so this is
    /// the last-resort escape hatch of the disposal path.
    pub(crate) fn abort_wait_timeout(&self, timeout: Duration) -> bool {
        self.exit();
        let mut slot = self.handle.lock().unwrap();
        match slot.take() {
            Some(handle) => {
                if self.finished_event.wait_timeout(timeout) {
                    if handle.join().is_err() {
                        log::error!("thread terminated by panic");
                    }
                    true
                } else {
                    log::error!("thread did not stop within {timeout:?}, detaching it");
                    drop(handle);
                    false
                }
            }
            None => true,
        }
    }
}

/// A background thread running one closure, with cooperative shutdown and a
/// line back to a target dispatcher.
///
/// The closure receives a [`ThreadContext`] and is expected to poll
/// [`ThreadContext::should_stop`] in its loop. Dropping the `ActionThread`
/// requests the stop and waits a bounded time for the thread to comply.
///
/// # Examples
/// ```
/// use task_dispatch::pool::ActionThread;
///
/// let worker = ActionThread::spawn(None, |ctx| {
///     while !ctx.should_stop() {
///         std::thread::sleep(std::time::Duration::from_millis(1));
///     }
/// });
/// worker.exit();
/// ```
pub struct ActionThread {
    core: Arc<ThreadCore>,
}

impl ActionThread {
    /// Spawns a thread running `action`. When `target` is given, the
    /// context can dispatch work back onto it (for example, to hand results
    /// to the thread owning that dispatcher). A panicking action is logged
    /// and ends the thread; it does not propagate.
    pub fn spawn<F>(target: Option<Dispatcher>, action: F) -> Self
    where
        F: FnOnce(&ThreadContext) + Send + 'static,
    {
        let core = Arc::new(ThreadCore::new());
        let context = ThreadContext {
            core: core.clone(),
            target,
        };
        core.spawn(move || {
            if catch_unwind(AssertUnwindSafe(|| action(&context))).is_err() {
                log::error!("action thread terminated by panic");
            }
        });
        Self { core }
    }

    /// True while the thread body is still running.
    pub fn is_alive(&self) -> bool {
        self.core.is_alive()
    }

    /// Requests the thread to stop; returns immediately.
    pub fn exit(&self) {
        self.core.exit();
    }

    /// Requests the thread to stop and blocks until it has finished.
    pub fn abort(&self) {
        self.core.abort();
    }

    /// Requests the thread to stop and blocks up to `timeout`. Returns
    /// whether the thread finished in time; on expiry it is detached.
    pub fn abort_wait_timeout(&self, timeout: Duration) -> bool {
        self.core.abort_wait_timeout(timeout)
    }
}

impl Drop for ActionThread {
    fn drop(&mut self) {
        self.core.abort_wait_timeout(DISPOSE_TIMEOUT);
    }
}

/// Handle passed into an [`ActionThread`] body.
pub struct ThreadContext {
    core: Arc<ThreadCore>,
    target: Option<Dispatcher>,
}

impl ThreadContext {
    /// True once the owner asked this thread to stop. Poll this in the
    /// thread's loop.
    pub fn should_stop(&self) -> bool {
        self.core.should_stop()
    }

    /// The exit request as an event, for combined waits such as
    /// [`Dispatcher::process_tasks_blocking`].
    pub fn exit_event(&self) -> &ManualResetEvent {
        self.core.exit_event()
    }

    /// Posts work to the target dispatcher and returns the handle without
    /// blocking.
    ///
    /// # Errors
    /// [`DispatchError::NoTargetDispatcher`] when the thread was spawned
    /// without a target, plus any error of the underlying dispatch.
    pub fn dispatch<T, F>(&self, work: F) -> Result<Task<T>, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match &self.target {
            Some(dispatcher) => dispatcher.dispatch(work),
            None => Err(DispatchError::NoTargetDispatcher),
        }
    }

    /// Posts work to the target dispatcher and blocks until it has been
    /// processed there, returning the computed value (`None` when the task
    /// was aborted or faulted on the target side).
    pub fn dispatch_and_wait<T, F>(&self, work: F) -> Result<Option<T>, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        Ok(self.dispatch(work)?.wait_result())
    }
}
