//! # Task Handles
//!
//! A [`Task`] is the handle returned by every dispatch call. The producer
//! keeps the handle; the closure itself is executed later, on whichever
//! thread drains the queue the task was pushed onto.
//!
//! ## Lifecycle
//! 1. A task is created by `dispatch` and sits pending in a queue
//! 2. The owning thread (or a pool worker) runs the closure at most once
//! 3. The handle's ended flag is raised, waking every waiter
//!
//! A task ends in exactly one of three ways: it ran to completion
//! (*succeeded*), it was aborted before or during its run (*aborted*), or its
//! closure panicked and the fault was captured (*faulted*).
//!
//! ## Cancellation
//! Cancellation is cooperative. [`Task::abort`] raises a flag; a task that
//! has not started yet is skipped entirely, while a running closure keeps
//! going until it polls [`CurrentTask::should_abort`] (via [`current_task`])
//! and returns on its own. Nothing ever kills a running closure.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::ManualResetEvent;

/// Queue-side view of a task: execution plus the state control shared with
/// the public handle.
pub(crate) trait ErasedTask: Send + Sync {
    /// Runs the closure if the task was not aborted beforehand, then marks
    /// the task ended. Called exactly once, by the owning consumer thread.
    fn run(&self);

    /// Requests cooperative cancellation.
    fn abort(&self);

    /// True when cancellation has been requested.
    fn should_abort(&self) -> bool;

    /// True once the task reached a terminal state.
    fn has_ended(&self) -> bool;

    /// Blocks until the task reaches a terminal state.
    fn wait(&self);

    /// Resolves the task as aborted without running it. Used when a queue is
    /// drained during disposal so that outstanding waits still return.
    fn cancel(&self);
}

struct TaskInner<T> {
    work: Mutex<Option<Box<dyn FnOnce() -> T + Send>>>,
    result: Mutex<Option<T>>,
    fault: Mutex<Option<String>>,
    abort_event: ManualResetEvent,
    ended_event: ManualResetEvent,
    started: AtomicBool,
}

impl<T: Send + 'static> ErasedTask for TaskInner<T> {
    fn run(&self) {
        self.started.store(true, Ordering::Release);
        if !self.abort_event.is_set() {
            // Taking the closure out of the slot is what makes a second run
            // impossible, whatever the caller does with the handle.
            let work = self.work.lock().unwrap().take();
            if let Some(work) = work {
                match catch_unwind(AssertUnwindSafe(work)) {
                    Ok(value) => *self.result.lock().unwrap() = Some(value),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        log::error!("task faulted: {message}");
                        *self.fault.lock().unwrap() = Some(message);
                    }
                }
            }
        }
        self.ended_event.set();
    }

    fn abort(&self) {
        self.abort_event.set();
    }

    fn should_abort(&self) -> bool {
        self.abort_event.is_set()
    }

    fn has_ended(&self) -> bool {
        self.ended_event.is_set()
    }

    fn wait(&self) {
        self.ended_event.wait();
    }

    fn cancel(&self) {
        self.abort_event.set();
        self.ended_event.set();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Handle to a dispatched unit of work, generic over the closure's result.
///
/// Handles are cheap to clone and share; all clones observe the same task.
/// Dropping every handle does not cancel the task — the queue that holds it
/// still runs (or resolves) it.
///
/// # Examples
/// ```
/// use task_dispatch::dispatch::Dispatcher;
///
/// let dispatcher = Dispatcher::new();
/// # let dispatcher2 = dispatcher.clone();
/// # std::thread::spawn(move || {
/// let task = dispatcher2.dispatch(|| 6 * 7).unwrap();
/// # }).join().unwrap();
/// dispatcher.process_tasks();
/// ```
pub struct Task<T = ()> {
    inner: Arc<TaskInner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("has_ended", &self.inner.ended_event.is_set())
            .field("should_abort", &self.inner.abort_event.is_set())
            .field("is_faulted", &self.inner.fault.lock().unwrap().is_some())
            .finish()
    }
}

impl<T: Send + 'static> Task<T> {
    /// Builds the public handle together with the queue-side runnable that
    /// shares its state.
    pub(crate) fn new_pair<F>(work: F) -> (Self, Arc<dyn ErasedTask>)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let inner = Arc::new(TaskInner {
            work: Mutex::new(Some(Box::new(work) as Box<dyn FnOnce() -> T + Send>)),
            result: Mutex::new(None),
            fault: Mutex::new(None),
            abort_event: ManualResetEvent::new(false),
            ended_event: ManualResetEvent::new(false),
            started: AtomicBool::new(false),
        });
        let erased: Arc<dyn ErasedTask> = inner.clone();
        (Self { inner }, erased)
    }

    /// Returns true when cancellation has been requested. A task that should
    /// abort and has not started yet will never start; it ends in the
    /// aborted state instead.
    pub fn should_abort(&self) -> bool {
        self.inner.should_abort()
    }

    /// Returns true once the task reached a terminal state, including the
    /// skipped-by-early-abort case.
    pub fn has_ended(&self) -> bool {
        self.inner.has_ended()
    }

    /// True when the closure ran to completion without an abort request or a
    /// captured fault.
    pub fn is_succeeded(&self) -> bool {
        self.has_ended() && !self.should_abort() && !self.is_faulted()
    }

    /// True when the task ended with cancellation requested, whether it was
    /// skipped before running or the closure observed the request and bailed
    /// out.
    pub fn is_failed(&self) -> bool {
        self.has_ended() && self.should_abort()
    }

    /// True when the closure panicked. The panic message is available via
    /// [`fault_message`](Self::fault_message).
    pub fn is_faulted(&self) -> bool {
        self.inner.fault.lock().unwrap().is_some()
    }

    /// The captured panic message of a faulted task, if any.
    pub fn fault_message(&self) -> Option<String> {
        self.inner.fault.lock().unwrap().clone()
    }

    /// Requests cooperative cancellation. If the task has not started it
    /// will be skipped; a running closure must poll
    /// [`CurrentTask::should_abort`] and return on its own.
    pub fn abort(&self) {
        self.inner.abort();
    }

    /// Requests cancellation and blocks until the task has ended.
    pub fn abort_and_wait(&self) {
        self.abort();
        self.wait();
    }

    /// Requests cancellation and blocks until the task has ended or the
    /// timeout elapses. Returns whether the task ended in time.
    pub fn abort_wait_timeout(&self, timeout: Duration) -> bool {
        self.abort();
        self.wait_timeout(timeout)
    }

    /// Blocks the calling thread until the task has ended. Waiting never
    /// runs the task; execution only happens on the owning consumer thread.
    pub fn wait(&self) {
        self.inner.wait();
    }

    /// Blocks up to `timeout`. Returns whether the task ended in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.ended_event.wait_timeout(timeout)
    }

    /// Blocks until the task has ended, then takes the computed value.
    ///
    /// Returns `None` when the task was aborted or faulted, and also when
    /// the value was already taken by an earlier call; check
    /// [`is_succeeded`](Self::is_succeeded) to tell the cases apart.
    pub fn wait_result(&self) -> Option<T> {
        self.wait();
        self.inner.result.lock().unwrap().take()
    }

    /// Blocks up to `timeout`, then returns the computed value or `default`
    /// when the task has not succeeded (or did not finish) in time.
    pub fn wait_result_timeout(&self, timeout: Duration, default: T) -> T {
        if !self.has_ended() {
            self.wait_timeout(timeout);
        }
        if self.is_succeeded() {
            self.inner.result.lock().unwrap().take().unwrap_or(default)
        } else {
            default
        }
    }
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<dyn ErasedTask>>> = const { RefCell::new(None) };
}

/// Runs one task with the thread-local current-task marker scoped to exactly
/// this execution, so the closure can reach its own handle through
/// [`current_task`].
pub(crate) fn run_task(task: &Arc<dyn ErasedTask>) {
    let previous = CURRENT_TASK.with(|cell| cell.replace(Some(task.clone())));
    task.run();
    CURRENT_TASK.with(|cell| *cell.borrow_mut() = previous);
}

/// The handle a task body uses to introspect or cancel itself.
///
/// Obtained through [`current_task`], valid only for the duration of the
/// body that fetched it.
pub struct CurrentTask {
    task: Arc<dyn ErasedTask>,
}

impl CurrentTask {
    /// Requests cancellation of the running task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// True when cancellation of the running task has been requested.
    pub fn should_abort(&self) -> bool {
        self.task.should_abort()
    }
}

/// Returns the task currently being processed on this thread.
///
/// # Panics
/// Panics when called outside a task body; that is a usage error, not a
/// runtime condition.
pub fn current_task() -> CurrentTask {
    CURRENT_TASK.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|task| CurrentTask { task: task.clone() })
            .expect("no task is currently running on this thread")
    })
}
