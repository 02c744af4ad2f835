//! # Dispatcher
//!
//! A thread-affine task queue. Any thread may enqueue work through
//! [`Dispatcher::dispatch`]; only the thread the dispatcher is bound to
//! drains and executes it, typically once per tick of that thread's loop.
//! This is how background threads hand results back to a main thread that
//! owns non-thread-safe state.
//!
//! Tasks execute in enqueue order. There is no priority reordering within a
//! dispatcher; consumers that need priorities can layer a
//! [`BinaryHeap`](crate::collections::BinaryHeap) in front of one.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::{wait_any, ManualResetEvent};
use crate::dispatch::error::DispatchError;
use crate::dispatch::queue::TaskQueue;
use crate::dispatch::task::{run_task, ErasedTask, Task};

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static BOUND_DISPATCHER: Cell<Option<u64>> = const { Cell::new(None) };
}

pub(crate) struct DispatcherShared {
    queue: TaskQueue,
    id: u64,
    binds_thread: bool,
    // The task currently executing on the consumer thread, so disposal can
    // request its cooperative abort.
    in_flight: Mutex<Option<Arc<dyn ErasedTask>>>,
    disposing: AtomicBool,
}

impl Drop for DispatcherShared {
    fn drop(&mut self) {
        // Resolve whatever is still queued so outstanding waits return
        // instead of hanging on a dispatcher that no longer drains.
        self.queue.drain_cancel();
        if self.binds_thread {
            BOUND_DISPATCHER.with(|cell| {
                if cell.get() == Some(self.id) {
                    cell.set(None);
                }
            });
        }
    }
}

/// A single-consumer task queue bound to the thread that created it.
///
/// The handle is cheap to clone; clones refer to the same queue, so a bound
/// dispatcher can be handed to producer threads while the owning thread
/// keeps draining it.
///
/// # Examples
/// ```
/// use task_dispatch::dispatch::Dispatcher;
///
/// let dispatcher = Dispatcher::new();
/// let producer = dispatcher.clone();
///
/// let handle = std::thread::spawn(move || {
///     producer.dispatch(|| "done").unwrap()
/// });
/// let task = handle.join().unwrap();
///
/// dispatcher.process_tasks();
/// assert_eq!(task.wait_result(), Some("done"));
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<DispatcherShared>,
}

impl Dispatcher {
    /// Creates a dispatcher bound to the calling thread. Only this thread
    /// may process the queue.
    ///
    /// # Panics
    /// Panics when the calling thread already has a bound dispatcher; one
    /// queue per thread keeps "the current thread's dispatcher" unambiguous.
    pub fn new() -> Self {
        let dispatcher = Self::with_binding(true);
        BOUND_DISPATCHER.with(|cell| {
            if cell.get().is_some() {
                panic!("only one Dispatcher may be bound per thread");
            }
            cell.set(Some(dispatcher.shared.id));
        });
        dispatcher
    }

    /// Creates a dispatcher with no thread binding. Pool workers use this
    /// for their private queues, which are filled by the distributor and
    /// drained by the worker without ever being "the current dispatcher" of
    /// any thread.
    pub(crate) fn unbound() -> Self {
        Self::with_binding(false)
    }

    fn with_binding(binds_thread: bool) -> Self {
        Self {
            shared: Arc::new(DispatcherShared {
                queue: TaskQueue::new(),
                id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
                binds_thread,
                in_flight: Mutex::new(None),
                disposing: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueues `work` and returns its handle immediately; the closure runs
    /// later on the owning thread.
    ///
    /// # Errors
    /// [`DispatchError::OwnDispatcher`] when called from the thread this
    /// dispatcher is bound to — such work can be run directly, and queueing
    /// it invites a self-deadlocking wait.
    pub fn dispatch<T, F>(&self, work: F) -> Result<Task<T>, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.check_access()?;
        let (task, runnable) = Task::new_pair(work);
        self.shared.queue.add(runnable);
        Ok(task)
    }

    fn check_access(&self) -> Result<(), DispatchError> {
        let own = BOUND_DISPATCHER.with(|cell| cell.get() == Some(self.shared.id));
        if own {
            Err(DispatchError::OwnDispatcher)
        } else {
            Ok(())
        }
    }

    /// Drains and executes every currently queued task, in FIFO order, on
    /// the calling thread. Non-blocking: returns immediately when the queue
    /// is empty. Call this once per tick from the owning thread.
    pub fn process_tasks(&self) {
        if self.shared.queue.data_event().is_set() {
            self.drain();
        }
    }

    /// Blocks until either `exit` is signalled or work becomes available,
    /// then drains the queue. Returns `false` when it woke because of the
    /// exit signal, `true` otherwise.
    pub fn process_tasks_blocking(&self, exit: &ManualResetEvent) -> bool {
        match wait_any(&[exit, self.shared.queue.data_event()], None) {
            Some(0) => false,
            _ => {
                self.drain();
                true
            }
        }
    }

    /// Executes at most one queued task on the calling thread. Returns
    /// whether a task was processed. Useful for interleaving queue work
    /// with other per-tick duties.
    pub fn process_next_task(&self) -> bool {
        match self.shared.queue.pop() {
            Some(task) => {
                self.execute(task);
                true
            }
            None => false,
        }
    }

    /// Blocks until either `exit` is signalled or work becomes available,
    /// then executes at most one task. Returns `false` when it woke because
    /// of the exit signal, `true` otherwise.
    pub fn process_next_task_blocking(&self, exit: &ManualResetEvent) -> bool {
        match wait_any(&[exit, self.shared.queue.data_event()], None) {
            Some(0) => false,
            _ => {
                self.process_next_task();
                true
            }
        }
    }

    /// Number of tasks waiting in the queue. Early-aborted tasks count
    /// until they are popped and skipped.
    pub fn task_count(&self) -> usize {
        self.shared.queue.len()
    }

    fn drain(&self) {
        while let Some(task) = self.shared.queue.pop() {
            self.execute(task);
        }
    }

    fn execute(&self, task: Arc<dyn ErasedTask>) {
        *self.shared.in_flight.lock().unwrap() = Some(task.clone());
        if self.shared.disposing.load(Ordering::Acquire) {
            task.cancel();
        } else {
            run_task(&task);
        }
        *self.shared.in_flight.lock().unwrap() = None;
    }

    pub(crate) fn add_tasks(&self, tasks: Vec<Arc<dyn ErasedTask>>) {
        self.shared.queue.add_many(tasks);
    }

    pub(crate) fn data_event(&self) -> &ManualResetEvent {
        self.shared.queue.data_event()
    }

    /// Disposal path: resolves the backlog as aborted, stops any task popped
    /// but not yet started, and asks the one already running to abort
    /// cooperatively.
    pub(crate) fn cancel_all(&self) {
        self.shared.disposing.store(true, Ordering::Release);
        self.shared.queue.drain_cancel();
        if let Some(task) = self.shared.in_flight.lock().unwrap().as_ref() {
            task.abort();
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Dispatches from a helper thread, since dispatching onto the
    /// dispatcher bound to the test thread itself is rejected.
    fn dispatch_from_producer<T, F>(dispatcher: &Dispatcher, work: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let producer = dispatcher.clone();
        thread::spawn(move || producer.dispatch(work).unwrap())
            .join()
            .unwrap()
    }

    #[test]
    fn processes_in_enqueue_order() {
        let dispatcher = Dispatcher::unbound();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in ["a", "b", "c"] {
            let order = order.clone();
            dispatcher
                .dispatch(move || order.lock().unwrap().push(id))
                .unwrap();
        }

        dispatcher.process_tasks();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn process_tasks_is_nonblocking_when_empty() {
        let dispatcher = Dispatcher::unbound();
        dispatcher.process_tasks();
        assert_eq!(dispatcher.task_count(), 0);
    }

    #[test]
    fn process_next_task_runs_one_at_a_time() {
        let dispatcher = Dispatcher::unbound();
        let t1 = dispatcher.dispatch(|| ()).unwrap();
        let t2 = dispatcher.dispatch(|| ()).unwrap();

        assert!(dispatcher.process_next_task());
        assert!(t1.has_ended());
        assert!(!t2.has_ended());

        assert!(dispatcher.process_next_task());
        assert!(t2.has_ended());
        assert!(!dispatcher.process_next_task());
    }

    #[test]
    fn rejects_dispatch_from_bound_thread() {
        thread::spawn(|| {
            let dispatcher = Dispatcher::new();
            assert_eq!(
                dispatcher.dispatch(|| ()).unwrap_err(),
                DispatchError::OwnDispatcher
            );
        })
        .join()
        .unwrap();
    }

    #[test]
    fn bound_dispatcher_works_from_other_threads() {
        thread::spawn(|| {
            let dispatcher = Dispatcher::new();
            let task = dispatch_from_producer(&dispatcher, || 5);
            dispatcher.process_tasks();
            assert_eq!(task.wait_result(), Some(5));
        })
        .join()
        .unwrap();
    }

    #[test]
    #[should_panic(expected = "only one Dispatcher may be bound per thread")]
    fn second_bound_dispatcher_on_one_thread_is_a_usage_error() {
        let _first = Dispatcher::new();
        let _second = Dispatcher::new();
    }

    #[test]
    fn binding_is_released_on_drop() {
        thread::spawn(|| {
            drop(Dispatcher::new());
            // The thread slot is free again.
            let _second = Dispatcher::new();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn drop_resolves_pending_tasks() {
        let dispatcher = Dispatcher::unbound();
        let task = dispatcher.dispatch(|| ()).unwrap();
        drop(dispatcher);
        assert!(task.has_ended());
        assert!(task.is_failed());
    }

    #[test]
    fn blocking_process_returns_false_on_exit_signal() {
        let dispatcher = Dispatcher::unbound();
        let exit = ManualResetEvent::new(false);
        let stopper = exit.clone();

        let consumer = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.process_tasks_blocking(&exit))
        };

        thread::sleep(Duration::from_millis(20));
        stopper.set();
        assert!(!consumer.join().unwrap());
    }

    #[test]
    fn blocking_next_runs_a_single_task() {
        let dispatcher = Dispatcher::unbound();
        let exit = ManualResetEvent::new(false);

        let consumer = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.process_next_task_blocking(&exit))
        };

        thread::sleep(Duration::from_millis(20));
        let t1 = dispatcher.dispatch(|| ()).unwrap();
        let t2 = dispatcher.dispatch(|| ()).unwrap();

        assert!(consumer.join().unwrap());
        assert!(t1.has_ended());
        // Only one task may have been taken by the blocking call.
        assert!(!t2.has_ended());
        assert_eq!(dispatcher.task_count(), 1);
    }

    #[test]
    fn blocking_process_drains_when_work_arrives() {
        let dispatcher = Dispatcher::unbound();
        let exit = ManualResetEvent::new(false);

        let consumer = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.process_tasks_blocking(&exit))
        };

        thread::sleep(Duration::from_millis(20));
        let task = dispatcher.dispatch(|| ()).unwrap();
        assert!(consumer.join().unwrap());
        assert!(task.has_ended());
    }
}
