//! # Pending-Task Queue
//!
//! The FIFO backing store shared by [`Dispatcher`](super::Dispatcher) and
//! the distributor's shared pending queue. All mutation happens under one
//! mutex; a paired [`ManualResetEvent`] tracks "queue non-empty" so that
//! consumers can block without polling.
//!
//! The event is set inside the same critical section as every enqueue and
//! reset only when the queue is observed empty under the lock, which keeps
//! the signal and the queue contents from drifting apart between threads.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::core::ManualResetEvent;
use crate::dispatch::task::ErasedTask;

pub(crate) struct TaskQueue {
    tasks: Mutex<VecDeque<Arc<dyn ErasedTask>>>,
    data_event: ManualResetEvent,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            data_event: ManualResetEvent::new(false),
        }
    }

    /// The "queue became non-empty" signal, for multi-waits alongside an
    /// exit event.
    pub(crate) fn data_event(&self) -> &ManualResetEvent {
        &self.data_event
    }

    /// Number of currently pending tasks. Early-aborted tasks still count
    /// until a consumer pops them.
    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub(crate) fn add(&self, task: Arc<dyn ErasedTask>) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.push_back(task);
        self.data_event.set();
    }

    pub(crate) fn add_many<I>(&self, new_tasks: I)
    where
        I: IntoIterator<Item = Arc<dyn ErasedTask>>,
    {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.extend(new_tasks);
        if tasks.len() > before {
            self.data_event.set();
        }
    }

    /// Pops the oldest pending task, resetting the non-empty signal when the
    /// queue runs dry.
    pub(crate) fn pop(&self) -> Option<Arc<dyn ErasedTask>> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.pop_front();
        if tasks.is_empty() {
            self.data_event.reset();
        }
        task
    }

    /// Removes up to `count` tasks from the front of the queue, preserving
    /// their order. `count == 0` takes everything.
    pub(crate) fn isolate(&self, count: usize) -> Vec<Arc<dyn ErasedTask>> {
        let mut tasks = self.tasks.lock().unwrap();
        let take = if count == 0 {
            tasks.len()
        } else {
            count.min(tasks.len())
        };
        let isolated: Vec<_> = tasks.drain(..take).collect();
        if tasks.is_empty() {
            self.data_event.reset();
        }
        isolated
    }

    /// Removes an even share of the queue: `len / divisor` tasks, where a
    /// zero divisor counts as two. A share that rounds down to zero takes
    /// the whole queue, like [`isolate`](Self::isolate).
    pub(crate) fn split(&self, divisor: usize) -> Vec<Arc<dyn ErasedTask>> {
        let divisor = if divisor == 0 { 2 } else { divisor };
        let count = self.len() / divisor;
        self.isolate(count)
    }

    /// Empties the queue, resolving every pending task as aborted so that
    /// outstanding waits return. Used on disposal.
    pub(crate) fn drain_cancel(&self) {
        for task in self.isolate(0) {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::task::Task;

    fn noop_task() -> Arc<dyn ErasedTask> {
        let (_, runnable) = Task::new_pair(|| ());
        runnable
    }

    #[test]
    fn add_sets_data_event_and_pop_resets_it() {
        let queue = TaskQueue::new();
        assert!(!queue.data_event().is_set());

        queue.add(noop_task());
        queue.add(noop_task());
        assert!(queue.data_event().is_set());
        assert_eq!(queue.len(), 2);

        assert!(queue.pop().is_some());
        assert!(queue.data_event().is_set());
        assert!(queue.pop().is_some());
        assert!(!queue.data_event().is_set());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn isolate_takes_from_the_front() {
        let queue = TaskQueue::new();
        for _ in 0..5 {
            queue.add(noop_task());
        }

        assert_eq!(queue.isolate(2).len(), 2);
        assert_eq!(queue.len(), 3);
        assert!(queue.data_event().is_set());

        // Zero means "everything".
        assert_eq!(queue.isolate(0).len(), 3);
        assert_eq!(queue.len(), 0);
        assert!(!queue.data_event().is_set());
    }

    #[test]
    fn split_hands_out_an_even_share() {
        let queue = TaskQueue::new();
        for _ in 0..8 {
            queue.add(noop_task());
        }
        assert_eq!(queue.split(4).len(), 2);
        assert_eq!(queue.len(), 6);
    }

    #[test]
    fn drain_cancel_resolves_pending_tasks() {
        let queue = TaskQueue::new();
        let (task, runnable) = Task::new_pair(|| ());
        queue.add(runnable);

        queue.drain_cancel();
        assert_eq!(queue.len(), 0);
        assert!(task.has_ended());
        assert!(task.is_failed());
    }
}
