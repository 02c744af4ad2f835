//! # Pool Worker
//!
//! One background thread of a [`TaskDistributor`](super::TaskDistributor).
//! Each worker drains a private dispatcher queue; when that runs dry it
//! pulls one task at a time from the distributor's shared queue, and when
//! there is nothing to pull it sleeps on "exit requested OR shared queue
//! non-empty". Idle workers competing for single tasks is what balances the
//! load across the pool.

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use crate::core::wait_any;
use crate::dispatch::Dispatcher;
use crate::pool::distributor::PoolShared;
use crate::pool::thread::ThreadCore;

thread_local! {
    // Identifies the distributor whose worker is running on this thread,
    // consulted by the dispatch reentrancy guard.
    static WORKER_OF: Cell<Option<u64>> = const { Cell::new(None) };
}

/// The distributor id the current thread works for, if any.
pub(crate) fn current_worker_of() -> Option<u64> {
    WORKER_OF.with(|cell| cell.get())
}

pub(crate) struct TaskWorker {
    dispatcher: Dispatcher,
    core: ThreadCore,
}

impl TaskWorker {
    pub(crate) fn new() -> Self {
        Self {
            dispatcher: Dispatcher::unbound(),
            core: ThreadCore::new(),
        }
    }

    /// The worker's private queue, filled by the distributor.
    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.core.is_alive()
    }

    pub(crate) fn start(&self, shared: Arc<PoolShared>) {
        let dispatcher = self.dispatcher.clone();
        let exit = self.core.exit_event().clone();
        self.core.spawn(move || {
            WORKER_OF.with(|cell| cell.set(Some(shared.id())));
            log::trace!("pool worker started");
            while !exit.is_set() {
                if !dispatcher.process_next_task() {
                    shared.fill(&dispatcher);
                    if dispatcher.task_count() == 0 {
                        match wait_any(&[&exit, shared.data_event()], None) {
                            Some(0) => break,
                            _ => shared.fill(&dispatcher),
                        }
                    }
                }
            }
            log::trace!("pool worker stopped");
        });
    }

    pub(crate) fn exit(&self) {
        self.core.exit();
    }

    pub(crate) fn abort_wait_timeout(&self, timeout: Duration) -> bool {
        self.core.abort_wait_timeout(timeout)
    }
}
