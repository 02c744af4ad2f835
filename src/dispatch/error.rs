use thiserror::Error;

/// Usage errors reported by dispatch calls.
///
/// Every variant indicates a logic bug at the call site rather than a
/// runtime condition to retry; timeouts and cancellations are never reported
/// through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The calling thread tried to dispatch onto the dispatcher bound to
    /// itself. Work for the current thread can simply be run directly;
    /// queueing it would either never run or self-deadlock a blocking wait.
    #[error("cannot dispatch onto the dispatcher bound to the calling thread")]
    OwnDispatcher,

    /// A worker thread tried to dispatch into the distributor it belongs
    /// to, which can starve the pool by filling it from within. Dispatching
    /// to a different distributor or dispatcher is fine.
    #[error("cannot dispatch into a task distributor from one of its own worker threads")]
    OwnDistributor,

    /// A thread context without a target dispatcher tried to post work back.
    #[error("this thread has no target dispatcher to post to")]
    NoTargetDispatcher,
}
