#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Task Dispatch
//!
//! A task dispatch and worker-pool library for frame-driven hosts such as
//! game loops and event loops.
//!
//! ## Key Modules
//!
//! * `dispatch` - Task handles and the thread-affine [`Dispatcher`] queue
//! * `pool` - The [`TaskDistributor`] worker pool and [`ActionThread`]
//! * `system` - The [`TaskSystem`] bootstrap object a host embeds
//! * `core` - The [`ManualResetEvent`] signalling primitive
//! * `collections` - Containers consumers can layer on top, like a priority
//!   heap in front of a FIFO dispatcher
//!
//! ## Architecture
//!
//! Work moves through the library in one direction:
//! * Producers on any thread call `dispatch` and get a [`Task`] handle back
//!   immediately
//! * A [`Dispatcher`] executes its backlog only on the thread it is bound
//!   to, in FIFO order, when that thread calls `process_tasks`
//! * A [`TaskDistributor`] feeds a pool of worker threads from one shared
//!   queue; idle workers pull one task at a time, which balances load
//!   without any global ordering across workers
//!
//! Cancellation is cooperative everywhere: aborting a pending task skips
//! it, aborting a running task raises a flag its body must poll. A panic in
//! a task body is captured into the handle as a fault rather than tearing
//! down the worker.
//!
//! ## Usage
//!
//! ```rust
//! use task_dispatch::system::{TaskSystem, TaskSystemConfig};
//!
//! // At startup, on the host's main thread:
//! let system = TaskSystem::new(TaskSystemConfig::default());
//!
//! // Anywhere: off-load work onto the pool.
//! let loaded = system.distributor().dispatch(|| "chunk data").unwrap();
//!
//! // In the host loop, once per tick:
//! system.process_tasks();
//! # loaded.wait();
//! ```

pub mod collections;
pub mod core;
pub mod dispatch;
pub mod pool;
pub mod system;

pub use crate::core::ManualResetEvent;
pub use crate::dispatch::{current_task, DispatchError, Dispatcher, Task};
pub use crate::pool::{ActionThread, DistributorConfig, TaskDistributor};
pub use crate::system::{TaskSystem, TaskSystemConfig};
