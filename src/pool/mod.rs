//! # Worker Pool
//!
//! The multi-consumer half of the crate: [`TaskDistributor`] spreads a
//! shared queue of tasks across a fixed set of background threads, and
//! [`ActionThread`] wraps a single free-standing thread with the same
//! cooperative-shutdown lifecycle.
//!
//! ## Pull-based balancing
//! The distributor never pushes work at a busy worker. Workers drain their
//! private queues and come back for one task at a time when idle, so a slow
//! task on one thread does not strand the work queued behind it — the other
//! workers keep pulling past it.

mod distributor;
mod thread;
mod worker;

pub use distributor::{DistributorConfig, TaskDistributor};
pub use thread::{ActionThread, ThreadContext};
