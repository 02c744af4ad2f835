//! # Collections
//!
//! Generic containers that sit next to the dispatch core without being part
//! of it. A consumer that wants priority scheduling keeps a [`BinaryHeap`]
//! of pending work keyed by priority and feeds the head of the heap to a
//! dispatcher; the dispatcher itself stays strictly FIFO.

mod binary_heap;

pub use binary_heap::BinaryHeap;
