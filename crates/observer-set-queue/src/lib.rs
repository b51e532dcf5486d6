#![forbid(unsafe_code)]

//! Thread-backed execution contexts for `observer-set`.
//!
//! The core registry only knows the [`ExecutionContext`] trait. This crate
//! supplies a concrete context that owns a worker thread, so subscriptions
//! can be delivered off the notifying thread:
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use observer_set::Registry;
//! use observer_set_queue::SerialQueue;
//!
//! let queue = Arc::new(SerialQueue::new().unwrap());
//! let ticks = Registry::<u64>::new();
//! let total = Arc::new(AtomicUsize::new(0));
//!
//! let sink = Arc::clone(&total);
//! ticks.add_fn(Some(queue.clone()), move |n| {
//!     sink.fetch_add(n as usize, Ordering::SeqCst);
//! });
//!
//! ticks.notify(2);
//! ticks.notify(3);
//! queue.sync();
//! assert_eq!(total.load(Ordering::SeqCst), 5);
//! ```
//!
//! [`ExecutionContext`]: observer_set::ExecutionContext

pub mod serial_queue;

pub use serial_queue::{SerialQueue, SerialQueueConfig};
