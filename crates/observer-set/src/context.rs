#![forbid(unsafe_code)]

//! Execution contexts for routed delivery.
//!
//! A registry never owns threads. When a subscription carries an
//! [`ExecutionContext`], each delivery for it is packaged as a [`Task`] and
//! handed to [`ExecutionContext::schedule`]. Ordering and parallelism among
//! tasks on one context are entirely the context's business.

use std::sync::Arc;

/// A unit of work handed to an execution context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to an execution context, as stored by subscriptions.
pub type SharedContext = Arc<dyn ExecutionContext>;

/// Something that can run a [`Task`] now or later, possibly on another thread.
pub trait ExecutionContext: Send + Sync {
    /// Queue or run `task`. Must not block waiting for previously scheduled
    /// tasks to complete.
    fn schedule(&self, task: Task);
}

/// Runs every task immediately on the scheduling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Inline {
    /// Convenience constructor for a shared inline context.
    #[must_use]
    pub fn shared() -> SharedContext {
        Arc::new(Self)
    }
}

impl ExecutionContext for Inline {
    fn schedule(&self, task: Task) {
        task();
    }
}
