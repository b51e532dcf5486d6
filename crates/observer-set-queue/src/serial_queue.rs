#![forbid(unsafe_code)]

//! Strictly serial execution context backed by one dedicated thread.
//!
//! [`SerialQueue`] runs scheduled tasks one at a time, in the order they were
//! scheduled, on a worker thread it owns. It is the Rust counterpart of a
//! private serial dispatch queue: give a subscription a `SerialQueue` and all
//! of its deliveries happen on that worker, never on the notifying thread.
//!
//! # Shutdown
//!
//! [`SerialQueue::shutdown`] (also run on drop) enqueues a stop marker and
//! joins the worker, so every task scheduled before it still runs. Tasks
//! scheduled afterwards, including ones that land behind the stop marker, are
//! dropped with a warning.
//!
//! # Failure Modes
//!
//! - A panicking task is caught and logged; the worker keeps serving.
//! - [`SerialQueue::sync`] called on the worker itself returns immediately
//!   rather than waiting on itself.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use observer_set::{ExecutionContext, Task};
use tracing::{debug, error, warn};

const DEFAULT_NAME: &str = "observer-set-queue";

/// Configuration for a [`SerialQueue`] worker.
#[derive(Debug, Clone)]
pub struct SerialQueueConfig {
    /// Worker thread name, also used in log fields.
    pub name: String,
    /// Worker stack size in bytes. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for SerialQueueConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            stack_size: None,
        }
    }
}

impl SerialQueueConfig {
    /// Set the worker thread name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

enum QueueMsg {
    Run(Task),
    Stop,
}

/// FIFO execution context with a single worker thread.
pub struct SerialQueue {
    name: String,
    sender: mpsc::Sender<QueueMsg>,
    worker: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    /// Spawn a queue with the default configuration.
    pub fn new() -> io::Result<Self> {
        Self::spawn(SerialQueueConfig::default())
    }

    /// Spawn a queue worker described by `config`.
    pub fn spawn(config: SerialQueueConfig) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<QueueMsg>();

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }
        let worker_name = config.name.clone();
        let handle = builder.spawn(move || worker_loop(&worker_name, rx))?;
        debug!(queue = %config.name, "serial queue started");

        Ok(Self {
            name: config.name,
            sender: tx,
            worker: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// The worker thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the caller is running on this queue's worker thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker
    }

    /// Block until every task scheduled before this call has run.
    ///
    /// Returns immediately when called from the worker itself or after the
    /// queue has shut down.
    pub fn sync(&self) {
        if self.is_current() {
            debug!(queue = %self.name, "sync called on worker; not waiting");
            return;
        }
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let task: Task = Box::new(move || {
            let _ = done_tx.send(());
        });
        if self.sender.send(QueueMsg::Run(task)).is_err() {
            return;
        }
        // Errors only if the worker stopped and dropped the barrier task.
        let _ = done_rx.recv();
    }

    /// Stop accepting work after the tasks already queued, then join the
    /// worker. Idempotent.
    pub fn shutdown(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        let _ = self.sender.send(QueueMsg::Stop);
        if self.is_current() {
            // Joining ourselves would deadlock; the stop marker ends the loop.
            return;
        }
        if handle.join().is_err() {
            error!(queue = %self.name, "serial queue worker panicked");
        }
        debug!(queue = %self.name, "serial queue shut down");
    }
}

impl ExecutionContext for SerialQueue {
    fn schedule(&self, task: Task) {
        if self.sender.send(QueueMsg::Run(task)).is_err() {
            warn!(queue = %self.name, "task scheduled on a stopped serial queue was dropped");
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("name", &self.name)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

fn worker_loop(name: &str, rx: mpsc::Receiver<QueueMsg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            QueueMsg::Run(task) => run_task(name, task),
            QueueMsg::Stop => break,
        }
    }
    let dropped = drain_after_stop(name, &rx);
    debug!(queue = name, dropped, "serial queue worker exiting");
}

/// Drop tasks that raced in behind the stop marker, warning for each.
fn drain_after_stop(name: &str, rx: &mpsc::Receiver<QueueMsg>) -> usize {
    let mut dropped = 0;
    while let Ok(msg) = rx.try_recv() {
        if let QueueMsg::Run(task) = msg {
            drop(task);
            dropped += 1;
            warn!(queue = name, "task scheduled on a stopped serial queue was dropped");
        }
    }
    dropped
}

fn run_task(name: &str, task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!(queue = name, "task panicked on serial queue");
    }
}
