#![forbid(unsafe_code)]

//! Thread-safe weak observer registries.
//!
//! A publisher keeps one [`Registry<P>`] per kind of notification it emits.
//! Observers subscribe with [`Registry::add`] (bound to a target object held
//! weakly) or [`Registry::add_fn`] (a plain closure), and receive every
//! payload passed to [`Registry::notify`] until they are removed or their
//! target is dropped.
//!
//! # Primary types
//! - **Registry**: the locked, insertion-ordered subscription list.
//! - **Subscription**: identity-compared handle returned by `add`.
//! - **ExecutionContext**: where a routed delivery runs. [`Inline`] runs it
//!   immediately; thread-backed contexts live in `observer-set-queue`.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use observer_set::Registry;
//!
//! struct Label {
//!     text: Mutex<String>,
//! }
//!
//! impl Label {
//!     fn on_rename(&self, name: String) {
//!         *self.text.lock().unwrap() = name;
//!     }
//! }
//!
//! let renamed = Registry::<String>::new();
//! let label = Arc::new(Label { text: Mutex::new(String::new()) });
//! renamed.add(&label, None, Label::on_rename);
//!
//! renamed.notify("inbox".to_owned());
//! assert_eq!(*label.text.lock().unwrap(), "inbox");
//!
//! drop(label);
//! renamed.notify("outbox".to_owned());
//! assert_eq!(renamed.count(), 0);
//! ```

pub mod context;
pub mod registry;
pub mod subscription;

pub use context::{ExecutionContext, Inline, SharedContext, Task};
pub use registry::Registry;
pub use subscription::Subscription;
