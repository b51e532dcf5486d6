#![forbid(unsafe_code)]

//! Subscription handles and the type-erased delivery binding behind them.
//!
//! # Design
//!
//! A [`Subscription<P>`] is an `Arc` around an immutable entry. The entry owns
//! a boxed [`Binding<P>`] that pairs a `Weak<T>` with a callback taking `&T`.
//! The concrete `T` is known only inside [`Bound`]; once boxed, the registry
//! sees nothing but "is the target alive" and "deliver this payload". Because
//! the weak pointer and the callback are typed together at construction, the
//! resolved target can never be handed to a callback expecting another type.
//!
//! Identity is the address of the shared entry. Two handles are equal iff they
//! were cloned from the same `add` call, regardless of targets or callbacks.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::context::SharedContext;

/// Erased view of a `(weak target, callback)` pair.
pub(crate) trait Binding<P>: Send + Sync {
    /// Whether the target can still be resolved.
    fn is_live(&self) -> bool;

    /// Resolve the target and invoke the callback. Silently does nothing when
    /// the target is gone.
    fn deliver(&self, payload: P);

    /// Target type and address, or `<released>` once the target is gone.
    fn target_label(&self) -> String;

    /// Type name of the user callback.
    fn callback_name(&self) -> &'static str;
}

/// The single concrete [`Binding`]: the erasure boundary.
struct Bound<T: ?Sized, F> {
    target: Weak<T>,
    callback: F,
    callback_name: &'static str,
}

impl<T, F, P> Binding<P> for Bound<T, F>
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&T, P) + Send + Sync + 'static,
{
    fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn deliver(&self, payload: P) {
        // Upgrade at delivery time; the target may have died after the snapshot.
        if let Some(target) = self.target.upgrade() {
            (self.callback)(&target, payload);
        }
    }

    fn target_label(&self) -> String {
        if self.is_live() {
            format!(
                "{}@{:p}",
                std::any::type_name::<T>(),
                self.target.as_ptr().cast::<()>()
            )
        } else {
            "<released>".to_owned()
        }
    }

    fn callback_name(&self) -> &'static str {
        self.callback_name
    }
}

struct Entry<P> {
    binding: Box<dyn Binding<P>>,
    context: Option<SharedContext>,
    /// Bound to the registry's own owner rather than a caller-supplied target.
    implicit: bool,
}

/// Opaque handle for one registered observation.
///
/// Holding a handle never keeps the observed target alive. Handles stay valid
/// as comparison tokens after their subscription has been removed or pruned.
pub struct Subscription<P> {
    entry: Arc<Entry<P>>,
}

impl<P> Subscription<P> {
    pub(crate) fn bind<T, F>(
        target: Weak<T>,
        context: Option<SharedContext>,
        callback: F,
        callback_name: &'static str,
        implicit: bool,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T, P) + Send + Sync + 'static,
        P: 'static,
    {
        let binding: Box<dyn Binding<P>> = Box::new(Bound {
            target,
            callback,
            callback_name,
        });
        Self {
            entry: Arc::new(Entry {
                binding,
                context,
                implicit,
            }),
        }
    }

    /// Whether the observed target is still alive.
    ///
    /// Diagnostic only: the answer may be stale by the time it is read.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.entry.binding.is_live()
    }

    /// Whether deliveries are routed through an execution context.
    #[must_use]
    pub fn has_context(&self) -> bool {
        self.entry.context.is_some()
    }

    pub(crate) fn context(&self) -> Option<&SharedContext> {
        self.entry.context.as_ref()
    }

    pub(crate) fn deliver(&self, payload: P) {
        self.entry.binding.deliver(payload);
    }

    /// One-line diagnostic rendering used by `Registry::describe`.
    pub(crate) fn describe(&self) -> String {
        let binding = &self.entry.binding;
        if self.entry.implicit {
            binding.callback_name().to_owned()
        } else {
            format!("{} {}", binding.target_label(), binding.callback_name())
        }
    }
}

// Manual Clone: no `P: Clone` bound, clones share identity.
impl<P> Clone for Subscription<P> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<P> PartialEq for Subscription<P> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl<P> Eq for Subscription<P> {}

impl<P> std::hash::Hash for Subscription<P> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.entry).hash(state);
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.entry.binding.target_label())
            .field("callback", &self.entry.binding.callback_name())
            .field("has_context", &self.has_context())
            .finish()
    }
}
