#![forbid(unsafe_code)]

//! Thread-safe registry of weak observers for one notification channel.
//!
//! # Design
//!
//! [`Registry<P>`] keeps an insertion-ordered `Vec` of [`Subscription<P>`]
//! behind a `Mutex`. The mutex guards the vector and nothing else: it is held
//! for a push, a `retain`, or a snapshot clone, and released before any
//! observer code runs. Observers may therefore call [`Registry::add`] or
//! [`Registry::remove`] on the same registry from inside a callback.
//!
//! Targets are held weakly. Entries whose target has been dropped are pruned
//! lazily at the start of the next [`Registry::notify`], so [`Registry::count`]
//! may overcount until then.
//!
//! # Performance
//!
//! | Operation    | Complexity                         |
//! |--------------|------------------------------------|
//! | `add()`      | O(1) amortized                     |
//! | `remove()`   | O(S) where S = subscriptions       |
//! | `notify()`   | O(S) snapshot + delivery cost      |
//! | `count()`    | O(1)                               |
//!
//! # Failure Modes
//!
//! - **In-flight races**: a subscription added during `notify` misses that
//!   notification; one removed during `notify` may still receive it if it was
//!   already in the snapshot.
//! - **Poisoned lock**: a panic while the lock is held cannot tear the vector
//!   (every mutation is a single `push`, `retain` or swap), so the guard is
//!   recovered instead of propagating the poison.
//! - **Drop side effects**: pruned entries are dropped after the lock is
//!   released, so a captured value whose `Drop` touches the registry, or a
//!   context that joins a worker on drop, cannot deadlock `notify`.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use crate::context::SharedContext;
use crate::subscription::Subscription;

/// Implicit target type for closure subscriptions.
type Lifeline = dyn Any + Send + Sync;

const DEFAULT_LABEL: &str = "observer-set";

/// A shared collection of live subscriptions for payload type `P`.
///
/// # Invariants
///
/// 1. No two entries share an identity.
/// 2. Entries keep insertion order; synchronous delivery follows it.
/// 3. No observer callback runs while the internal lock is held.
/// 4. Dead entries leave the list only via `remove` or the prune step of
///    `notify`.
pub struct Registry<P> {
    label: String,
    entries: Mutex<Vec<Subscription<P>>>,
    /// Implicit target for [`Registry::add_fn`] subscriptions.
    owner: Weak<Lifeline>,
    /// Keeps `owner` alive for registries built with [`Registry::new`].
    _lifeline: Option<Arc<Lifeline>>,
}

impl<P> Registry<P> {
    /// Create an empty registry that owns the implicit target of its closure
    /// subscriptions.
    #[must_use]
    pub fn new() -> Self {
        let lifeline: Arc<Lifeline> = Arc::new(());
        Self {
            label: DEFAULT_LABEL.to_owned(),
            entries: Mutex::new(Vec::new()),
            owner: Arc::downgrade(&lifeline),
            _lifeline: Some(lifeline),
        }
    }

    /// Create an empty registry whose closure subscriptions live only as long
    /// as `owner`.
    #[must_use]
    pub fn owned_by<O: Send + Sync + 'static>(owner: &Arc<O>) -> Self {
        let owner: Weak<O> = Arc::downgrade(owner);
        let owner: Weak<Lifeline> = owner;
        Self {
            label: DEFAULT_LABEL.to_owned(),
            entries: Mutex::new(Vec::new()),
            owner,
            _lifeline: None,
        }
    }

    /// Set the diagnostic label used in logs and [`Registry::describe`].
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// The diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Remove `subscription` by identity.
    ///
    /// Removing a handle that is absent (already removed, pruned, or issued by
    /// another registry) is a no-op.
    pub fn remove(&self, subscription: &Subscription<P>) {
        let (removed, count) = {
            let mut entries = self.lock_entries();
            let before = entries.len();
            entries.retain(|entry| entry != subscription);
            (before - entries.len(), entries.len())
        };
        trace!(registry = %self.label, removed, count, "subscription removed");
    }

    /// Number of registered subscriptions, including dead ones that have not
    /// been pruned by a `notify` yet.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock_entries().len()
    }

    /// Render every entry for diagnostics. Never mutates the registry.
    #[must_use]
    pub fn describe(&self) -> String {
        let snapshot = self.lock_entries().clone();
        let entries: Vec<String> = snapshot.iter().map(Subscription::describe).collect();
        format!(
            "Registry<{}>[{}]: ({})",
            type_name::<P>(),
            self.label,
            entries.join(", ")
        )
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<Subscription<P>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, subscription: Subscription<P>) -> Subscription<P> {
        let count = {
            let mut entries = self.lock_entries();
            entries.push(subscription.clone());
            entries.len()
        };
        trace!(registry = %self.label, count, "subscription added");
        subscription
    }
}

impl<P: Clone + Send + 'static> Registry<P> {
    /// Observe this channel on behalf of `target`.
    ///
    /// The registry keeps only a weak reference; once every strong reference
    /// to `target` is gone the subscription stops receiving and is pruned at
    /// the next `notify`. Deliveries run inline on the notifying thread unless
    /// `context` is given, in which case they are scheduled on it.
    pub fn add<T, F>(
        &self,
        target: &Arc<T>,
        context: Option<SharedContext>,
        callback: F,
    ) -> Subscription<P>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T, P) + Send + Sync + 'static,
    {
        self.insert(Subscription::bind(
            Arc::downgrade(target),
            context,
            callback,
            type_name::<F>(),
            false,
        ))
    }

    /// Observe this channel with a plain closure.
    ///
    /// The subscription is tied to the registry's owner (the registry itself
    /// for [`Registry::new`], the given object for [`Registry::owned_by`]).
    /// Keep the returned handle to [`Registry::remove`] it earlier.
    pub fn add_fn<F>(&self, context: Option<SharedContext>, callback: F) -> Subscription<P>
    where
        F: Fn(P) + Send + Sync + 'static,
    {
        self.insert(Subscription::bind(
            Weak::clone(&self.owner),
            context,
            move |_: &Lifeline, payload: P| callback(payload),
            type_name::<F>(),
            true,
        ))
    }

    /// Deliver `payload` to every live subscription.
    ///
    /// Dead entries are pruned and a snapshot is taken under the lock; the
    /// lock is released before the first delivery. Inline subscriptions run
    /// in insertion order before this returns; context-routed ones are only
    /// scheduled.
    pub fn notify(&self, payload: P) {
        let (snapshot, dead) = {
            let mut entries = self.lock_entries();
            let (live, dead): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
                .into_iter()
                .partition(Subscription::is_live);
            *entries = live;
            (entries.clone(), dead)
        };
        let pruned = dead.len();
        // Dropping an entry drops its callback and context; do it unlocked.
        drop(dead);

        if pruned > 0 {
            debug!(registry = %self.label, pruned, live = snapshot.len(), "pruned dead observers");
        }
        trace!(registry = %self.label, live = snapshot.len(), "notifying observers");

        for subscription in snapshot {
            match subscription.context().cloned() {
                Some(context) => {
                    let payload = payload.clone();
                    context.schedule(Box::new(move || subscription.deliver(payload)));
                }
                None => subscription.deliver(payload.clone()),
            }
        }
    }
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("label", &self.label)
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

impl<P> fmt::Display for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
