//! Supply Watch
//!
//! A [`SupplyWatch`] holds the current supply of a node and notifies
//! subscribers when it is re-assembled.
//!
//! # How It Works
//!
//! 1. Subscribers register a callback and get back a [`SubscriberId`].
//!
//! 2. `reassemble` builds the next supply from the current one. Untouched
//!    branches come back as the very same supplies.
//!
//! 3. Subscribers are notified only when the root supply's identity
//!    changed. Comparing identities is all an observer needs to decide
//!    whether to recompute.
//!
//! # Thread Safety
//!
//! The current supply and the callback list are each behind a
//! `parking_lot::RwLock`. Callbacks run with both locks released, so a
//! callback may read the watch or subscribe again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::assembly::{Supplied, Supply};
use crate::error::Result;
use crate::graph::AsNode;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type Notify<T> = Arc<dyn Fn(&Supply<T>) + Send + Sync>;

/// Observable holder of a node's current supply.
///
/// # Example
///
/// ```rust,ignore
/// let watch = SupplyWatch::new(app.assemble(Supplied::new().with(&session, guest)));
/// watch.subscribe(|supply| render(supply));
///
/// // Re-renders; branches not reading `session` are reused as is.
/// watch.reassemble(Supplied::new().with(&session, user));
/// ```
pub struct SupplyWatch<T> {
    current: RwLock<Supply<T>>,
    notifiers: RwLock<Vec<(SubscriberId, Notify<T>)>>,
}

impl<T> SupplyWatch<T> {
    pub fn new(supply: Supply<T>) -> Self {
        Self {
            current: RwLock::new(supply),
            notifiers: RwLock::new(Vec::new()),
        }
    }

    /// The current supply.
    pub fn current(&self) -> Supply<T> {
        self.current.read().clone()
    }

    /// Register a callback run with every new supply.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&Supply<T>) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.notifiers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut notifiers = self.notifiers.write();
        let before = notifiers.len();
        notifiers.retain(|(existing, _)| *existing != id);
        notifiers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.notifiers.read().len()
    }

    /// Install `next` as the current supply.
    ///
    /// Subscribers are notified only if `next` is a different supply.
    /// Returns whether anything changed.
    pub fn replace(&self, next: Supply<T>) -> bool {
        {
            let mut current = self.current.write();
            if current.same_as(&next) {
                return false;
            }
            *current = next.clone();
        }
        self.notify(&next);
        true
    }

    /// Re-assemble the current supply with `delta` and install the result.
    pub fn reassemble(&self, delta: Supplied) -> Supply<T> {
        let next = self.current().reassemble(delta);
        self.replace(next.clone());
        next
    }

    /// Re-assemble with `delta` and hired substitutes.
    pub fn reassemble_with<I>(&self, delta: Supplied, overrides: I) -> Result<Supply<T>>
    where
        I: IntoIterator,
        I::Item: AsNode,
    {
        let next = self.current().reassemble_with(delta, overrides)?;
        self.replace(next.clone());
        Ok(next)
    }

    fn notify(&self, supply: &Supply<T>) {
        let callbacks: Vec<Notify<T>> = self
            .notifiers
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        tracing::trace!(node = %supply.name(), subscribers = callbacks.len(), "supply changed");
        for callback in callbacks {
            callback(supply);
        }
    }
}

impl<T> fmt::Debug for SupplyWatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupplyWatch")
            .field("current", &*self.current.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
