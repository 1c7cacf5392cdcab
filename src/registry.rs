//! Insertion-ordered listener registry and the unsubscribe handle.
//!
//! The registry is shared between every [`Store`](crate::Store) handle and
//! the store actor. Subscribing and unsubscribing take a short synchronous
//! lock; the actor only holds it long enough to copy out a snapshot before
//! each notification round, so registry changes never affect a round that
//! has already started. Each dispatch also carries a watermark id so that
//! registrations made after it was issued are left out of its round.

use std::sync::{Arc, Mutex, Weak};

use crate::listener::{Listener, ListenerId};

/// A registered listener together with its registration id.
pub(crate) type Entry = (ListenerId, Arc<dyn Listener>);

/// Ordered set of listener registrations.
#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

impl Registry {
    /// Append a registration and return its freshly assigned id.
    pub(crate) fn insert(&mut self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Remove the registration with `id`.
    ///
    /// Returns `false` if it was already removed.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        match self.entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn ids(&self) -> Vec<ListenerId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// The id the next registration will get.
    ///
    /// Every registration made so far has a smaller id, so a dispatch that
    /// records this when it is issued can tell later registrations apart.
    pub(crate) fn watermark(&self) -> ListenerId {
        ListenerId(self.next_id)
    }

    /// Copy of the current registrations made before `watermark`, in
    /// subscription order.
    pub(crate) fn snapshot(&self, watermark: ListenerId) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|(id, _)| *id < watermark)
            .cloned()
            .collect()
    }
}

pub(crate) type SharedRegistry = Arc<Mutex<Registry>>;

/// Lock the registry, treating poisoning as a bug.
///
/// Nothing that can panic runs while the lock is held, so a poisoned mutex
/// means an invariant was already broken elsewhere.
pub(crate) fn lock(registry: &Mutex<Registry>) -> std::sync::MutexGuard<'_, Registry> {
    registry.lock().expect("listener registry mutex poisoned")
}

/// Handle to a single listener registration.
///
/// Returned by [`Store::subscribe`](crate::Store::subscribe). Dropping it
/// does **not** unsubscribe; call [`unsubscribe`](Subscription::unsubscribe)
/// explicitly. The handle only holds a weak reference to the registry, so it
/// never keeps a store alive.
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, registry: &SharedRegistry) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// The id of the registration this handle controls.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove this registration from the store.
    ///
    /// Only the first call has an effect; later calls are no-ops. A
    /// notification round already in progress still notifies this listener.
    ///
    /// # Returns
    ///
    /// `true` if the registration was removed by this call, `false` if it
    /// was already gone (or the store has been dropped).
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = lock(&registry).remove(self.id);
        if removed {
            tracing::debug!(listener = %self.id, "listener unsubscribed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::from_fn;

    fn noop() -> Arc<dyn Listener> {
        Arc::new(from_fn(|| {}))
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let mut registry = Registry::default();
        let a = registry.insert(noop());
        let b = registry.insert(noop());
        assert!(a < b);
        assert_eq!(registry.ids(), vec![a, b]);
    }

    #[test]
    fn same_listener_registered_twice_has_two_entries() {
        let mut registry = Registry::default();
        let listener = noop();
        let a = registry.insert(Arc::clone(&listener));
        let b = registry.insert(listener);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = Registry::default();
        let a = registry.insert(noop());
        let b = registry.insert(noop());
        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert_eq!(registry.ids(), vec![b]);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut registry = Registry::default();
        let a = registry.insert(noop());
        registry.remove(a);
        let b = registry.insert(noop());
        assert_ne!(a, b);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let mut registry = Registry::default();
        let a = registry.insert(noop());
        let snapshot = registry.snapshot(registry.watermark());
        registry.remove(a);
        registry.insert(noop());
        let ids: Vec<_> = snapshot.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a]);
    }

    #[test]
    fn snapshot_skips_registrations_after_watermark() {
        let mut registry = Registry::default();
        let a = registry.insert(noop());
        let b = registry.insert(noop());
        let watermark = registry.watermark();
        registry.insert(noop());
        registry.remove(a);

        let ids: Vec<_> = registry.snapshot(watermark).iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![b]);
    }

    #[test]
    fn subscription_unsubscribe_once() {
        let registry: SharedRegistry = Arc::default();
        let id = lock(&registry).insert(noop());
        let subscription = Subscription::new(id, &registry);

        assert_eq!(subscription.id(), id);
        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert_eq!(lock(&registry).len(), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_noop() {
        let registry: SharedRegistry = Arc::default();
        let id = lock(&registry).insert(noop());
        let subscription = Subscription::new(id, &registry);
        drop(registry);
        assert!(!subscription.unsubscribe());
    }
}
