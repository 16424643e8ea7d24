//! Consumer notification boundary.
//!
//! The host framework owns its consumers; we only hold weak, opaque handles
//! to them and notify exactly the ones waiting on a key when it resolves.
//! A handle whose consumer has been dropped is skipped silently.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::key::CacheKey;

/// Implemented by whatever wants to re-evaluate its lookup once a pending
/// translation lands. The host substitutes its own "mark this consumer stale"
/// capability here (a rebuild trigger, a channel send, a dirty bit).
pub trait Subscriber: Send + Sync {
    fn mark_stale(&self);
}

/// Opaque, comparable, non-owning handle to a [`Subscriber`].
///
/// Compared by pointer identity, so the same `Arc` always yields equal
/// handles and two distinct consumers never collide.
#[derive(Clone)]
pub struct SubscriberHandle {
    inner: Weak<dyn Subscriber>,
}

impl SubscriberHandle {
    pub fn new(subscriber: &Arc<dyn Subscriber>) -> Self {
        Self {
            inner: Arc::downgrade(subscriber),
        }
    }

    /// Convenience for concrete subscriber types.
    pub fn of<S: Subscriber + 'static>(subscriber: &Arc<S>) -> Self {
        let dyn_arc: Arc<dyn Subscriber> = subscriber.clone();
        Self::new(&dyn_arc)
    }

    fn ptr(&self) -> *const () {
        self.inner.as_ptr() as *const ()
    }

    /// Notify the consumer if it is still alive.
    fn notify(&self) {
        if let Some(subscriber) = self.inner.upgrade() {
            subscriber.mark_stale();
        }
    }
}

impl PartialEq for SubscriberHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.ptr(), other.ptr())
    }
}

impl Eq for SubscriberHandle {}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubscriberHandle({:p})", self.ptr())
    }
}

/// Per-key registry of handles awaiting a translation.
///
/// `fire` is one-shot: it notifies and then forgets every handle registered
/// for that key, and only those. A consumer that wants future notifications
/// re-registers on its next lookup.
#[derive(Default)]
pub struct InvalidationDispatcher {
    waiting: HashMap<CacheKey, Vec<SubscriberHandle>>,
}

impl InvalidationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: &CacheKey, handle: SubscriberHandle) {
        let handles = self.waiting.entry(key.clone()).or_default();
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }

    /// Remove and return the handles registered for `key`. The caller
    /// notifies them outside any lock via [`notify_handles`].
    #[must_use]
    pub fn take(&mut self, key: &CacheKey) -> Vec<SubscriberHandle> {
        self.waiting.remove(key).unwrap_or_default()
    }

    /// Snapshot every registered handle, deduplicated, without forgetting
    /// any registration. Used for broad locale-change notification.
    #[must_use]
    pub fn all_handles(&self) -> Vec<SubscriberHandle> {
        let mut seen: Vec<SubscriberHandle> = Vec::new();
        for handles in self.waiting.values() {
            for handle in handles {
                if !seen.contains(handle) {
                    seen.push(handle.clone());
                }
            }
        }
        seen
    }

    pub fn drop_all(&mut self) {
        self.waiting.clear();
    }

    pub fn waiting_keys(&self) -> usize {
        self.waiting.len()
    }
}

/// Notify a batch of handles, skipping dead ones.
pub fn notify_handles(handles: &[SubscriberHandle]) {
    debug!(count = handles.len(), "notifying subscribers");
    for handle in handles {
        handle.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_key;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self(AtomicUsize::new(0)))
        }

        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Subscriber for Counter {
        fn mark_stale(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fire_notifies_only_that_key() {
        let mut dispatcher = InvalidationDispatcher::new();
        let (k1, k2) = (build_key("a", None), build_key("b", None));
        let (s1, s2) = (Counter::new(), Counter::new());

        dispatcher.register(&k1, SubscriberHandle::of(&s1));
        dispatcher.register(&k2, SubscriberHandle::of(&s2));

        notify_handles(&dispatcher.take(&k1));
        assert_eq!(s1.count(), 1);
        assert_eq!(s2.count(), 0);
    }

    #[test]
    fn fire_is_one_shot() {
        let mut dispatcher = InvalidationDispatcher::new();
        let key = build_key("a", None);
        let sub = Counter::new();
        dispatcher.register(&key, SubscriberHandle::of(&sub));

        notify_handles(&dispatcher.take(&key));
        notify_handles(&dispatcher.take(&key));
        assert_eq!(sub.count(), 1);
    }

    #[test]
    fn duplicate_registration_is_deduplicated() {
        let mut dispatcher = InvalidationDispatcher::new();
        let key = build_key("a", None);
        let sub = Counter::new();
        dispatcher.register(&key, SubscriberHandle::of(&sub));
        dispatcher.register(&key, SubscriberHandle::of(&sub));

        notify_handles(&dispatcher.take(&key));
        assert_eq!(sub.count(), 1);
    }

    #[test]
    fn dead_handles_are_skipped() {
        let mut dispatcher = InvalidationDispatcher::new();
        let key = build_key("a", None);
        let handle = {
            let sub = Counter::new();
            SubscriberHandle::of(&sub)
            // sub dropped here
        };
        dispatcher.register(&key, handle);
        notify_handles(&dispatcher.take(&key));
    }

    #[test]
    fn all_handles_deduplicates_across_keys() {
        let mut dispatcher = InvalidationDispatcher::new();
        let sub = Counter::new();
        dispatcher.register(&build_key("a", None), SubscriberHandle::of(&sub));
        dispatcher.register(&build_key("b", None), SubscriberHandle::of(&sub));

        let all = dispatcher.all_handles();
        assert_eq!(all.len(), 1);
        notify_handles(&all);
        assert_eq!(sub.count(), 1);
        // registrations survive a broad notification
        assert_eq!(dispatcher.waiting_keys(), 2);
    }

    #[test]
    fn drop_all_forgets_everything() {
        let mut dispatcher = InvalidationDispatcher::new();
        let sub = Counter::new();
        dispatcher.register(&build_key("a", None), SubscriberHandle::of(&sub));
        dispatcher.drop_all();
        assert_eq!(dispatcher.waiting_keys(), 0);
    }
}
