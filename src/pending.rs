//! Queue of unresolved lookups awaiting the next drain.
//!
//! Lookups for the same key between two drains coalesce into one entry whose
//! handle set grows; a failed batch is merged back in without losing any
//! handle, so a retry carries the union of everyone who asked.

use std::collections::HashMap;

use crate::context::TranslationContext;
use crate::key::CacheKey;
use crate::notify::SubscriberHandle;

/// One unresolved (key, payload) pair plus everyone waiting on it.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub key: CacheKey,
    pub content: String,
    pub context: Option<TranslationContext>,
    pub handles: Vec<SubscriberHandle>,
}

/// Insertion-ordered pending queue, coalescing by key.
#[derive(Default)]
pub struct PendingQueue {
    order: Vec<CacheKey>,
    entries: HashMap<CacheKey, PendingEntry>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a lookup. An already-pending key only gains the handle; a new
    /// key gets a fresh entry at the back of the queue.
    pub fn enqueue(
        &mut self,
        key: CacheKey,
        content: &str,
        context: Option<&TranslationContext>,
        handle: SubscriberHandle,
    ) {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                if !entry.handles.contains(&handle) {
                    entry.handles.push(handle);
                }
            }
            None => {
                self.order.push(key.clone());
                self.entries.insert(
                    key.clone(),
                    PendingEntry {
                        key,
                        content: content.to_string(),
                        context: context.cloned(),
                        handles: vec![handle],
                    },
                );
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drain the whole queue in insertion order, leaving it empty.
    pub fn take_all(&mut self) -> Vec<PendingEntry> {
        let order = std::mem::take(&mut self.order);
        let mut entries = std::mem::take(&mut self.entries);
        order
            .into_iter()
            .filter_map(|key| entries.remove(&key))
            .collect()
    }

    /// Merge a failed batch back in. Entries enqueued while the batch was in
    /// flight keep their position; handle sets are unioned, never overwritten.
    pub fn restore(&mut self, batch: Vec<PendingEntry>) {
        for entry in batch {
            match self.entries.get_mut(&entry.key) {
                Some(live) => {
                    for handle in entry.handles {
                        if !live.handles.contains(&handle) {
                            live.handles.push(handle);
                        }
                    }
                }
                None => {
                    self.order.push(entry.key.clone());
                    self.entries.insert(entry.key.clone(), entry);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_key;
    use crate::notify::Subscriber;
    use std::sync::Arc;

    struct Noop;

    impl Subscriber for Noop {
        fn mark_stale(&self) {}
    }

    fn handle() -> (Arc<Noop>, SubscriberHandle) {
        let sub = Arc::new(Noop);
        let h = SubscriberHandle::of(&sub);
        (sub, h)
    }

    #[test]
    fn repeated_enqueue_coalesces_by_key() {
        let mut queue = PendingQueue::new();
        let key = build_key("Home", None);
        let (_s1, h1) = handle();
        let (_s2, h2) = handle();
        let (_s3, h3) = handle();

        queue.enqueue(key.clone(), "Home", None, h1);
        queue.enqueue(key.clone(), "Home", None, h2);
        queue.enqueue(key.clone(), "Home", None, h3);

        assert_eq!(queue.len(), 1);
        let batch = queue.take_all();
        assert_eq!(batch[0].handles.len(), 3);
    }

    #[test]
    fn same_handle_twice_is_one_entry_in_the_set() {
        let mut queue = PendingQueue::new();
        let key = build_key("Home", None);
        let (_sub, h) = handle();

        queue.enqueue(key.clone(), "Home", None, h.clone());
        queue.enqueue(key, "Home", None, h);

        let batch = queue.take_all();
        assert_eq!(batch[0].handles.len(), 1);
    }

    #[test]
    fn take_all_preserves_insertion_order_and_empties() {
        let mut queue = PendingQueue::new();
        let (_s, h) = handle();
        queue.enqueue(build_key("b", None), "b", None, h.clone());
        queue.enqueue(build_key("a", None), "a", None, h);

        let batch = queue.take_all();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].content, "b");
        assert_eq!(batch[1].content, "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn restore_unions_handle_sets() {
        let mut queue = PendingQueue::new();
        let key = build_key("Home", None);
        let (_s1, h1) = handle();
        let (_s2, h2) = handle();

        queue.enqueue(key.clone(), "Home", None, h1.clone());
        let failed = queue.take_all();

        // A new waiter arrived while the batch was in flight.
        queue.enqueue(key.clone(), "Home", None, h2);
        queue.restore(failed);

        let batch = queue.take_all();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].handles.len(), 2);
    }

    #[test]
    fn restore_reappends_missing_entries() {
        let mut queue = PendingQueue::new();
        let (_s, h) = handle();
        queue.enqueue(build_key("Home", None), "Home", None, h);
        let failed = queue.take_all();

        queue.restore(failed);
        assert_eq!(queue.len(), 1);
    }
}
