//! In-memory translation cache: target locale -> (cache key -> translation).
//!
//! Deliberately unbounded and eviction-free; the partition dimension keeps
//! locales isolated so switching the active locale never invalidates entries
//! cached under another one.

use std::collections::HashMap;

use crate::key::CacheKey;

/// Serializable snapshot shape shared with the persistence boundary:
/// partition -> (key hex -> translated text), nested string-keyed maps so any
/// JSON-capable store can hold it.
pub type CacheSnapshot = HashMap<String, HashMap<String, String>>;

/// Two-level cache store.
#[derive(Debug, Default)]
pub struct CacheStore {
    partitions: HashMap<String, HashMap<CacheKey, String>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, partition: &str, key: &CacheKey) -> Option<&str> {
        self.partitions
            .get(partition)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    pub fn put(&mut self, partition: &str, key: CacheKey, result: String) {
        self.partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key, result);
    }

    pub fn contains(&self, partition: &str, key: &CacheKey) -> bool {
        self.get(partition, key).is_some()
    }

    pub fn clear(&mut self) {
        self.partitions.clear();
    }

    /// Total entry count across all partitions.
    pub fn len(&self) -> usize {
        self.partitions.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone the full contents into the persistable snapshot shape.
    pub fn snapshot(&self) -> CacheSnapshot {
        self.partitions
            .iter()
            .map(|(partition, entries)| {
                let flat = entries
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                    .collect();
                (partition.clone(), flat)
            })
            .collect()
    }

    /// Merge a persisted snapshot back in. Entries already in memory win:
    /// anything cached this session is at least as fresh as the snapshot.
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        for (partition, entries) in snapshot {
            let target = self.partitions.entry(partition).or_default();
            for (hex, result) in entries {
                target.entry(CacheKey::from_hex(hex)).or_insert(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_key;

    #[test]
    fn put_then_get() {
        let mut store = CacheStore::new();
        let key = build_key("Hello", None);
        store.put("fr", key.clone(), "Bonjour".into());
        assert_eq!(store.get("fr", &key), Some("Bonjour"));
    }

    #[test]
    fn partitions_are_isolated() {
        let mut store = CacheStore::new();
        let key = build_key("Hello", None);
        store.put("fr", key.clone(), "Bonjour".into());
        assert_eq!(store.get("en", &key), None);
        assert_eq!(store.get("fr", &key), Some("Bonjour"));
    }

    #[test]
    fn clear_empties_all_partitions() {
        let mut store = CacheStore::new();
        store.put("fr", build_key("a", None), "x".into());
        store.put("de", build_key("a", None), "y".into());
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut store = CacheStore::new();
        let key = build_key("Hello", None);
        store.put("fr", key.clone(), "Bonjour".into());
        let snapshot = store.snapshot();

        let mut restored = CacheStore::new();
        restored.restore(snapshot);
        assert_eq!(restored.get("fr", &key), Some("Bonjour"));
    }

    #[test]
    fn restore_keeps_in_memory_entries() {
        let key = build_key("Hello", None);
        let mut store = CacheStore::new();
        store.put("fr", key.clone(), "fresh".into());

        let mut snapshot = CacheSnapshot::new();
        snapshot
            .entry("fr".into())
            .or_default()
            .insert(key.as_str().into(), "stale".into());

        store.restore(snapshot);
        assert_eq!(store.get("fr", &key), Some("fresh"));
    }
}
