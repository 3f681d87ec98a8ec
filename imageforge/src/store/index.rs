//! In-memory LRU index over the persisted records.
//!
//! Tracks each record's `last_accessed` stamp so purges can pick the
//! oldest entries without re-reading every record file. The index is
//! ephemeral: rebuilt by scanning the store directory when a connection
//! opens, and kept in sync by `record()`, `touch()` and `remove()` while
//! the connection lives.

use dashmap::DashMap;

/// Thread-safe map from record key to its last access stamp (ms).
#[derive(Debug, Default)]
pub struct LruIndex {
    entries: DashMap<String, u64>,
}

impl LruIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Records a new entry or refreshes an existing one.
    pub fn record(&self, key: &str, last_accessed: u64) {
        self.entries.insert(key.to_string(), last_accessed);
    }

    /// Refreshes the stamp for an existing entry; no-op if absent.
    pub fn touch(&self, key: &str, last_accessed: u64) {
        if let Some(mut stamp) = self.entries.get_mut(key) {
            *stamp = last_accessed;
        }
    }

    /// Removes an entry, returning its stamp if it existed.
    pub fn remove(&self, key: &str) -> Option<u64> {
        self.entries.remove(key).map(|(_, stamp)| stamp)
    }

    /// Whether the key is tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all keys, in unspecified order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of all entries sorted by stamp, oldest first.
    pub fn oldest_first(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by_key(|(_, stamp)| *stamp);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_len() {
        let index = LruIndex::new();
        assert!(index.is_empty());

        index.record("a", 10);
        index.record("b", 20);
        assert_eq!(index.len(), 2);
        assert!(index.contains("a"));
        assert!(!index.contains("c"));
    }

    #[test]
    fn record_overwrites_stamp() {
        let index = LruIndex::new();
        index.record("a", 10);
        index.record("a", 30);
        assert_eq!(index.len(), 1);
        assert_eq!(index.oldest_first(), vec![("a".to_string(), 30)]);
    }

    #[test]
    fn touch_refreshes_existing_only() {
        let index = LruIndex::new();
        index.record("a", 10);
        index.touch("a", 50);
        index.touch("ghost", 99);

        assert_eq!(index.len(), 1);
        assert_eq!(index.oldest_first(), vec![("a".to_string(), 50)]);
    }

    #[test]
    fn remove_returns_stamp() {
        let index = LruIndex::new();
        index.record("a", 10);

        assert_eq!(index.remove("a"), Some(10));
        assert_eq!(index.remove("a"), None);
        assert!(index.is_empty());
    }

    #[test]
    fn oldest_first_sorts_ascending() {
        let index = LruIndex::new();
        index.record("new", 300);
        index.record("old", 100);
        index.record("mid", 200);

        let order: Vec<String> = index
            .oldest_first()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(order, vec!["old", "mid", "new"]);
    }
}
