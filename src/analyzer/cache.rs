//! Bounded Classification Cache
//!
//! Entry-count-bounded LRU cache keyed by the SHA-256 digest of the
//! normalized prompt. Guarantees that identical input yields the identical
//! cached classification for as long as the entry lives.
//!
//! Recency is tracked with a logical tick counter rather than wall-clock
//! time, so two inserts in the same instant still have a total LRU order.

use std::collections::HashMap;

use super::Classification;

/// Default cache capacity in entries
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// SHA-256 digest of a normalized prompt
pub(super) type CacheKey = [u8; 32];

#[derive(Clone, Debug)]
struct CacheEntry {
    classification: Classification,
    last_used: u64,
}

/// LRU cache of prompt classifications
#[derive(Debug)]
pub(super) struct ClassificationCache {
    entries: HashMap<CacheKey, CacheEntry>,
    capacity: usize,
    tick: u64,
}

impl ClassificationCache {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    /// Fetch a cached classification, refreshing its recency
    pub(super) fn get(&mut self, key: &CacheKey) -> Option<Classification> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.classification.clone()
        })
    }

    /// Insert a classification, evicting the least recently used entry when full
    pub(super) fn insert(&mut self, key: CacheKey, classification: Classification) {
        self.tick += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            key,
            CacheEntry {
                classification,
                last_used: self.tick,
            },
        );
    }

    fn evict_lru(&mut self) {
        let lru = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);
        if let Some(key) = lru {
            self.entries.remove(&key);
        }
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::TaskCategory;

    fn key(byte: u8) -> CacheKey {
        [byte; 32]
    }

    fn classification(category: TaskCategory) -> Classification {
        Classification::new(category, 0.9)
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = ClassificationCache::new(10);
        cache.insert(key(1), classification(TaskCategory::CodeGeneration));

        let hit = cache.get(&key(1)).unwrap();
        assert_eq!(hit.category, TaskCategory::CodeGeneration);
        assert!(cache.get(&key(2)).is_none());
    }

    #[test]
    fn test_capacity_bound_holds() {
        let mut cache = ClassificationCache::new(3);
        for byte in 0..10 {
            cache.insert(key(byte), classification(TaskCategory::General));
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_eviction_is_least_recently_used() {
        let mut cache = ClassificationCache::new(2);
        cache.insert(key(1), classification(TaskCategory::CodeGeneration));
        cache.insert(key(2), classification(TaskCategory::Debugging));

        // Touch key 1 so key 2 becomes the LRU victim.
        let _ = cache.get(&key(1));
        cache.insert(key(3), classification(TaskCategory::General));

        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(2)).is_none());
        assert!(cache.get(&key(3)).is_some());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let mut cache = ClassificationCache::new(2);
        cache.insert(key(1), classification(TaskCategory::CodeGeneration));
        cache.insert(key(2), classification(TaskCategory::Debugging));
        cache.insert(key(1), classification(TaskCategory::Testing));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1)).unwrap().category, TaskCategory::Testing);
        assert!(cache.get(&key(2)).is_some());
    }
}
