//! In-process bounded LRU tier holding live values.

use std::collections::HashMap;

use tracing::debug;

use crate::models::CacheEntry;

/// Default number of entries kept in memory.
pub const DEFAULT_VOLATILE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
struct Slot<T> {
    entry: CacheEntry<T>,
    last_access: u64,
}

/// Bounded map with lazy expiry and least-recently-accessed eviction.
///
/// Access order is tracked with a monotonic tick rather than wall-clock
/// time so that two accesses within the same instant still order strictly.
#[derive(Debug)]
pub struct VolatileTier<T> {
    entries: HashMap<String, Slot<T>>,
    capacity: usize,
    tick: u64,
}

impl<T: Clone> VolatileTier<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Live entry for `key`, refreshing its access time. Expired entries are dropped.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let expired = self.entries.get(key)?.entry.is_expired();
        if expired {
            debug!(key = key, "Volatile entry expired");
            self.entries.remove(key);
            return None;
        }

        let tick = self.next_tick();
        let slot = self.entries.get_mut(key)?;
        slot.last_access = tick;
        Some(slot.entry.clone())
    }

    /// Live entry without touching access order
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries
            .get(key)
            .map(|slot| &slot.entry)
            .filter(|entry| !entry.is_expired())
    }

    /// Insert or replace an entry, evicting the least recently accessed one when full.
    /// Returns the evicted key, if any.
    pub fn set(&mut self, entry: CacheEntry<T>) -> Option<String> {
        let mut evicted = None;
        if !self.entries.contains_key(&entry.key) && self.entries.len() >= self.capacity {
            evicted = self.evict_lru();
        }

        let tick = self.next_tick();
        self.entries.insert(
            entry.key.clone(),
            Slot {
                entry,
                last_access: tick,
            },
        );
        evicted
    }

    fn evict_lru(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(key, _)| key.clone())?;
        self.entries.remove(&oldest);
        debug!(key = %oldest, "Evicted least recently used volatile entry");
        Some(oldest)
    }

    /// Mutate an entry in place without counting as an access
    pub fn update(&mut self, key: &str, f: impl FnOnce(&mut CacheEntry<T>)) -> bool {
        match self.entries.get_mut(key) {
            Some(slot) => {
                f(&mut slot.entry);
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.entry.is_expired());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OriginTier, SyncStatus};
    use chrono::{Duration, Utc};

    fn entry(key: &str, value: i32) -> CacheEntry<i32> {
        CacheEntry::new(key, value, 60_000, OriginTier::Volatile)
    }

    #[test]
    fn test_get_set() {
        let mut tier = VolatileTier::new(3);
        assert!(tier.get("a").is_none());
        tier.set(entry("a", 1));
        assert_eq!(tier.get("a").map(|e| e.data), Some(1));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_evicts_oldest_insert() {
        let mut tier = VolatileTier::new(3);
        tier.set(entry("a", 1));
        tier.set(entry("b", 2));
        tier.set(entry("c", 3));
        assert_eq!(tier.set(entry("d", 4)), Some("a".to_string()));
        assert!(tier.get("a").is_none());
        assert_eq!(tier.len(), 3);
    }

    #[test]
    fn test_access_refreshes_lru() {
        let mut tier = VolatileTier::new(3);
        tier.set(entry("a", 1));
        tier.set(entry("b", 2));
        tier.set(entry("c", 3));
        tier.get("a");
        assert_eq!(tier.set(entry("d", 4)), Some("b".to_string()));
        assert!(tier.get("a").is_some());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let mut tier = VolatileTier::new(2);
        tier.set(entry("a", 1));
        tier.set(entry("b", 2));
        assert_eq!(tier.set(entry("a", 10)), None);
        assert_eq!(tier.get("a").map(|e| e.data), Some(10));
        assert_eq!(tier.len(), 2);
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let mut tier = VolatileTier::new(3);
        let mut old = entry("a", 1);
        old.created_at = Utc::now() - Duration::minutes(5);
        tier.set(old);
        assert!(tier.peek("a").is_none());
        assert!(tier.get("a").is_none());
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn test_update_and_delete() {
        let mut tier = VolatileTier::new(3);
        tier.set(entry("a", 1));
        assert!(tier.update("a", |e| e.sync_status = SyncStatus::Synced));
        assert_eq!(tier.peek("a").map(|e| e.sync_status), Some(SyncStatus::Synced));
        assert!(!tier.update("missing", |_| {}));
        assert!(tier.delete("a"));
        assert!(!tier.delete("a"));
    }

    #[test]
    fn test_purge_expired() {
        let mut tier = VolatileTier::new(3);
        let mut old = entry("old", 1);
        old.created_at = Utc::now() - Duration::minutes(5);
        tier.set(old);
        tier.set(entry("new", 2));
        assert_eq!(tier.purge_expired(), 1);
        assert_eq!(tier.len(), 1);
    }
}
