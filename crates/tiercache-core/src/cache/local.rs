//! Durable per-device tier with quota-driven eviction.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, StoreError};
use crate::models::{expiry_of, CacheEntry};

use super::store::DurableStore;

/// Short-lived data is not worth a durable write.
pub const DEFAULT_LOCAL_MIN_TTL_MS: u64 = 60_000;

/// Fraction of entries dropped when the store reports its quota is full.
const QUOTA_EVICTION_DIVISOR: usize = 4;

/// Just the fields needed to order and expire entries without knowing `T`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredHeader {
    created_at: DateTime<Utc>,
    ttl_ms: u64,
}

pub struct LocalDurableTier {
    store: Box<dyn DurableStore>,
    min_ttl_ms: u64,
    last_error: Mutex<Option<CacheError>>,
}

impl LocalDurableTier {
    pub fn new(store: Box<dyn DurableStore>, min_ttl_ms: u64) -> Self {
        Self {
            store,
            min_ttl_ms,
            last_error: Mutex::new(None),
        }
    }

    pub fn min_ttl_ms(&self) -> u64 {
        self.min_ttl_ms
    }

    /// Whether an entry with this TTL belongs in durable storage
    pub fn accepts(&self, ttl_ms: u64) -> bool {
        ttl_ms >= self.min_ttl_ms
    }

    pub fn last_error(&self) -> Option<CacheError> {
        self.last_error.lock().clone()
    }

    fn record_error(&self, err: CacheError) -> CacheError {
        *self.last_error.lock() = Some(err.clone());
        err
    }

    fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!(key = key, error = %e, "Failed to remove local entry");
        }
    }

    /// Live entry for `key`. Corrupt or expired entries are removed and reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                let err = self.record_error(CacheError::Storage(e.to_string()));
                warn!(key = key, error = %err, "Local read failed");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                let err = self.record_error(CacheError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
                warn!(error = %err, "Purging corrupt local entry");
                self.remove_quietly(key);
                return None;
            }
        };

        if entry.is_expired() {
            debug!(key = key, "Local entry expired");
            self.remove_quietly(key);
            return None;
        }

        Some(entry)
    }

    /// Serialize and write an entry. When the store is full the oldest quarter
    /// of entries is evicted and the write is retried exactly once.
    pub fn set<T: Serialize>(&self, entry: &CacheEntry<T>) -> Result<(), CacheError> {
        let raw = serde_json::to_string(entry).map_err(|e| {
            self.record_error(CacheError::Serialization {
                key: entry.key.clone(),
                reason: e.to_string(),
            })
        })?;

        match self.store.set(&entry.key, &raw) {
            Ok(()) => Ok(()),
            Err(StoreError::QuotaExceeded { used, quota }) => {
                let evicted = self.evict_oldest_quarter();
                warn!(
                    key = %entry.key,
                    used = used,
                    quota = quota,
                    evicted = evicted,
                    "Local quota exceeded, evicted oldest entries"
                );
                self.store.set(&entry.key, &raw).map_err(|e| {
                    let err = match e {
                        StoreError::QuotaExceeded { .. } => CacheError::QuotaExceeded(entry.key.clone()),
                        other => CacheError::Storage(other.to_string()),
                    };
                    warn!(error = %err, "Local write failed after eviction");
                    self.record_error(err)
                })
            }
            Err(e) => {
                let err = self.record_error(CacheError::Storage(e.to_string()));
                warn!(key = %entry.key, error = %err, "Local write failed");
                Err(err)
            }
        }
    }

    /// Rewrite an existing entry in place. Missing or unreadable entries are left alone.
    pub fn update<T, F>(&self, key: &str, f: F) -> bool
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut CacheEntry<T>),
    {
        match self.get::<T>(key) {
            Some(mut entry) => {
                f(&mut entry);
                self.set(&entry).is_ok()
            }
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        match self.store.remove(key) {
            Ok(()) => true,
            Err(e) => {
                let err = self.record_error(CacheError::Storage(e.to_string()));
                warn!(key = key, error = %err, "Local delete failed");
                false
            }
        }
    }

    pub fn clear(&self) -> bool {
        match self.store.clear() {
            Ok(()) => true,
            Err(e) => {
                let err = self.record_error(CacheError::Storage(e.to_string()));
                warn!(error = %err, "Local clear failed");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.store.keys().map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored timestamp for every key; unreadable entries sort first.
    fn headers(&self) -> Vec<(String, Option<StoredHeader>)> {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list local entries");
                return Vec::new();
            }
        };

        keys.into_iter()
            .map(|key| {
                let header = self
                    .store
                    .get(&key)
                    .ok()
                    .flatten()
                    .and_then(|raw| serde_json::from_str::<StoredHeader>(&raw).ok());
                (key, header)
            })
            .collect()
    }

    /// Drop the oldest 25% of entries (at least one). Returns how many were removed.
    pub fn evict_oldest_quarter(&self) -> usize {
        let mut headers = self.headers();
        if headers.is_empty() {
            return 0;
        }
        headers.sort_by_key(|(_, header)| header.as_ref().map(|h| h.created_at));

        let count = headers.len().div_ceil(QUOTA_EVICTION_DIVISOR).max(1);
        for (key, _) in headers.iter().take(count) {
            self.remove_quietly(key);
        }
        count
    }

    /// Remove every expired or unreadable entry
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        for (key, header) in self.headers() {
            let expired = match header {
                Some(h) => now >= expiry_of(h.created_at, h.ttl_ms),
                None => true,
            };
            if expired {
                self.remove_quietly(&key);
                purged += 1;
            }
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{FileStore, MemoryStore};
    use crate::models::{OriginTier, SyncStatus};
    use chrono::Duration;
    use tempfile::TempDir;

    fn entry(key: &str, value: i32) -> CacheEntry<i32> {
        CacheEntry::new(key, value, 120_000, OriginTier::Volatile)
    }

    fn memory_tier(max_entries: usize) -> LocalDurableTier {
        LocalDurableTier::new(Box::new(MemoryStore::new(max_entries)), DEFAULT_LOCAL_MIN_TTL_MS)
    }

    #[test]
    fn test_roundtrip() {
        let tier = memory_tier(10);
        tier.set(&entry("a", 1)).unwrap();
        let back: CacheEntry<i32> = tier.get("a").unwrap();
        assert_eq!(back.data, 1);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_min_ttl_floor() {
        let tier = memory_tier(10);
        assert!(!tier.accepts(1_000));
        assert!(tier.accepts(DEFAULT_LOCAL_MIN_TTL_MS));
    }

    #[test]
    fn test_corrupt_entry_purged() {
        let store = MemoryStore::new(10);
        store.insert_raw("bad", "{not json");
        let tier = LocalDurableTier::new(Box::new(store), 0);

        assert!(tier.get::<i32>("bad").is_none());
        assert!(matches!(tier.last_error(), Some(CacheError::Serialization { .. })));
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn test_type_mismatch_treated_as_corrupt() {
        let tier = memory_tier(10);
        tier.set(&CacheEntry::new("a", "text", 120_000, OriginTier::Volatile))
            .unwrap();
        assert!(tier.get::<i32>("a").is_none());
        assert!(tier.is_empty());
    }

    #[test]
    fn test_expired_entry_removed() {
        let tier = memory_tier(10);
        let mut old = entry("a", 1);
        old.created_at = Utc::now() - Duration::minutes(10);
        tier.set(&old).unwrap();
        assert!(tier.get::<i32>("a").is_none());
        assert!(tier.is_empty());
    }

    #[test]
    fn test_quota_evicts_oldest_quarter() {
        let tier = memory_tier(8);
        let base = Utc::now();
        for i in 0..8 {
            let mut e = entry(&format!("k{}", i), i);
            e.created_at = base + Duration::milliseconds(i as i64);
            tier.set(&e).unwrap();
        }

        let mut newest = entry("k8", 8);
        newest.created_at = base + Duration::milliseconds(8);
        tier.set(&newest).unwrap();

        assert!(tier.len() <= 8);
        assert!(tier.get::<i32>("k0").is_none());
        assert!(tier.get::<i32>("k1").is_none());
        for i in 2..=8 {
            assert!(tier.get::<i32>(&format!("k{}", i)).is_some(), "k{} missing", i);
        }
    }

    #[test]
    fn test_quota_failure_after_retry_is_reported() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().to_path_buf(), 16).unwrap();
        let tier = LocalDurableTier::new(Box::new(store), 0);

        let big = CacheEntry::new("big", "x".repeat(64), 120_000, OriginTier::Volatile);
        assert_eq!(tier.set(&big), Err(CacheError::QuotaExceeded("big".to_string())));
        assert_eq!(tier.last_error(), Some(CacheError::QuotaExceeded("big".to_string())));
    }

    #[test]
    fn test_update_rewrites_status() {
        let tier = memory_tier(10);
        tier.set(&entry("a", 1)).unwrap();
        assert!(tier.update::<i32, _>("a", |e| {
            e.sync_status = SyncStatus::Failed;
            e.retry_count = 3;
        }));
        let back: CacheEntry<i32> = tier.get("a").unwrap();
        assert_eq!(back.sync_status, SyncStatus::Failed);
        assert_eq!(back.retry_count, 3);
        assert!(!tier.update::<i32, _>("missing", |_| {}));
    }

    #[test]
    fn test_purge_expired() {
        let store = MemoryStore::new(10);
        store.insert_raw("junk", "???");
        let tier = LocalDurableTier::new(Box::new(store), 0);
        let mut old = entry("old", 1);
        old.created_at = Utc::now() - Duration::minutes(10);
        tier.set(&old).unwrap();
        tier.set(&entry("fresh", 2)).unwrap();

        assert_eq!(tier.purge_expired(), 2);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_file_backed_tier() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().to_path_buf(), 1 << 20).unwrap();
        let tier = LocalDurableTier::new(Box::new(store), 0);
        tier.set(&entry("user:1", 10)).unwrap();
        assert_eq!(tier.get::<i32>("user:1").map(|e| e.data), Some(10));
        assert!(tier.delete("user:1"));
        assert!(tier.get::<i32>("user:1").is_none());
    }
}
