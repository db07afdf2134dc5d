//! Remote tier: a timeout-guarded, never-failing wrapper over a `RemoteBackend`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::CacheError;

use super::backend::{RemoteBackend, RemoteRecord};
use super::RemoteError;

pub struct RemoteTier {
    backend: Arc<dyn RemoteBackend>,
    timeout: Duration,
    batch_size: usize,
    available: AtomicBool,
    last_error: Mutex<Option<CacheError>>,
}

impl RemoteTier {
    pub fn new(backend: Arc<dyn RemoteBackend>, timeout: Duration, batch_size: usize) -> Self {
        let batch_size = batch_size.min(backend.max_batch_size()).max(1);
        Self {
            backend,
            timeout,
            batch_size,
            available: AtomicBool::new(true),
            last_error: Mutex::new(None),
        }
    }

    /// False after a network failure or timeout, true again after any success
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<CacheError> {
        self.last_error.lock().clone()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run one backend call under the tier timeout, keeping the availability flag current.
    async fn guarded<T, Fut>(&self, op: &'static str, fut: Fut) -> Result<T, CacheError>
    where
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let err = match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => {
                if !self.available.swap(true, Ordering::SeqCst) {
                    info!(backend = self.backend.name(), "Remote tier available again");
                }
                return Ok(value);
            }
            Ok(Err(e)) => {
                let err = CacheError::from(e);
                if matches!(err, CacheError::NetworkUnavailable(_)) {
                    self.available.store(false, Ordering::SeqCst);
                }
                err
            }
            Err(_) => {
                self.available.store(false, Ordering::SeqCst);
                CacheError::RemoteTimeout(self.timeout.as_millis() as u64)
            }
        };

        warn!(backend = self.backend.name(), op = op, error = %err, "Remote call failed");
        *self.last_error.lock() = Some(err.clone());
        Err(err)
    }

    /// Fetch a live record; expired records are reported as a miss.
    pub async fn get(&self, key: &str) -> Option<RemoteRecord> {
        match self.guarded("get", self.backend.get(key)).await {
            Ok(Some(record)) if record.is_expired() => {
                debug!(key = key, "Remote record expired");
                None
            }
            Ok(record) => record,
            Err(_) => None,
        }
    }

    pub async fn set(&self, key: &str, record: &RemoteRecord) -> bool {
        self.guarded("set", self.backend.set(key, record)).await.is_ok()
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.guarded("delete", self.backend.delete(key)).await.is_ok()
    }

    pub async fn query_expired_before(&self, ts: DateTime<Utc>) -> Option<Vec<String>> {
        self.guarded("query_expired_before", self.backend.query_expired_before(ts))
            .await
            .ok()
    }

    /// Delete `keys` in batches no larger than the service limit.
    /// Returns false if any batch failed.
    pub async fn delete_many(&self, keys: &[String]) -> bool {
        let batches = keys
            .chunks(self.batch_size)
            .map(|chunk| self.guarded("delete_batch", self.backend.delete_batch(chunk)));
        let results = futures::future::join_all(batches).await;

        let mut deleted = 0;
        let mut ok = true;
        for result in results {
            match result {
                Ok(n) => deleted += n,
                Err(_) => ok = false,
            }
        }
        debug!(requested = keys.len(), deleted = deleted, "Remote batch delete finished");
        ok
    }

    pub async fn clear(&self) -> bool {
        let keys = match self.guarded("list_keys", self.backend.list_keys()).await {
            Ok(keys) => keys,
            Err(_) => return false,
        };
        self.delete_many(&keys).await
    }

    /// Server-side expiry sweep; returns how many keys were targeted.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Option<usize> {
        let expired = self.query_expired_before(now).await?;
        if expired.is_empty() {
            return Some(0);
        }
        if self.delete_many(&expired).await {
            Some(expired.len())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryBackend;
    use crate::models::{CacheEntry, OriginTier};

    fn record(ttl_ms: u64) -> RemoteRecord {
        let entry = CacheEntry::new("k", serde_json::json!({"v": 1}), ttl_ms, OriginTier::Volatile);
        RemoteRecord::from_entry(&entry).unwrap()
    }

    fn tier(backend: Arc<MemoryBackend>, timeout_ms: u64) -> RemoteTier {
        RemoteTier::new(backend, Duration::from_millis(timeout_ms), 500)
    }

    #[tokio::test]
    async fn test_failure_flips_availability() {
        let backend = Arc::new(MemoryBackend::new());
        let remote = tier(backend.clone(), 1000);
        assert!(remote.is_available());

        backend.set_failing(true);
        assert!(!remote.set("a", &record(1000)).await);
        assert!(!remote.is_available());
        assert!(matches!(remote.last_error(), Some(CacheError::NetworkUnavailable(_))));
        assert!(remote.get("a").await.is_none());

        backend.set_failing(false);
        assert!(remote.set("a", &record(1000)).await);
        assert!(remote.is_available());
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_failure() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_latency(Some(Duration::from_millis(200)));
        let remote = tier(backend, 20);

        assert!(!remote.set("a", &record(1000)).await);
        assert_eq!(remote.last_error(), Some(CacheError::RemoteTimeout(20)));
        assert!(!remote.is_available());
    }

    #[tokio::test]
    async fn test_expired_record_is_miss() {
        let backend = Arc::new(MemoryBackend::new());
        let mut stale = record(10);
        stale.expires_at = Utc::now() - chrono::Duration::seconds(1);
        backend.insert("old", stale);
        let remote = tier(backend, 1000);
        assert!(remote.get("old").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_respects_batch_size() {
        let backend = Arc::new(MemoryBackend::new().with_max_batch_size(500));
        for i in 0..1200 {
            backend.insert(&format!("k{}", i), record(60_000));
        }
        let remote = tier(backend.clone(), 1000);
        assert!(remote.clear().await);
        assert!(backend.is_empty());
        assert_eq!(backend.batch_delete_calls(), 3);
    }

    #[tokio::test]
    async fn test_batch_size_capped_by_backend() {
        let backend = Arc::new(MemoryBackend::new().with_max_batch_size(10));
        let remote = RemoteTier::new(backend, Duration::from_secs(1), 500);
        assert_eq!(remote.batch_size(), 10);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = Arc::new(MemoryBackend::new());
        let mut stale = record(10);
        stale.expires_at = Utc::now() - chrono::Duration::seconds(1);
        backend.insert("old", stale);
        backend.insert("fresh", record(60_000));
        let remote = tier(backend.clone(), 1000);

        assert_eq!(remote.purge_expired(Utc::now()).await, Some(1));
        assert!(backend.peek("old").is_none());
        assert!(backend.peek("fresh").is_some());
    }
}
