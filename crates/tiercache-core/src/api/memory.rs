//! In-process remote backend.
//!
//! Useful for single-process deployments that still want the sync protocol
//! exercised, and as a controllable stand-in for a real service: failures
//! and latency can be injected and every call is counted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::backend::{RemoteBackend, RemoteRecord, DEFAULT_MAX_BATCH_SIZE};
use super::RemoteError;

#[derive(Debug, Default)]
struct CallCounts {
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
    lists: AtomicUsize,
    batch_deletes: AtomicUsize,
    queries: AtomicUsize,
}

pub struct MemoryBackend {
    records: Mutex<HashMap<String, RemoteRecord>>,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
    max_batch_size: usize,
    calls: CallCounts,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            latency: Mutex::new(None),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            calls: CallCounts::default(),
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Make every subsequent call fail with `RemoteError::Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Total number of calls made against this backend
    pub fn call_count(&self) -> usize {
        self.calls.gets.load(Ordering::SeqCst)
            + self.calls.sets.load(Ordering::SeqCst)
            + self.calls.deletes.load(Ordering::SeqCst)
            + self.calls.lists.load(Ordering::SeqCst)
            + self.calls.batch_deletes.load(Ordering::SeqCst)
            + self.calls.queries.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.calls.sets.load(Ordering::SeqCst)
    }

    pub fn batch_delete_calls(&self) -> usize {
        self.calls.batch_deletes.load(Ordering::SeqCst)
    }

    /// Read a record directly, bypassing failure injection and counters
    pub fn peek(&self, key: &str) -> Option<RemoteRecord> {
        self.records.lock().get(key).cloned()
    }

    /// Write a record directly, bypassing failure injection and counters
    pub fn insert(&self, key: &str, record: RemoteRecord) {
        self.records.lock().insert(key.to_string(), record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<(), RemoteError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        self.enter(&self.calls.gets).await?;
        Ok(self.records.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, record: &RemoteRecord) -> Result<(), RemoteError> {
        self.enter(&self.calls.sets).await?;
        self.records.lock().insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        self.enter(&self.calls.deletes).await?;
        self.records.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, RemoteError> {
        self.enter(&self.calls.lists).await?;
        Ok(self.records.lock().keys().cloned().collect())
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<usize, RemoteError> {
        self.enter(&self.calls.batch_deletes).await?;
        if keys.len() > self.max_batch_size {
            return Err(RemoteError::InvalidResponse(format!(
                "Batch of {} exceeds limit of {}",
                keys.len(),
                self.max_batch_size
            )));
        }
        let mut records = self.records.lock();
        Ok(keys.iter().filter(|k| records.remove(*k).is_some()).count())
    }

    async fn query_expired_before(&self, ts: DateTime<Utc>) -> Result<Vec<String>, RemoteError> {
        self.enter(&self.calls.queries).await?;
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|(_, record)| record.expires_at < ts)
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheEntry, OriginTier};

    fn record(ttl_ms: u64) -> RemoteRecord {
        let entry = CacheEntry::new("k", serde_json::json!(1), ttl_ms, OriginTier::Volatile);
        RemoteRecord::from_entry(&entry).unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_and_counts() {
        let backend = MemoryBackend::new();
        backend.set("a", &record(1000)).await.unwrap();
        assert!(backend.get("a").await.unwrap().is_some());
        backend.delete("a").await.unwrap();
        assert!(backend.get("a").await.unwrap().is_none());
        assert_eq!(backend.call_count(), 4);
        assert_eq!(backend.set_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let backend = MemoryBackend::new();
        backend.set_failing(true);
        assert!(matches!(
            backend.set("a", &record(1000)).await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(backend.is_empty());
        backend.set_failing(false);
        backend.set("a", &record(1000)).await.unwrap();
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_limit_enforced() {
        let backend = MemoryBackend::new().with_max_batch_size(2);
        let keys: Vec<String> = (0..3).map(|i| i.to_string()).collect();
        assert!(backend.delete_batch(&keys).await.is_err());
        assert_eq!(backend.delete_batch(&keys[..2]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_expired_before() {
        let backend = MemoryBackend::new();
        backend.insert("short", record(10));
        backend.insert("long", record(600_000));
        let later = Utc::now() + chrono::Duration::seconds(1);
        let expired = backend.query_expired_before(later).await.unwrap();
        assert_eq!(expired, vec!["short".to_string()]);
    }
}
