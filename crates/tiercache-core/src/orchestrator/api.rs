//! Read, write, delete and reporting operations.

use std::sync::atomic::Ordering;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::RemoteRecord;
use crate::models::{
    CacheEntry, OriginTier, Priority, RemoteStats, SetOptions, StatsSnapshot, SyncResult,
    SyncStats, SyncStatus, TierStats,
};
use crate::sync::{DrainTarget, SyncOutcome};

use super::{CacheOrchestrator, Inner, Payload};

impl<T: Payload> Inner<T> {
    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Cascade through the tiers, promoting a hit into every warmer tier.
    pub(crate) async fn lookup(&self, key: &str) -> Option<CacheEntry<T>> {
        if let Some(entry) = self.volatile.lock().get(key) {
            self.stats.record_hit(OriginTier::Volatile);
            debug!(key = key, "Volatile hit");
            return Some(entry);
        }
        self.stats.record_tier_miss(OriginTier::Volatile);

        if let Some(entry) = self.local.get::<T>(key) {
            self.stats.record_hit(OriginTier::Local);
            debug!(key = key, remaining_ms = entry.remaining_ttl_ms(), "Local hit, promoting");
            self.volatile.lock().set(entry.clone());
            return Some(entry);
        }
        self.stats.record_tier_miss(OriginTier::Local);

        if self.network.is_online() && !self.queue.is_pending_delete(key) {
            let generation = self.generation.load(Ordering::SeqCst);
            if let Some(record) = self.remote.get(key).await {
                match record.into_entry::<T>(key) {
                    Ok(entry) => {
                        self.stats.record_hit(OriginTier::Remote);
                        self.promote_remote(key, &entry, generation);
                        return Some(entry);
                    }
                    Err(e) => {
                        warn!(key = key, error = %e, "Remote record does not match payload type");
                    }
                }
            }
            self.stats.record_tier_miss(OriginTier::Remote);
        }

        self.stats.record_miss();
        None
    }

    /// Copy a remote hit into both local tiers unless a local write or delete
    /// landed while the remote call was in flight.
    fn promote_remote(&self, key: &str, entry: &CacheEntry<T>, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation || self.queue.is_pending_delete(key) {
            debug!(key = key, "Skipping promotion, key changed during remote read");
            return;
        }

        debug!(key = key, "Remote hit, promoting to local tiers");
        self.volatile.lock().set(entry.clone());
        if self.local.accepts(entry.ttl_ms) {
            // Failure is recorded by the tier; the value is still served
            let _ = self.local.set(entry);
        }
    }

    /// Push one entry to the remote tier within the caller's call, queueing it on failure.
    async fn push_now(&self, entry: &CacheEntry<T>) {
        let key = entry.key.as_str();
        let record = match RemoteRecord::from_entry(entry) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to serialize entry for remote");
                self.queue.enqueue(key);
                return;
            }
        };

        self.queue.begin_push(key);
        let pushed = self.remote.set(key, &record).await;
        if self.queue.end_push(key) {
            if pushed {
                self.queue.retract(key, self).await;
            }
            return;
        }

        if !pushed {
            debug!(key = key, "Immediate remote write failed, queueing");
            self.queue.enqueue(key);
        } else if self.mark(key, entry.created_at, SyncOutcome::Synced) {
            self.queue.remove(key);
        }
    }

    pub(crate) async fn purge_expired(&self) -> usize {
        let volatile = self.volatile.lock().purge_expired();
        let local = self.local.purge_expired();
        let remote = if self.network.is_online() {
            self.remote.purge_expired(Utc::now()).await.unwrap_or(0)
        } else {
            0
        };
        if volatile + local + remote > 0 {
            info!(volatile = volatile, local = local, remote = remote, "Purged expired entries");
        }
        volatile + local + remote
    }
}

impl<T: Payload> CacheOrchestrator<T> {
    /// Value for `key` from the warmest tier that has a live copy.
    pub async fn get(&self, key: &str) -> Option<T> {
        let key = self.canonical_key(key);
        self.inner.lookup(&key).await.map(|entry| entry.data)
    }

    /// Like `get`, but returns the whole entry with its sync metadata.
    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        let key = self.canonical_key(key);
        self.inner.lookup(&key).await
    }

    /// Warmest live local copy, without touching stats, LRU order or the remote tier.
    pub fn inspect(&self, key: &str) -> Option<CacheEntry<T>> {
        let key = self.canonical_key(key);
        if let Some(entry) = self.inner.volatile.lock().peek(&key) {
            return Some(entry.clone());
        }
        self.inner.local.get::<T>(&key)
    }

    /// Current `(sync_status, retry_count)` of the local copy
    pub fn entry_status(&self, key: &str) -> Option<(SyncStatus, u32)> {
        self.inspect(key).map(|e| (e.sync_status, e.retry_count))
    }

    /// Write through every local tier and schedule the remote write.
    ///
    /// Returns true if the local writes succeeded; remote failures never fail the call.
    pub async fn set(&self, key: &str, value: T, options: SetOptions) -> bool {
        let inner = &self.inner;
        let key = self.canonical_key(key);
        let ttl_ms = options.ttl_ms.unwrap_or(inner.config.default_ttl_ms);
        if ttl_ms == 0 {
            warn!(key = %key, "Rejecting write with zero TTL");
            return false;
        }

        let mut entry = CacheEntry::new(key.clone(), value, ttl_ms, OriginTier::Volatile);
        if options.skip_remote {
            entry.sync_status = SyncStatus::LocalOnly;
        }

        inner.bump_generation();
        inner.volatile.lock().set(entry.clone());

        let local_ok = if inner.local.accepts(ttl_ms) {
            match inner.local.set(&entry) {
                Ok(()) => true,
                Err(_) => {
                    // The previous durable value must not be served once this one leaves memory
                    inner.local.delete(&key);
                    false
                }
            }
        } else {
            debug!(key = %key, ttl_ms = ttl_ms, floor_ms = inner.local.min_ttl_ms(), "TTL below durable floor, skipping local tier");
            // An older durable copy must not outlive this write
            inner.local.delete(&key)
        };

        if options.skip_remote {
            inner.queue.remove(&key);
            return local_ok;
        }

        if !inner.network.is_online() {
            debug!(key = %key, "Offline, queueing remote write");
            inner.queue.enqueue(&key);
            return local_ok;
        }

        match options.priority {
            Priority::High => inner.push_now(&entry).await,
            Priority::Normal | Priority::Low => inner.queue.enqueue(&key),
        }

        local_ok
    }

    /// Remove `key` from every tier before returning.
    ///
    /// If the remote tier cannot be reached the delete is queued and replayed
    /// on the next drain; until then remote copies of the key are ignored.
    pub async fn delete(&self, key: &str) -> bool {
        let inner = &self.inner;
        let key = self.canonical_key(key);

        inner.bump_generation();
        inner.volatile.lock().delete(&key);
        let local_ok = inner.local.delete(&key);
        if inner.queue.discard(&key) {
            debug!(key = %key, "Delete raced an in-flight remote write");
        }

        if !inner.network.is_online() {
            debug!(key = %key, "Offline, queueing remote delete");
            inner.queue.enqueue_delete(&key);
        } else if !inner.remote.delete(&key).await {
            inner.queue.enqueue_delete(&key);
        }

        local_ok
    }

    /// Empty the volatile and durable tiers and reset the sync queue and stats,
    /// leaving the remote tier alone. Returns whether the durable tier was cleared.
    pub fn clear_local(&self) -> bool {
        let inner = &self.inner;

        inner.bump_generation();
        inner.volatile.lock().clear();
        let local_ok = inner.local.clear();
        inner.queue.reset();
        inner.stats.reset();
        local_ok
    }

    /// Empty every tier and reset the sync queue and stats.
    ///
    /// Returns false if any tier could not be cleared, including the remote
    /// tier while offline.
    pub async fn clear(&self) -> bool {
        let inner = &self.inner;
        let local_ok = self.clear_local();

        let remote_ok = if inner.network.is_online() {
            inner.remote.clear().await
        } else {
            warn!("Offline, remote tier not cleared");
            false
        };

        info!(local = local_ok, remote = remote_ok, "Cache cleared");
        local_ok && remote_ok
    }

    /// Run one drain cycle now. A no-op while offline.
    pub async fn force_sync(&self) -> SyncResult {
        if !self.inner.network.is_online() {
            return SyncResult::default();
        }
        self.inner.queue.drain(&*self.inner).await
    }

    /// Drop expired entries from every tier; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        self.inner.purge_expired().await
    }

    pub async fn get_detailed_stats(&self) -> StatsSnapshot {
        let inner = &self.inner;
        let stats = &inner.stats;

        let (volatile_hits, volatile_misses) = stats.tier_counts(OriginTier::Volatile);
        let (local_hits, local_misses) = stats.tier_counts(OriginTier::Local);
        let (remote_hits, remote_misses) = stats.tier_counts(OriginTier::Remote);
        let (total_hits, total_misses) = stats.totals();

        StatsSnapshot {
            volatile: TierStats {
                hits: volatile_hits,
                misses: volatile_misses,
                size: inner.volatile.lock().len(),
                last_error: None,
            },
            local: TierStats {
                hits: local_hits,
                misses: local_misses,
                size: inner.local.len(),
                last_error: inner.local.last_error().map(|e| e.to_string()),
            },
            remote: RemoteStats {
                hits: remote_hits,
                misses: remote_misses,
                available: inner.remote.is_available(),
                last_error: inner.remote.last_error().map(|e| e.to_string()),
            },
            sync: SyncStats {
                pending: inner.queue.len(),
                pending_deletes: inner.queue.pending_deletes(),
                synced_total: inner.queue.synced_total(),
                failed_total: inner.queue.failed_total(),
                exhausted_total: inner.queue.exhausted_total(),
            },
            total_hits,
            total_misses,
            hit_ratio: stats.hit_ratio(),
            online: inner.network.is_online(),
        }
    }
}
