//! Pending-write queue and the drain protocol that reconciles it with the remote tier.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::RemoteRecord;
use crate::error::CacheError;
use crate::models::{SyncResult, SyncStatus};

/// Default number of failed drain attempts before an entry is given up on.
pub const DEFAULT_MAX_SYNC_RETRIES: u32 = 3;

/// Current local copy of a queued key, ready to push.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub record: RemoteRecord,
    pub created_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
    pub retry_count: u32,
}

/// Result of one push attempt, applied back onto the local copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    Retry { retry_count: u32 },
    Failed { retry_count: u32 },
}

/// What a drain needs from the tiers it reconciles.
#[async_trait]
pub trait DrainTarget: Send + Sync {
    /// Warmest live local copy of `key`
    fn lookup(&self, key: &str) -> Option<PendingWrite>;

    async fn push(&self, key: &str, record: &RemoteRecord) -> bool;

    async fn push_delete(&self, key: &str) -> bool;

    /// Apply an outcome to the local copies, but only if they still hold the
    /// version created at `created_at`. Returns false if the entry was replaced.
    fn mark(&self, key: &str, created_at: DateTime<Utc>, outcome: SyncOutcome) -> bool;
}

#[derive(Debug, Default)]
struct QueueState {
    pending: HashSet<String>,
    deletes: HashSet<String>,
    /// Keys with a remote write on the wire, and how many
    in_flight: HashMap<String, usize>,
}

impl QueueState {
    /// Drop a pending delete unless a push of the key is still outstanding
    fn settle_delete(&mut self, key: &str) {
        if !self.in_flight.contains_key(key) {
            self.deletes.remove(key);
        }
    }
}

/// Keys whose local state has not reached the remote tier yet.
pub struct SyncQueue {
    state: Mutex<QueueState>,
    max_retries: u32,
    drain_lock: tokio::sync::Mutex<()>,
    synced_total: AtomicU64,
    failed_total: AtomicU64,
    exhausted_total: AtomicU64,
    last_error: Mutex<Option<CacheError>>,
}

impl SyncQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_retries: max_retries.max(1),
            drain_lock: tokio::sync::Mutex::new(()),
            synced_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
            exhausted_total: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Queue a write; cancels any pending delete for the same key
    pub fn enqueue(&self, key: &str) {
        let mut state = self.state.lock();
        state.deletes.remove(key);
        state.pending.insert(key.to_string());
    }

    /// Queue a remote delete; cancels any pending write for the same key
    pub fn enqueue_delete(&self, key: &str) {
        let mut state = self.state.lock();
        state.pending.remove(key);
        state.deletes.insert(key.to_string());
    }

    /// Forget a key entirely
    pub fn remove(&self, key: &str) {
        let mut state = self.state.lock();
        state.pending.remove(key);
        state.deletes.remove(key);
    }

    /// Forget a deleted key.
    ///
    /// If a push of the key is in flight, a pending delete is kept so the pushed
    /// value is retracted once the push lands. Returns whether that happened.
    pub fn discard(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        state.pending.remove(key);
        if state.in_flight.contains_key(key) {
            state.deletes.insert(key.to_string());
            true
        } else {
            state.deletes.remove(key);
            false
        }
    }

    /// Record that a remote write of `key` has started
    pub fn begin_push(&self, key: &str) {
        *self
            .state
            .lock()
            .in_flight
            .entry(key.to_string())
            .or_insert(0) += 1;
    }

    /// Record that a remote write of `key` finished. Returns true if the key was
    /// deleted or cleared meanwhile and the pushed value must be retracted.
    pub fn end_push(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if let Some(count) = state.in_flight.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                state.in_flight.remove(key);
            }
        }
        state.deletes.contains(key)
    }

    /// Delete a value that was pushed after its key was deleted locally.
    /// On failure the pending delete stays for the next drain.
    pub async fn retract(&self, key: &str, target: &dyn DrainTarget) -> bool {
        debug!(key = %key, "Key deleted during remote write, retracting");
        if target.push_delete(key).await {
            self.state.lock().settle_delete(key);
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.state.lock().pending.contains(key)
    }

    pub fn is_pending_delete(&self, key: &str) -> bool {
        self.state.lock().deletes.contains(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_deletes(&self) -> usize {
        self.state.lock().deletes.len()
    }

    pub fn synced_total(&self) -> u64 {
        self.synced_total.load(Ordering::Relaxed)
    }

    pub fn failed_total(&self) -> u64 {
        self.failed_total.load(Ordering::Relaxed)
    }

    pub fn exhausted_total(&self) -> u64 {
        self.exhausted_total.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<CacheError> {
        self.last_error.lock().clone()
    }

    /// Drop every queued key and zero the counters
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        // Writes still on the wire must be undone once they land
        let in_flight: HashSet<String> = state.in_flight.keys().cloned().collect();
        state.deletes = in_flight;
        self.synced_total.store(0, Ordering::Relaxed);
        self.failed_total.store(0, Ordering::Relaxed);
        self.exhausted_total.store(0, Ordering::Relaxed);
        *self.last_error.lock() = None;
    }

    /// Sorted copies of the queued keys, taken under one lock
    fn snapshot(&self) -> (Vec<String>, Vec<String>) {
        let state = self.state.lock();
        let mut writes: Vec<String> = state.pending.iter().cloned().collect();
        let mut deletes: Vec<String> = state.deletes.iter().cloned().collect();
        writes.sort();
        deletes.sort();
        (writes, deletes)
    }

    /// Run a drain cycle, waiting for any cycle already in flight to finish first.
    pub async fn drain(&self, target: &dyn DrainTarget) -> SyncResult {
        let _guard = self.drain_lock.lock().await;
        self.drain_snapshot(target).await
    }

    /// Run a drain cycle unless one is already in flight.
    pub async fn try_drain(&self, target: &dyn DrainTarget) -> Option<SyncResult> {
        let _guard = self.drain_lock.try_lock().ok()?;
        Some(self.drain_snapshot(target).await)
    }

    async fn drain_snapshot(&self, target: &dyn DrainTarget) -> SyncResult {
        let (writes, deletes) = self.snapshot();
        if writes.is_empty() && deletes.is_empty() {
            return SyncResult::default();
        }

        let mut result = SyncResult::default();

        for key in &deletes {
            if !self.is_pending_delete(key) {
                continue;
            }
            if target.push_delete(key).await {
                self.state.lock().settle_delete(key);
                result.synced += 1;
            } else {
                result.failed += 1;
            }
        }

        for key in &writes {
            // Deleted or cleared since the snapshot
            if !self.is_pending(key) {
                continue;
            }

            let write = match target.lookup(key) {
                Some(write) if write.sync_status == SyncStatus::Pending => write,
                _ => {
                    debug!(key = %key, "Dropping queued key with nothing left to sync");
                    self.state.lock().pending.remove(key);
                    continue;
                }
            };

            self.begin_push(key);
            let pushed = target.push(key, &write.record).await;
            if self.end_push(key) {
                if pushed {
                    self.retract(key, target).await;
                }
                continue;
            }

            if pushed {
                if target.mark(key, write.created_at, SyncOutcome::Synced) {
                    self.state.lock().pending.remove(key);
                }
                result.synced += 1;
                continue;
            }

            result.failed += 1;
            let attempts = write.retry_count + 1;
            if attempts >= self.max_retries {
                let err = CacheError::SyncExhausted {
                    key: key.clone(),
                    attempts,
                };
                warn!(error = %err, "Giving up on remote sync, entry stays local");
                if target.mark(key, write.created_at, SyncOutcome::Failed { retry_count: attempts }) {
                    self.state.lock().pending.remove(key);
                }
                *self.last_error.lock() = Some(err);
                self.exhausted_total.fetch_add(1, Ordering::Relaxed);
            } else {
                debug!(key = %key, retry = attempts, "Remote sync failed, will retry");
                target.mark(key, write.created_at, SyncOutcome::Retry { retry_count: attempts });
            }
        }

        self.synced_total.fetch_add(result.synced as u64, Ordering::Relaxed);
        self.failed_total.fetch_add(result.failed as u64, Ordering::Relaxed);
        info!(
            synced = result.synced,
            failed = result.failed,
            remaining = self.len(),
            "Sync drain complete"
        );
        result
    }
}
