//! Drain target over the orchestrator's local tiers and remote client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::api::RemoteRecord;
use crate::models::{CacheEntry, SyncStatus};
use crate::sync::{DrainTarget, PendingWrite, SyncOutcome};

use super::{Inner, Payload};

fn apply_outcome<T>(entry: &mut CacheEntry<T>, outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Synced => entry.sync_status = SyncStatus::Synced,
        SyncOutcome::Retry { retry_count } => {
            entry.sync_status = SyncStatus::Pending;
            entry.retry_count = retry_count;
        }
        SyncOutcome::Failed { retry_count } => {
            entry.sync_status = SyncStatus::Failed;
            entry.retry_count = retry_count;
        }
    }
}

#[async_trait]
impl<T: Payload> DrainTarget for Inner<T> {
    fn lookup(&self, key: &str) -> Option<PendingWrite> {
        let cached = self.volatile.lock().peek(key).cloned();
        let entry = match cached {
            Some(entry) => entry,
            None => self.local.get::<T>(key)?,
        };

        match RemoteRecord::from_entry(&entry) {
            Ok(record) => Some(PendingWrite {
                record,
                created_at: entry.created_at,
                sync_status: entry.sync_status,
                retry_count: entry.retry_count,
            }),
            Err(e) => {
                warn!(key = key, error = %e, "Queued entry cannot be serialized, dropping");
                None
            }
        }
    }

    async fn push(&self, key: &str, record: &RemoteRecord) -> bool {
        self.remote.set(key, record).await
    }

    async fn push_delete(&self, key: &str) -> bool {
        self.remote.delete(key).await
    }

    fn mark(&self, key: &str, created_at: DateTime<Utc>, outcome: SyncOutcome) -> bool {
        let mut replaced = false;

        self.volatile.lock().update(key, |entry| {
            if entry.created_at == created_at {
                apply_outcome(entry, outcome);
            } else {
                replaced = true;
            }
        });

        self.local.update::<T, _>(key, |entry| {
            if entry.created_at == created_at {
                apply_outcome(entry, outcome);
            } else {
                replaced = true;
            }
        });

        !replaced
    }
}
