//! Contract every remote persistence service must satisfy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::models::{expiry_of, CacheEntry, OriginTier, SyncStatus};

use super::RemoteError;

/// Largest bulk operation most document services accept.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Wire form of a cache entry in the remote tier.
///
/// `expires_at` is stored explicitly so the service can answer
/// "expired before" queries without knowing the TTL rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub expires_at: DateTime<Utc>,
}

impl RemoteRecord {
    pub fn from_entry<T: Serialize>(entry: &CacheEntry<T>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            data: serde_json::to_value(&entry.data)?,
            created_at: entry.created_at,
            ttl_ms: entry.ttl_ms,
            expires_at: entry.expires_at(),
        })
    }

    /// Decode into a cache entry; remote copies are by definition synced.
    pub fn into_entry<T: DeserializeOwned>(
        self,
        key: &str,
    ) -> Result<CacheEntry<T>, serde_json::Error> {
        Ok(CacheEntry {
            key: key.to_string(),
            data: serde_json::from_value(self.data)?,
            created_at: self.created_at,
            ttl_ms: self.ttl_ms,
            origin_tier: OriginTier::Remote,
            sync_status: SyncStatus::Synced,
            retry_count: 0,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at.min(expiry_of(self.created_at, self.ttl_ms))
    }
}

/// A networked document/key-value service backing the remote tier.
///
/// Implementations report failures as `RemoteError`; timeouts and the
/// availability flag are handled by `RemoteTier`, not by backends.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<RemoteRecord>, RemoteError>;

    async fn set(&self, key: &str, record: &RemoteRecord) -> Result<(), RemoteError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), RemoteError>;

    async fn list_keys(&self) -> Result<Vec<String>, RemoteError>;

    /// Delete up to `max_batch_size()` keys in one request, returning how many were removed.
    async fn delete_batch(&self, keys: &[String]) -> Result<usize, RemoteError>;

    /// Keys whose `expiresAt` is before `ts`.
    async fn query_expired_before(&self, ts: DateTime<Utc>) -> Result<Vec<String>, RemoteError>;

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}
