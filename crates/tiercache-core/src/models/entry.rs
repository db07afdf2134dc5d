use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParsePriorityError;

/// Tier an entry's current value was first written to or fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OriginTier {
    Volatile,
    Local,
    Remote,
}

/// Remote reconciliation state of an entry.
///
/// `Pending -> Synced` once the remote tier confirms a write,
/// `Pending -> Pending` on a transient failure (retry count bumped),
/// `Pending -> Failed` once retries are exhausted. `LocalOnly` marks
/// entries written with `skip_remote` that are never propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
    LocalOnly,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::LocalOnly => "localOnly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub origin_tier: OriginTier,
    pub sync_status: SyncStatus,
    pub retry_count: u32,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, data: T, ttl_ms: u64, origin_tier: OriginTier) -> Self {
        Self {
            key: key.into(),
            data,
            created_at: Utc::now(),
            ttl_ms,
            origin_tier,
            sync_status: SyncStatus::Pending,
            retry_count: 0,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry_of(self.created_at, self.ttl_ms)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Milliseconds left before expiry, zero once expired
    pub fn remaining_ttl_ms(&self) -> u64 {
        let left = self.expires_at() - Utc::now();
        left.num_milliseconds().max(0) as u64
    }

    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.created_at).num_milliseconds()
    }

    pub fn age_display(&self) -> String {
        let ms = self.age_ms();
        if ms < 1000 {
            // Handles clock skew as well
            "just now".to_string()
        } else if ms < 60_000 {
            format!("{}s ago", ms / 1000)
        } else if ms < 3_600_000 {
            format!("{}m ago", ms / 60_000)
        } else if ms < 86_400_000 {
            format!("{}h ago", ms / 3_600_000)
        } else {
            format!("{}d ago", ms / 86_400_000)
        }
    }
}

/// `created_at + ttl`, saturating instead of overflowing on absurd TTLs
pub fn expiry_of(created_at: DateTime<Utc>, ttl_ms: u64) -> DateTime<Utc> {
    let ttl = Duration::milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX / 2));
    created_at
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Write priority for `set()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Push to the remote tier within the call
    High,
    #[default]
    Normal,
    Low,
}

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}

/// Options for `CacheOrchestrator::set`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Falls back to the configured default TTL when unset
    pub ttl_ms: Option<u64>,
    pub priority: Priority,
    pub skip_remote: bool,
}

impl SetOptions {
    pub fn ttl(ttl_ms: u64) -> Self {
        Self {
            ttl_ms: Some(ttl_ms),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn skip_remote(mut self) -> Self {
        self.skip_remote = true;
        self
    }
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub synced: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_pending() {
        let entry = CacheEntry::new("k", 1, 1000, OriginTier::Volatile);
        assert_eq!(entry.sync_status, SyncStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_expiry_boundary() {
        let mut entry = CacheEntry::new("k", 1, 2000, OriginTier::Volatile);
        entry.created_at = Utc::now() - Duration::milliseconds(2100);
        assert!(entry.is_expired());
        assert_eq!(entry.remaining_ttl_ms(), 0);

        let at = entry.created_at + Duration::milliseconds(1999);
        assert!(!entry.is_expired_at(at));
        assert!(entry.is_expired_at(entry.expires_at()));
    }

    #[test]
    fn test_expiry_of_huge_ttl_saturates() {
        let now = Utc::now();
        assert!(expiry_of(now, u64::MAX) > now);
    }

    #[test]
    fn test_age_display() {
        let mut entry = CacheEntry::new("k", (), 1000, OriginTier::Local);
        assert_eq!(entry.age_display(), "just now");
        entry.created_at = Utc::now() - Duration::minutes(5);
        assert_eq!(entry.age_display(), "5m ago");
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert_eq!("low".parse::<Priority>(), Ok(Priority::Low));
        assert_eq!(
            "urgent".parse::<Priority>(),
            Err(ParsePriorityError("urgent".to_string()))
        );
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = CacheEntry::new("k", 7, 1000, OriginTier::Remote);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["syncStatus"], "pending");
        assert_eq!(json["originTier"], "remote");
        assert_eq!(json["ttlMs"], 1000);
    }
}
