use thiserror::Error;

use crate::api::RemoteError;

/// Failures a cache tier can report.
///
/// None of these ever leave `CacheOrchestrator`: they are logged, recorded
/// as a tier's last error, and turned into a miss or a `false` result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Entry expired: {0}")]
    ExpiredEntry(String),

    #[error("Corrupt entry for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage quota exceeded writing {0}")]
    QuotaExceeded(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Remote tier unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Remote call timed out after {0}ms")]
    RemoteTimeout(u64),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Sync retries exhausted for {key} after {attempts} attempts")]
    SyncExhausted { key: String, attempts: u32 },
}

impl From<RemoteError> for CacheError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(msg) | RemoteError::Unavailable(msg) => {
                CacheError::NetworkUnavailable(msg)
            }
            other => CacheError::Remote(other.to_string()),
        }
    }
}

/// Errors from a durable key-value backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Distinct from other write failures so the tier can evict and retry
    #[error("Quota exceeded: {used} of {quota} used")]
    QuotaExceeded { used: u64, quota: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("max_key_length must be at least {min}, got {got}")]
    KeyLength { min: usize, got: usize },
}

/// Unrecognised write priority name.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown priority '{0}' (expected high, normal or low)")]
pub struct ParsePriorityError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_maps_to_network_unavailable() {
        let err: CacheError = RemoteError::Unavailable("down".to_string()).into();
        assert_eq!(err, CacheError::NetworkUnavailable("down".to_string()));

        let err: CacheError = RemoteError::RateLimited.into();
        assert!(matches!(err, CacheError::Remote(_)));
    }

    #[test]
    fn test_quota_error_display() {
        let err = StoreError::QuotaExceeded { used: 10, quota: 8 };
        assert_eq!(err.to_string(), "Quota exceeded: 10 of 8 used");
    }
}
