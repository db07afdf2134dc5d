//! Cache configuration.
//!
//! Every duration is in milliseconds. Configuration is stored at
//! `~/.config/tiercache/config.json`; missing fields take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_MAX_BATCH_SIZE;
use crate::cache::{DEFAULT_LOCAL_MIN_TTL_MS, DEFAULT_VOLATILE_CAPACITY};
use crate::error::ConfigError;
use crate::sync::DEFAULT_MAX_SYNC_RETRIES;
use crate::utils::DEFAULT_MAX_KEY_LENGTH;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tiercache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Shortest key length that still leaves room for namespaced keys
const MIN_KEY_LENGTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub volatile_capacity: usize,
    /// TTL used when a `set()` does not specify one
    pub default_ttl_ms: u64,
    /// Entries with a shorter TTL never reach durable storage
    pub local_min_ttl_ms: u64,
    /// Byte quota for the on-disk store
    pub local_quota_bytes: u64,
    pub remote_timeout_ms: u64,
    pub remote_batch_size: usize,
    pub max_key_length: usize,
    pub sync_interval_ms: u64,
    pub max_sync_retries: u32,
    pub expiry_sweep_interval_ms: u64,
    /// Overrides the platform cache directory for the file store
    pub cache_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            volatile_capacity: DEFAULT_VOLATILE_CAPACITY,
            default_ttl_ms: 300_000,
            local_min_ttl_ms: DEFAULT_LOCAL_MIN_TTL_MS,
            local_quota_bytes: 5 * 1024 * 1024,
            remote_timeout_ms: 5_000,
            remote_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            sync_interval_ms: 30_000,
            max_sync_retries: DEFAULT_MAX_SYNC_RETRIES,
            expiry_sweep_interval_ms: 300_000,
            cache_dir: None,
        }
    }
}

impl CacheConfig {
    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the durable tier's files
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("volatile_capacity", self.volatile_capacity as u64),
            ("default_ttl_ms", self.default_ttl_ms),
            ("remote_timeout_ms", self.remote_timeout_ms),
            ("remote_batch_size", self.remote_batch_size as u64),
            ("sync_interval_ms", self.sync_interval_ms),
            ("max_sync_retries", self.max_sync_retries as u64),
            ("expiry_sweep_interval_ms", self.expiry_sweep_interval_ms),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.max_key_length < MIN_KEY_LENGTH {
            return Err(ConfigError::KeyLength {
                min: MIN_KEY_LENGTH,
                got: self.max_key_length,
            });
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert_eq!(config.volatile_capacity, 100);
        assert_eq!(config.max_sync_retries, 3);
        assert_eq!(config.remote_batch_size, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = CacheConfig {
            volatile_capacity: 0,
            ..CacheConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero { field: "volatile_capacity" })
        );
    }

    #[test]
    fn test_validate_rejects_short_keys() {
        let config = CacheConfig {
            max_key_length: 4,
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::KeyLength { got: 4, .. })));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"volatile_capacity": 3, "sync_interval_ms": 50}"#).unwrap();

        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.volatile_capacity, 3);
        assert_eq!(config.sync_interval(), Duration::from_millis(50));
        assert_eq!(config.default_ttl_ms, 300_000);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"remote_timeout_ms": 0}"#).unwrap();
        assert!(CacheConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_cache_dir_override() {
        let config = CacheConfig {
            cache_dir: Some(PathBuf::from("/tmp/tiercache-test")),
            ..CacheConfig::default()
        };
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/tiercache-test"));
    }
}
