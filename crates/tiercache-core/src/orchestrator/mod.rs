//! Public façade composing the volatile, local and remote tiers.
//!
//! # Read path
//!
//! ```text
//! get(key) → Volatile ──hit──────────────────────────────→ value
//!              ↓ miss
//!            Local ──hit── promote to Volatile ──────────→ value
//!              ↓ miss
//!            Remote (online only) ──hit── promote to both → value
//!              ↓ miss
//!            None
//! ```
//!
//! # Write path
//!
//! `set()` writes Volatile, then Local (when the TTL meets the durable floor),
//! then either pushes to Remote immediately (`Priority::High`) or queues the
//! key for the next drain. Offline writes are always queued.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiercache_core::{CacheConfig, CacheOrchestrator, MemoryBackend, MemoryStore, SetOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache: CacheOrchestrator<serde_json::Value> = CacheOrchestrator::new(
//!         CacheConfig::default(),
//!         Box::new(MemoryStore::new(1000)),
//!         Arc::new(MemoryBackend::new()),
//!     )?;
//!     cache.initialize();
//!
//!     cache.set("user:1", serde_json::json!({"score": 10}), SetOptions::ttl(2000)).await;
//!     assert!(cache.get("user:1").await.is_some());
//!
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```

mod api;
mod drain;
mod lifecycle;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::api::{RemoteBackend, RemoteTier};
use crate::cache::{DurableStore, FileStore, LocalDurableTier, VolatileTier};
use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::stats::StatsCollector;
use crate::sync::{NetworkMonitor, SyncQueue};
use crate::utils::sanitize_key;

use lifecycle::BackgroundTask;

/// Anything that can live in every tier: cloned in memory, serialized below it.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// State shared between the façade and the background sync task.
pub(crate) struct Inner<T> {
    pub(crate) config: CacheConfig,
    pub(crate) volatile: Mutex<VolatileTier<T>>,
    pub(crate) local: LocalDurableTier,
    pub(crate) remote: RemoteTier,
    pub(crate) queue: SyncQueue,
    pub(crate) network: NetworkMonitor,
    pub(crate) stats: StatsCollector,
    /// Bumped by every set/delete/clear; a remote read only promotes if unchanged
    pub(crate) generation: AtomicU64,
}

/// Multi-tier read-through/write-through cache.
///
/// Every public method returns a plain value: tier failures are logged,
/// recorded as the tier's last error and degrade to a miss or `false`.
pub struct CacheOrchestrator<T> {
    inner: Arc<Inner<T>>,
    task: Mutex<Option<BackgroundTask>>,
}

impl<T: Payload> CacheOrchestrator<T> {
    pub fn new(
        config: CacheConfig,
        store: Box<dyn DurableStore>,
        backend: Arc<dyn RemoteBackend>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let inner = Inner {
            volatile: Mutex::new(VolatileTier::new(config.volatile_capacity)),
            local: LocalDurableTier::new(store, config.local_min_ttl_ms),
            remote: RemoteTier::new(backend, config.remote_timeout(), config.remote_batch_size),
            queue: SyncQueue::new(config.max_sync_retries),
            network: NetworkMonitor::new(true),
            stats: StatsCollector::new(),
            generation: AtomicU64::new(0),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
            task: Mutex::new(None),
        })
    }

    /// Build with a `FileStore` in the configured cache directory
    pub fn with_file_store(config: CacheConfig, backend: Arc<dyn RemoteBackend>) -> anyhow::Result<Self> {
        let store = FileStore::open(config.cache_dir()?, config.local_quota_bytes)?;
        Ok(Self::new(config, Box::new(store), backend)?)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Connectivity control shared with the background task
    pub fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    pub fn is_online(&self) -> bool {
        self.inner.network.is_online()
    }

    /// The key every tier sees for an application key
    pub fn canonical_key(&self, key: &str) -> String {
        sanitize_key(key, self.inner.config.max_key_length)
    }
}
