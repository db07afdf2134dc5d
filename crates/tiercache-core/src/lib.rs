//! Core library for tiercache.
//!
//! A read-through/write-through cache that sits between an application and a
//! slow, sometimes-unavailable remote persistence service:
//!
//! - `cache`: the volatile (in-process LRU) and local durable tiers
//! - `api`: the remote tier client and its pluggable backends
//! - `sync`: the pending-write queue and connectivity monitor
//! - `orchestrator`: `CacheOrchestrator`, the public façade
//!
//! Remote problems never surface to callers: a total outage degrades to a
//! local-only cache, and queued writes are reconciled once connectivity returns.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod stats;
pub mod sync;
pub mod utils;

pub use api::{HttpBackend, MemoryBackend, RemoteBackend, RemoteError, RemoteRecord, RemoteTier};
pub use cache::{DurableStore, FileStore, LocalDurableTier, MemoryStore, VolatileTier};
pub use config::CacheConfig;
pub use error::{CacheError, ConfigError, ParsePriorityError, StoreError};
pub use models::{
    CacheEntry, OriginTier, Priority, SetOptions, StatsSnapshot, SyncResult, SyncStatus,
};
pub use orchestrator::{CacheOrchestrator, Payload};
pub use stats::StatsCollector;
pub use sync::{NetworkMonitor, SyncQueue};
pub use utils::sanitize_key;
