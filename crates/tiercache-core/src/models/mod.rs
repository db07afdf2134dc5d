//! Data models shared by every cache tier.
//!
//! - `CacheEntry`: a payload plus its TTL, origin tier and sync state
//! - `SetOptions`, `Priority`: write options for the orchestrator
//! - `SyncResult`: outcome of a drain cycle
//! - `StatsSnapshot`: per-tier counters returned by `get_detailed_stats()`

pub mod entry;
pub mod stats;

pub use entry::{expiry_of, CacheEntry, OriginTier, Priority, SetOptions, SyncResult, SyncStatus};
pub use stats::{RemoteStats, StatsSnapshot, SyncStats, TierStats};
