use serde::{Deserialize, Serialize};

/// Counters and size for one tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    /// Most recent error reported by this tier, if any
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteStats {
    pub hits: u64,
    pub misses: u64,
    pub available: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub pending: usize,
    pub pending_deletes: usize,
    pub synced_total: u64,
    pub failed_total: u64,
    pub exhausted_total: u64,
}

/// Point-in-time view returned by `get_detailed_stats()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub volatile: TierStats,
    pub local: TierStats,
    pub remote: RemoteStats,
    pub sync: SyncStats,
    pub total_hits: u64,
    pub total_misses: u64,
    /// `total_hits / (total_hits + total_misses)`, 0.0 before any read
    pub hit_ratio: f64,
    pub online: bool,
}
