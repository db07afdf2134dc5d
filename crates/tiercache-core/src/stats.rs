//! Hit/miss accounting per tier.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::OriginTier;

#[derive(Debug, Default)]
struct Counter {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counter {
    fn load(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Per-tier probe counters plus one hit-or-miss per `get()`.
#[derive(Debug, Default)]
pub struct StatsCollector {
    volatile: Counter,
    local: Counter,
    remote: Counter,
    total: Counter,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier(&self, tier: OriginTier) -> &Counter {
        match tier {
            OriginTier::Volatile => &self.volatile,
            OriginTier::Local => &self.local,
            OriginTier::Remote => &self.remote,
        }
    }

    /// A tier answered a lookup; also counts as an overall hit
    pub fn record_hit(&self, tier: OriginTier) {
        self.tier(tier).hits.fetch_add(1, Ordering::Relaxed);
        self.total.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A tier was probed and did not have the key
    pub fn record_tier_miss(&self, tier: OriginTier) {
        self.tier(tier).misses.fetch_add(1, Ordering::Relaxed);
    }

    /// No tier could serve the lookup
    pub fn record_miss(&self) {
        self.total.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// `(hits, misses)` for one tier
    pub fn tier_counts(&self, tier: OriginTier) -> (u64, u64) {
        self.tier(tier).load()
    }

    pub fn totals(&self) -> (u64, u64) {
        self.total.load()
    }

    pub fn hit_ratio(&self) -> f64 {
        let (hits, misses) = self.totals();
        let lookups = hits + misses;
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }

    pub fn reset(&self) {
        self.volatile.reset();
        self.local.reset();
        self.remote.reset();
        self.total.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = StatsCollector::new();
        assert_eq!(stats.hit_ratio(), 0.0);

        stats.record_hit(OriginTier::Volatile);
        stats.record_tier_miss(OriginTier::Volatile);
        stats.record_hit(OriginTier::Local);
        stats.record_tier_miss(OriginTier::Volatile);
        stats.record_tier_miss(OriginTier::Local);
        stats.record_miss();

        assert_eq!(stats.totals(), (2, 1));
        assert_eq!(stats.tier_counts(OriginTier::Volatile), (1, 2));
        assert_eq!(stats.tier_counts(OriginTier::Local), (1, 1));
        assert!((stats.hit_ratio() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let stats = StatsCollector::new();
        stats.record_hit(OriginTier::Remote);
        stats.reset();
        assert_eq!(stats.totals(), (0, 0));
        assert_eq!(stats.tier_counts(OriginTier::Remote), (0, 0));
    }
}
