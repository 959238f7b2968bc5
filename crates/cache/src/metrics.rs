//! Hit and miss counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Which tier served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// In-memory, most recently used.
    Hot,
    /// In-memory, bounded with expiry.
    Warm,
    /// On disk.
    Cold,
}

/// Lock-free counters updated on every cache operation.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hot_hits: AtomicU64,
    warm_hits: AtomicU64,
    cold_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    disk_errors: AtomicU64,
}

impl CacheMetrics {
    pub(crate) fn record_hit(&self, tier: Tier) {
        let counter = match tier {
            Tier::Hot => &self.hot_hits,
            Tier::Warm => &self.warm_hits,
            Tier::Cold => &self.cold_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidations(&self, count: usize) {
        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_error(&self) {
        self.disk_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.hot_hits,
            &self.warm_hits,
            &self.cold_hits,
            &self.misses,
            &self.writes,
            &self.evictions,
            &self.invalidations,
            &self.disk_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            warm_hits: self.warm_hits.load(Ordering::Relaxed),
            cold_hits: self.cold_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            disk_errors: self.disk_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Reads served by the hot tier.
    pub hot_hits: u64,
    /// Reads served by the warm tier.
    pub warm_hits: u64,
    /// Reads served from disk.
    pub cold_hits: u64,
    /// Reads that found nothing servable.
    pub misses: u64,
    /// Values stored.
    pub writes: u64,
    /// Entries evicted for capacity.
    pub evictions: u64,
    /// Entries marked invalid.
    pub invalidations: u64,
    /// Disk reads or writes that failed.
    pub disk_errors: u64,
}

impl MetricsSnapshot {
    /// Reads served by any tier.
    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.hot_hits + self.warm_hits + self.cold_hits
    }

    /// All reads.
    #[must_use]
    pub const fn lookups(&self) -> u64 {
        self.hits() + self.misses
    }

    /// Fraction of reads served by any tier, 0 when nothing was read.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits(), self.lookups())
    }

    /// Fraction of reads served by the hot tier, 0 when nothing was read.
    #[must_use]
    pub fn hot_hit_rate(&self) -> f64 {
        ratio(self.hot_hits, self.lookups())
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let metrics = CacheMetrics::default();
        assert!(metrics.snapshot().hit_rate().abs() < f64::EPSILON);

        metrics.record_hit(Tier::Hot);
        metrics.record_hit(Tier::Warm);
        metrics.record_hit(Tier::Cold);
        metrics.record_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits(), 3);
        assert!((snapshot.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert!((snapshot.hot_hit_rate() - 0.25).abs() < f64::EPSILON);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
