//! Roll counters: an atomic block the worker updates in place, plus a plain
//! `Copy` snapshot for export.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default)]
pub struct RollerMetricsSnapshot {
    pub explicit_rolls: u64,
    pub periodic_rolls: u64,
    pub failed_rolls: u64,
    pub regions_scheduled: u64,
    pub low_replication_check_failures: u64,
}

#[derive(Default)]
pub struct RollerMetrics {
    explicit_rolls: AtomicU64,
    periodic_rolls: AtomicU64,
    failed_rolls: AtomicU64,
    regions_scheduled: AtomicU64,
    low_replication_check_failures: AtomicU64,
}

impl RollerMetrics {
    #[inline]
    pub fn incr_explicit_roll(&self) {
        self.explicit_rolls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn incr_periodic_roll(&self) {
        self.periodic_rolls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn incr_failed_roll(&self) {
        self.failed_rolls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_regions_scheduled(&self, regions: u64) {
        if regions > 0 {
            self.regions_scheduled.fetch_add(regions, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn incr_low_replication_check_failure(&self) {
        self.low_replication_check_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RollerMetricsSnapshot {
        RollerMetricsSnapshot {
            explicit_rolls: self.explicit_rolls.load(Ordering::Relaxed),
            periodic_rolls: self.periodic_rolls.load(Ordering::Relaxed),
            failed_rolls: self.failed_rolls.load(Ordering::Relaxed),
            regions_scheduled: self.regions_scheduled.load(Ordering::Relaxed),
            low_replication_check_failures: self
                .low_replication_check_failures
                .load(Ordering::Relaxed),
        }
    }
}
