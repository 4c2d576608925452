//! Background rolling coordinator for append-only write-ahead logs.
//!
//! One named control loop serves every log registered with it: callers and
//! the logs themselves request rolls, a configured period forces them, and
//! degraded-replication probes can trigger them early. Rotations that report
//! flushable regions hand those ids to a host-supplied flush scheduler; a
//! failed rotation shuts every registered log down and escalates to the
//! host's abort hook rather than continuing in a degraded state.

pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod test_support;
pub mod wal;

mod roller;

pub use config::{RegionId, RollerConfig};
pub use controller::RollController;
pub use error::{RollerError, RollerResult};
pub use metrics::{RollerMetrics, RollerMetricsSnapshot};
pub use registry::{RollerRegistry, WalKey};
pub use wal::{RollListener, RollReason, WalHandle};

pub use roller::{Abortable, AfterRollHook, FlushScheduler, WalRoller};

/// Named metric sample produced by the roller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollerMetricSample {
    pub name: &'static str,
    pub value: u64,
}

/// Helper for exporting roller metrics snapshots with stable metric names.
#[derive(Debug, Clone, Copy)]
pub struct RollerMetricsExporter {
    snapshot: RollerMetricsSnapshot,
}

impl RollerMetricsExporter {
    pub fn new(snapshot: RollerMetricsSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn explicit_rolls(&self) -> u64 {
        self.snapshot.explicit_rolls
    }

    pub fn periodic_rolls(&self) -> u64 {
        self.snapshot.periodic_rolls
    }

    pub fn failed_rolls(&self) -> u64 {
        self.snapshot.failed_rolls
    }

    pub fn regions_scheduled(&self) -> u64 {
        self.snapshot.regions_scheduled
    }

    pub fn low_replication_check_failures(&self) -> u64 {
        self.snapshot.low_replication_check_failures
    }

    pub fn samples(&self) -> impl Iterator<Item = RollerMetricSample> {
        const METRIC_NAMES: [(&str, fn(&RollerMetricsSnapshot) -> u64); 5] = [
            ("wal_roller_explicit_rolls_total", |s| s.explicit_rolls),
            ("wal_roller_periodic_rolls_total", |s| s.periodic_rolls),
            ("wal_roller_failed_rolls_total", |s| s.failed_rolls),
            ("wal_roller_regions_scheduled_total", |s| s.regions_scheduled),
            ("wal_roller_low_replication_check_failures_total", |s| {
                s.low_replication_check_failures
            }),
        ];
        let snapshot = self.snapshot;
        METRIC_NAMES
            .into_iter()
            .map(move |(name, accessor)| RollerMetricSample {
                name,
                value: accessor(&snapshot),
            })
    }

    pub fn emit<F>(&self, mut writer: F)
    where
        F: FnMut(RollerMetricSample),
    {
        for sample in self.samples() {
            writer(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roller_metrics_exporter_emits_roll_counters() {
        let snapshot = RollerMetricsSnapshot {
            explicit_rolls: 4,
            periodic_rolls: 2,
            failed_rolls: 1,
            regions_scheduled: 9,
            low_replication_check_failures: 3,
        };
        let exporter = RollerMetricsExporter::new(snapshot);
        let metrics: Vec<_> = exporter.samples().collect();
        assert!(
            metrics
                .iter()
                .any(|m| m.name == "wal_roller_explicit_rolls_total" && m.value == 4)
        );
        assert!(
            metrics
                .iter()
                .any(|m| m.name == "wal_roller_regions_scheduled_total" && m.value == 9)
        );
        assert!(
            metrics
                .iter()
                .any(|m| m.name == "wal_roller_low_replication_check_failures_total"
                    && m.value == 3)
        );
    }
}
