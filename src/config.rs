use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Default interval between periodic rolls of a registered log (milliseconds).
///
/// One hour. A log that has seen no explicit roll request is still rotated
/// once this much time has passed since its last rotation attempt, bounding
/// how much data any single underlying file can accumulate.
const DEFAULT_ROLL_PERIOD_MS: u64 = 60 * 60 * 1000; // 1 hour

/// Default upper bound on how long the control loop sleeps between cycles
/// (milliseconds).
///
/// The loop is woken early by roll requests and registrations; the wake
/// frequency only caps how stale a purely time-driven decision can get.
const DEFAULT_WAKE_FREQUENCY_MS: u64 = 10 * 1000; // 10 seconds

/// Default minimum interval between low-replication probes per log
/// (milliseconds).
///
/// Passed through to the log handle, which rate-limits its own pipeline
/// inspection against this value.
const DEFAULT_LOW_REPLICATION_CHECK_INTERVAL_MS: u64 = 30 * 1000; // 30 seconds

/// Identifier for a unit of in-memory state whose buffered data must be
/// flushed after a rotation.
///
/// Region ids are opaque to the roller; they are produced by a log handle's
/// rotate call and forwarded verbatim to the flush-scheduling collaborator.
///
/// # Example
///
/// ```rust
/// use wal_roller::RegionId;
///
/// let region = RegionId::new("table,row-0001");
/// assert_eq!(region.as_str(), "table,row-0001");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Creates a new region ID from any string-like value.
    #[inline]
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    /// Returns the region ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RegionId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RegionId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Configuration surface for a roller instance.
///
/// All three tunables are durations in milliseconds. Invalid (zero) values
/// are replaced with defaults by [`RollerConfig::normalized`], which should be
/// called after loading configuration from external sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollerConfig {
    /// Interval after which an un-requested log is rotated anyway.
    ///
    /// Measured against the last rotation attempt, successful or not; the
    /// period governs the schedule, not rotation success.
    pub roll_period_ms: u64,

    /// Upper bound on one control-loop sleep.
    ///
    /// Also bounds how long a stop request can go unobserved while the loop
    /// is idle.
    pub wake_frequency_ms: u64,

    /// Minimum interval between low-replication probes of a single log.
    ///
    /// Forwarded to the handle's `check_low_replication`; handles without the
    /// capability ignore it.
    pub low_replication_check_interval_ms: u64,
}

impl Default for RollerConfig {
    fn default() -> Self {
        Self {
            roll_period_ms: DEFAULT_ROLL_PERIOD_MS,
            wake_frequency_ms: DEFAULT_WAKE_FREQUENCY_MS,
            low_replication_check_interval_ms: DEFAULT_LOW_REPLICATION_CHECK_INTERVAL_MS,
        }
    }
}

impl RollerConfig {
    /// Returns a copy of the configuration with degenerate values replaced.
    ///
    /// A zero period or interval would spin the loop or divide the schedule
    /// into nothing; each zero field falls back to its default.
    pub fn normalized(mut self) -> Self {
        if self.roll_period_ms == 0 {
            self.roll_period_ms = DEFAULT_ROLL_PERIOD_MS;
        }
        if self.wake_frequency_ms == 0 {
            self.wake_frequency_ms = DEFAULT_WAKE_FREQUENCY_MS;
        }
        if self.low_replication_check_interval_ms == 0 {
            self.low_replication_check_interval_ms = DEFAULT_LOW_REPLICATION_CHECK_INTERVAL_MS;
        }
        self
    }
}

impl Display for RollerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RollerConfig(roll_period_ms={}, wake_frequency_ms={}, low_replication_check_interval_ms={})",
            self.roll_period_ms, self.wake_frequency_ms, self.low_replication_check_interval_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_tunables() {
        let config = RollerConfig::default();
        assert_eq!(config.roll_period_ms, 3_600_000);
        assert_eq!(config.wake_frequency_ms, 10_000);
        assert_eq!(config.low_replication_check_interval_ms, 30_000);
    }

    #[test]
    fn normalized_replaces_zero_fields() {
        let config = RollerConfig {
            roll_period_ms: 0,
            wake_frequency_ms: 0,
            low_replication_check_interval_ms: 0,
        }
        .normalized();
        assert_eq!(config, RollerConfig::default());

        let tuned = RollerConfig {
            roll_period_ms: 1_000,
            wake_frequency_ms: 50,
            low_replication_check_interval_ms: 25,
        }
        .normalized();
        assert_eq!(tuned.roll_period_ms, 1_000);
        assert_eq!(tuned.wake_frequency_ms, 50);
        assert_eq!(tuned.low_replication_check_interval_ms, 25);
    }

    #[test]
    fn config_serde_round_trip() {
        let config = RollerConfig {
            roll_period_ms: 120_000,
            wake_frequency_ms: 500,
            low_replication_check_interval_ms: 5_000,
        };
        let encoded = serde_json::to_string(&config).expect("serialize config");
        let decoded: RollerConfig = serde_json::from_str(&encoded).expect("deserialize config");
        assert_eq!(decoded, config);
    }

    #[test]
    fn region_id_serde_is_transparent() {
        let region = RegionId::new("meta,,1");
        let encoded = serde_json::to_string(&region).expect("serialize region id");
        assert_eq!(encoded, "\"meta,,1\"");
        let decoded: RegionId = serde_json::from_str(&encoded).expect("deserialize region id");
        assert_eq!(decoded, region);
    }
}
