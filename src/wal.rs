use std::fmt::{self, Display};
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::config::RegionId;
use crate::error::RollerResult;
use crate::roller::RollerShared;

/// Why a log asked for an out-of-schedule roll.
///
/// Reasons are observability context only; the roller treats every request
/// the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollReason {
    /// A write or sync error left the current writer unusable.
    Error,
    /// The write pipeline reported degraded replication.
    LowReplication,
    /// The current file exceeded its size threshold.
    Size,
    /// Syncs are completing too slowly on the current pipeline.
    SlowSync,
}

impl Display for RollReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollReason::Error => write!(f, "error"),
            RollReason::LowReplication => write!(f, "low_replication"),
            RollReason::Size => write!(f, "size"),
            RollReason::SlowSync => write!(f, "slow_sync"),
        }
    }
}

/// Trait for append-only log writers managed by the roller.
///
/// The roller never inspects log contents; it drives lifecycle operations
/// only. Implementations must tolerate these being called from the roller's
/// worker thread while appends continue on other threads.
pub trait WalHandle: Send + Sync {
    /// Stable name used in log output and worker-side bookkeeping.
    fn name(&self) -> &str;
    /// Switch to a new underlying file, returning the regions whose buffered
    /// data must now be flushed. May be empty.
    fn rotate(&self, force: bool) -> RollerResult<Vec<RegionId>>;
    /// Immediate, unrecoverable teardown. Not a graceful close: dependent
    /// writers blocked on this log must be released and see it as broken.
    fn shutdown(&self) -> RollerResult<()>;
    /// Install the roller-owned notifier the log invokes to request a roll.
    fn register_roll_listener(&self, listener: RollListener);
    /// Probe the write pipeline for degraded replication and request a roll
    /// if it is degraded, at most once per `min_interval_ms`. Logs without
    /// the capability keep the default no-op.
    fn check_low_replication(&self, min_interval_ms: u64) -> RollerResult<()> {
        let _ = min_interval_ms;
        Ok(())
    }
}

/// Roll-request notifier handed to a log at registration time.
///
/// The listener holds weak references back to the roller; once the roller
/// (or the log) is gone, invocations become no-ops. It does the minimum on
/// the caller's thread: look up the controller, set its request flag, wake
/// the control loop.
#[derive(Clone)]
pub struct RollListener {
    shared: Weak<RollerShared>,
    wal: Weak<dyn WalHandle>,
}

impl RollListener {
    pub(crate) fn new(shared: &Arc<RollerShared>, wal: &Arc<dyn WalHandle>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            wal: Arc::downgrade(wal),
        }
    }

    /// Request a roll of the log this listener was registered on.
    ///
    /// Callable from any thread, any number of times; never blocks beyond a
    /// brief acquisition of the roll monitor.
    pub fn roll_requested(&self, reason: RollReason) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let Some(wal) = self.wal.upgrade() else {
            return;
        };
        debug!(wal = wal.name(), reason = %reason, "WAL roll requested");
        shared.request_roll_for(&wal);
    }
}
