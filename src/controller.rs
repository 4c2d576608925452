use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::RegionId;
use crate::error::RollerResult;
use crate::wal::WalHandle;

/// Per-log scheduling state.
///
/// One controller exists per registered log. The control loop and any number
/// of requester threads mutate it concurrently, so both fields are atomics.
/// `needs_roll(now)` holds exactly when a roll was requested since the last
/// rotation attempt or the roll period has elapsed since it.
pub struct RollController {
    wal: Arc<dyn WalHandle>,
    roll_requested: AtomicBool,
    last_roll_millis: AtomicU64,
    roll_period_ms: u64,
}

impl RollController {
    pub(crate) fn new(wal: Arc<dyn WalHandle>, roll_period_ms: u64, now: u64) -> Arc<Self> {
        Arc::new(Self {
            wal,
            roll_requested: AtomicBool::new(false),
            last_roll_millis: AtomicU64::new(now),
            roll_period_ms,
        })
    }

    #[inline]
    pub fn wal(&self) -> &Arc<dyn WalHandle> {
        &self.wal
    }

    /// Mark this log as needing a roll. Idempotent, never blocks.
    pub fn request_roll(&self) {
        self.roll_requested.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_roll_requested(&self) -> bool {
        self.roll_requested.load(Ordering::Acquire)
    }

    /// True once the roll period has elapsed since the last rotation attempt.
    pub fn needs_periodic_roll(&self, now: u64) -> bool {
        now.saturating_sub(self.last_roll_millis.load(Ordering::Acquire)) > self.roll_period_ms
    }

    pub fn needs_roll(&self, now: u64) -> bool {
        self.is_roll_requested() || self.needs_periodic_roll(now)
    }

    #[inline]
    pub fn last_roll_millis(&self) -> u64 {
        self.last_roll_millis.load(Ordering::Acquire)
    }

    /// Rotate the underlying log, returning the regions to flush.
    ///
    /// The timestamp bump and flag clear happen before the blocking rotate
    /// call so a request arriving mid-rotation lands after the clear and
    /// survives for the next cycle. The timestamp moves even when the rotate
    /// fails; it governs the periodic schedule, not success.
    pub(crate) fn roll_wal(&self, now: u64) -> RollerResult<Vec<RegionId>> {
        self.last_roll_millis.store(now, Ordering::Release);
        self.roll_requested.store(false, Ordering::Release);
        self.wal.rotate(true)
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::ZERO)
        .as_millis() as u64
}
