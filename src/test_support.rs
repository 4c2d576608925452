//! Scripted fakes and polling helpers shared by unit and integration tests.
//!
//! Nothing here is used on production paths; the module is exported so the
//! `tests/` suites can drive the roller against deterministic log handles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::RegionId;
use crate::error::{RollerError, RollerResult};
use crate::roller::{Abortable, FlushScheduler};
use crate::wal::{RollListener, RollReason, WalHandle};

/// Deterministic log handle with scripted rotate/shutdown outcomes.
///
/// Rotations pop scripted results front-to-back; once the script is empty
/// they succeed with no regions. Counters record every lifecycle call.
pub struct ScriptedWal {
    name: String,
    rotate_calls: AtomicU32,
    rotate_results: Mutex<VecDeque<RollerResult<Vec<RegionId>>>>,
    shutdown_calls: AtomicU32,
    shutdown_error: Mutex<Option<RollerError>>,
    low_replication_checks: AtomicU32,
    low_replication_error: Mutex<Option<RollerError>>,
    listener_registrations: AtomicU32,
    listener: Mutex<Option<RollListener>>,
}

impl ScriptedWal {
    pub fn named(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            rotate_calls: AtomicU32::new(0),
            rotate_results: Mutex::new(VecDeque::new()),
            shutdown_calls: AtomicU32::new(0),
            shutdown_error: Mutex::new(None),
            low_replication_checks: AtomicU32::new(0),
            low_replication_error: Mutex::new(None),
            listener_registrations: AtomicU32::new(0),
            listener: Mutex::new(None),
        })
    }

    /// Queue the outcome of the next un-scripted rotation.
    pub fn push_rotate_result(&self, result: RollerResult<Vec<RegionId>>) {
        self.rotate_results.lock().push_back(result);
    }

    /// Make the next shutdown call fail with `err`.
    pub fn fail_shutdown(&self, err: RollerError) {
        *self.shutdown_error.lock() = Some(err);
    }

    /// Make the next low-replication probe fail with `err`.
    pub fn fail_low_replication_check(&self, err: RollerError) {
        *self.low_replication_error.lock() = Some(err);
    }

    /// Invoke the registered roll listener, as a log would when its own
    /// thresholds trip.
    pub fn fire_roll_request(&self, reason: RollReason) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.roll_requested(reason);
        }
    }

    pub fn rotate_calls(&self) -> u32 {
        self.rotate_calls.load(Ordering::Relaxed)
    }

    pub fn shutdown_calls(&self) -> u32 {
        self.shutdown_calls.load(Ordering::Relaxed)
    }

    pub fn low_replication_checks(&self) -> u32 {
        self.low_replication_checks.load(Ordering::Relaxed)
    }

    pub fn listener_registrations(&self) -> u32 {
        self.listener_registrations.load(Ordering::Relaxed)
    }
}

impl WalHandle for ScriptedWal {
    fn name(&self) -> &str {
        &self.name
    }

    fn rotate(&self, _force: bool) -> RollerResult<Vec<RegionId>> {
        self.rotate_calls.fetch_add(1, Ordering::Relaxed);
        self.rotate_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn shutdown(&self) -> RollerResult<()> {
        self.shutdown_calls.fetch_add(1, Ordering::Relaxed);
        match self.shutdown_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn register_roll_listener(&self, listener: RollListener) {
        self.listener_registrations.fetch_add(1, Ordering::Relaxed);
        *self.listener.lock() = Some(listener);
    }

    fn check_low_replication(&self, _min_interval_ms: u64) -> RollerResult<()> {
        self.low_replication_checks.fetch_add(1, Ordering::Relaxed);
        match self.low_replication_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Flush collaborator that records every scheduled region.
#[derive(Default)]
pub struct RecordingFlushScheduler {
    regions: Mutex<Vec<RegionId>>,
}

impl RecordingFlushScheduler {
    /// Regions scheduled so far, in call order.
    pub fn scheduled(&self) -> Vec<RegionId> {
        self.regions.lock().clone()
    }

    /// Drain and return the recorded regions.
    pub fn take(&self) -> Vec<RegionId> {
        std::mem::take(&mut *self.regions.lock())
    }
}

impl FlushScheduler for RecordingFlushScheduler {
    fn schedule_flush(&self, region: RegionId) {
        self.regions.lock().push(region);
    }
}

/// Abort hook that records invocations instead of killing anything.
#[derive(Default)]
pub struct RecordingAbortable {
    aborts: AtomicU32,
    last_reason: Mutex<Option<String>>,
    last_cause: Mutex<Option<String>>,
}

impl RecordingAbortable {
    pub fn aborts(&self) -> u32 {
        self.aborts.load(Ordering::Relaxed)
    }

    pub fn last_reason(&self) -> Option<String> {
        self.last_reason.lock().clone()
    }

    pub fn last_cause(&self) -> Option<String> {
        self.last_cause.lock().clone()
    }
}

impl Abortable for RecordingAbortable {
    fn abort(&self, reason: &str, cause: &RollerError) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
        *self.last_reason.lock() = Some(reason.to_string());
        *self.last_cause.lock() = Some(cause.to_string());
    }
}

/// Spin until `predicate` holds, sleeping 20 ms between probes. Panics after
/// four seconds.
pub fn wait_for<F>(mut predicate: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if predicate() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("condition not reached within timeout");
}
