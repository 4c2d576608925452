//! The rolling control loop shared by every registered log.
//!
//! One named worker thread cycles through three phases: probe logs for
//! degraded replication, sleep on the roll monitor until something needs
//! rolling (or the wake frequency elapses), then rotate every due log and
//! hand returned regions to the flush collaborator. Rotation runs outside
//! the monitor, so registration and roll requests never wait on slow I/O.
//! A rotation failure is fatal: the loop shuts every log down, invokes the
//! host's abort hook, and terminates.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{RegionId, RollerConfig};
use crate::controller::{RollController, now_millis};
use crate::error::{RollerError, RollerResult};
use crate::metrics::{RollerMetrics, RollerMetricsSnapshot};
use crate::registry::{RollerRegistry, WalKey};
use crate::wal::{RollListener, WalHandle};

/// Poll interval for [`WalRoller::wait_until_wal_roll_finished`].
const ROLL_FINISH_POLL_MS: u64 = 100;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_WAITING: u8 = 2;
const STATE_ABORTING: u8 = 3;
const STATE_STOPPED: u8 = 4;

/// Flush-scheduling collaborator.
///
/// Invoked once per region id returned by a rotation. Implementations must
/// not block the roller's worker; hand the id off and return.
pub trait FlushScheduler: Send + Sync {
    fn schedule_flush(&self, region: RegionId);
}

/// Non-blocking channel adapter: regions are handed to a flush worker on the
/// other end. A full or disconnected channel drops the request with a warning
/// rather than stalling the roller.
impl FlushScheduler for Sender<RegionId> {
    fn schedule_flush(&self, region: RegionId) {
        match self.try_send(region) {
            Ok(()) => {}
            Err(TrySendError::Full(region)) => {
                warn!(region = %region, "flush channel full, dropping flush request");
            }
            Err(TrySendError::Disconnected(region)) => {
                warn!(region = %region, "flush channel closed, dropping flush request");
            }
        }
    }
}

/// Owning-process abort hook, assumed terminal for the process once invoked.
pub trait Abortable: Send + Sync {
    fn abort(&self, reason: &str, cause: &RollerError);
}

/// Bookkeeping hook invoked after each successful rotation. A hook error is
/// treated exactly like a rotation error.
pub type AfterRollHook = Box<dyn Fn(&Arc<dyn WalHandle>) -> RollerResult<()> + Send + Sync>;

/// Monitor dedicated to roll signaling. Guards structural registry changes
/// and the loop's sleep decision; nothing else shares it.
struct RollMonitor {
    lock: Mutex<()>,
    cond: Condvar,
}

pub(crate) struct RollerShared {
    name: String,
    config: RollerConfig,
    registry: RollerRegistry,
    monitor: RollMonitor,
    running: AtomicBool,
    state: AtomicU8,
    metrics: RollerMetrics,
    scheduler: Arc<dyn FlushScheduler>,
    abortable: Arc<dyn Abortable>,
    after_roll: Mutex<Option<AfterRollHook>>,
}

impl RollerShared {
    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn store_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }

    /// Entry point of the listener path: find (or re-create) the controller
    /// for `wal`, flag it, and wake the loop, all under the roll monitor.
    pub(crate) fn request_roll_for(self: &Arc<Self>, wal: &Arc<dyn WalHandle>) {
        let key = WalKey::of(wal);
        let guard = self.monitor.lock.lock();
        let controller = self.registry.get_or_insert_with(key, || {
            RollController::new(wal.clone(), self.config.roll_period_ms, now_millis())
        });
        controller.request_roll();
        self.monitor.cond.notify_all();
        drop(guard);
    }

    fn any_needs_roll(&self, now: u64) -> bool {
        self.registry
            .snapshot()
            .iter()
            .any(|(_, controller)| controller.needs_roll(now))
    }

    fn run(self: Arc<Self>) {
        info!(roller = %self.name, config = %self.config, "WAL roller starting");
        self.store_state(STATE_RUNNING);
        while self.running.load(Ordering::Acquire) {
            let now = now_millis();
            self.check_low_replication(now);

            {
                let mut guard = self.monitor.lock.lock();
                if !self.any_needs_roll(now) {
                    self.store_state(STATE_WAITING);
                    let _ = self.monitor.cond.wait_for(
                        &mut guard,
                        Duration::from_millis(self.config.wake_frequency_ms),
                    );
                    self.store_state(STATE_RUNNING);
                    continue;
                }
            }

            if let Err(err) = self.roll_due_wals(now) {
                self.metrics.incr_failed_roll();
                self.store_state(STATE_ABORTING);
                self.escalate(err);
                return;
            }
        }
        self.store_state(STATE_STOPPED);
        debug!(roller = %self.name, "WAL roller exiting");
    }

    /// Best-effort low-replication pass. Logs already due for a roll are
    /// skipped; a failing probe is logged and never stops the loop or the
    /// remaining probes.
    fn check_low_replication(&self, now: u64) {
        let entries = self.registry.snapshot();
        for (_, controller) in entries.iter() {
            if controller.needs_roll(now) {
                continue;
            }
            let wal = controller.wal();
            if let Err(err) =
                wal.check_low_replication(self.config.low_replication_check_interval_ms)
            {
                self.metrics.incr_low_replication_check_failure();
                warn!(
                    roller = %self.name,
                    wal = wal.name(),
                    error = %err,
                    "low-replication check failed"
                );
            }
        }
    }

    fn roll_due_wals(&self, now: u64) -> RollerResult<()> {
        let entries = self.registry.snapshot();
        for (_, controller) in entries.iter() {
            if controller.is_roll_requested() {
                debug!(roller = %self.name, wal = controller.wal().name(), "rolling WAL on request");
                self.metrics.incr_explicit_roll();
            } else if controller.needs_periodic_roll(now) {
                debug!(
                    roller = %self.name,
                    wal = controller.wal().name(),
                    period_ms = self.config.roll_period_ms,
                    "roll period elapsed, rolling WAL"
                );
                self.metrics.incr_periodic_roll();
            } else {
                continue;
            }

            let regions = controller.roll_wal(now)?;
            self.metrics.add_regions_scheduled(regions.len() as u64);
            for region in regions {
                self.scheduler.schedule_flush(region);
            }
            if let Some(hook) = self.after_roll.lock().as_ref() {
                hook(controller.wal())?;
            }
        }
        Ok(())
    }

    /// Fatal-error path: classify the cause, shut every log down, then hand
    /// control to the host's abort hook.
    fn escalate(&self, err: RollerError) {
        let cause = err.root_cause();
        let reason = if matches!(cause, RollerError::CloseFailed(_)) || cause.is_connection() {
            "failed log close in WAL roller"
        } else if matches!(cause, RollerError::Io(_)) {
            "I/O error in WAL roller"
        } else {
            "WAL rolling failed"
        };
        error!(roller = %self.name, error = %cause, "{}", reason);
        self.shutdown_all_wals();
        self.abortable.abort(reason, &cause);
    }

    /// Shut down every registered log so writers blocked on a broken log are
    /// released into their recovery path. Failures are contained per handle.
    fn shutdown_all_wals(&self) {
        let entries = self.registry.snapshot();
        for (_, controller) in entries.iter() {
            let wal = controller.wal();
            if let Err(err) = wal.shutdown() {
                warn!(
                    roller = %self.name,
                    wal = wal.name(),
                    error = %err,
                    "failed to shut down WAL"
                );
            }
        }
    }

    fn wal_roll_finished(&self) -> bool {
        !self.any_needs_roll(now_millis()) && self.state() == STATE_WAITING
    }
}

/// Shared rolling coordinator for a set of append-only logs.
///
/// Hosts construct one roller per log group, register logs with
/// [`WalRoller::add_wal`], and drive it with [`WalRoller::start`] /
/// [`WalRoller::stop`]. All public operations are safe to call from any
/// thread.
pub struct WalRoller {
    shared: Arc<RollerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WalRoller {
    /// Create a roller with the given collaborators. The name becomes the
    /// worker thread's name and tags every log line.
    pub fn new(
        name: impl Into<String>,
        config: RollerConfig,
        scheduler: Arc<dyn FlushScheduler>,
        abortable: Arc<dyn Abortable>,
    ) -> Self {
        Self {
            shared: Arc::new(RollerShared {
                name: name.into(),
                config: config.normalized(),
                registry: RollerRegistry::new(),
                monitor: RollMonitor {
                    lock: Mutex::new(()),
                    cond: Condvar::new(),
                },
                running: AtomicBool::new(false),
                state: AtomicU8::new(STATE_IDLE),
                metrics: RollerMetrics::default(),
                scheduler,
                abortable,
                after_roll: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &RollerConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &RollerRegistry {
        &self.shared.registry
    }

    pub fn metrics(&self) -> RollerMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Install the after-roll bookkeeping hook. Intended to be set once,
    /// before [`WalRoller::start`]; replaces any previous hook.
    pub fn set_after_roll(&self, hook: AfterRollHook) {
        *self.shared.after_roll.lock() = Some(hook);
    }

    /// Register a log with this roller. Registering the same handle again is
    /// a no-op; the common case returns without taking the monitor.
    ///
    /// The listener is attached outside the monitor so a handle that fires
    /// it synchronously during attachment cannot deadlock against the lock.
    pub fn add_wal(&self, wal: Arc<dyn WalHandle>) {
        let key = WalKey::of(&wal);
        if self.shared.registry.contains(key) {
            return;
        }
        let inserted = {
            let _guard = self.shared.monitor.lock.lock();
            let controller = RollController::new(
                wal.clone(),
                self.shared.config.roll_period_ms,
                now_millis(),
            );
            self.shared.registry.insert_if_absent(key, controller)
        };
        if inserted {
            wal.register_roll_listener(RollListener::new(&self.shared, &wal));
        }
    }

    /// Flag every currently-registered log and wake the loop once. Logs
    /// registered afterwards are unaffected.
    pub fn request_roll_all(&self) {
        let guard = self.shared.monitor.lock.lock();
        for controller in self.shared.registry.controllers() {
            controller.request_roll();
        }
        self.shared.monitor.cond.notify_all();
        drop(guard);
    }

    /// True when no registered log needs a roll and the loop is parked on
    /// the monitor. Point-in-time answer with bounded staleness.
    pub fn wal_roll_finished(&self) -> bool {
        self.shared.wal_roll_finished()
    }

    /// Block until [`WalRoller::wal_roll_finished`] holds, polling every
    /// 100 ms. Convenience for quiesce points, not a synchronization
    /// primitive.
    pub fn wait_until_wal_roll_finished(&self) {
        while !self.wal_roll_finished() {
            thread::sleep(Duration::from_millis(ROLL_FINISH_POLL_MS));
        }
    }

    /// Spawn the worker thread. Fails if the roller was already started.
    pub fn start(&self) -> RollerResult<()> {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return Err(RollerError::invalid_state("WAL roller already started"));
        }
        self.shared.running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || shared.run())
            .map_err(|err| RollerError::other(format!("failed to spawn roller thread: {err}")))?;
        *slot = Some(handle);
        Ok(())
    }

    /// Stop the loop and join the worker. Idempotent; wakes a parked loop so
    /// the stop is observed promptly.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        {
            let _guard = self.shared.monitor.lock.lock();
            self.shared.monitor.cond.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WalRoller {
    fn drop(&mut self) {
        self.stop();
    }
}
