use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::{bounded, unbounded};
use tempfile::TempDir;

use wal_roller::test_support::{
    RecordingAbortable, RecordingFlushScheduler, ScriptedWal, wait_for,
};
use wal_roller::{
    Abortable, FlushScheduler, RegionId, RollListener, RollReason, RollerConfig, RollerResult,
    WalHandle, WalRoller,
};

fn config_for_tests() -> RollerConfig {
    RollerConfig {
        roll_period_ms: 60_000,
        wake_frequency_ms: 25,
        low_replication_check_interval_ms: 1_000,
    }
}

fn roller_with(
    scheduler: Arc<dyn FlushScheduler>,
    abortable: Arc<dyn Abortable>,
) -> WalRoller {
    WalRoller::new("wal-roller-test", config_for_tests(), scheduler, abortable)
}

fn default_roller() -> WalRoller {
    roller_with(
        Arc::new(RecordingFlushScheduler::default()),
        Arc::new(RecordingAbortable::default()),
    )
}

#[test]
fn request_roll_all_rolls_every_registered_wal() {
    let roller = default_roller();
    let wals = [
        ScriptedWal::named("wal-0"),
        ScriptedWal::named("wal-1"),
        ScriptedWal::named("wal-2"),
    ];
    for wal in &wals {
        roller.add_wal(wal.clone());
    }
    roller.start().expect("start roller");

    roller.request_roll_all();
    wait_for(|| wals.iter().all(|wal| wal.rotate_calls() == 1));
    wait_for(|| roller.wal_roll_finished());

    for wal in &wals {
        assert_eq!(wal.rotate_calls(), 1, "each WAL rolls exactly once");
    }
    assert_eq!(roller.metrics().explicit_rolls, 3);
    roller.stop();
}

#[test]
fn wals_added_after_request_roll_all_are_unaffected() {
    let roller = default_roller();
    let early = ScriptedWal::named("wal-early");
    roller.add_wal(early.clone());
    roller.start().expect("start roller");

    roller.request_roll_all();
    let late = ScriptedWal::named("wal-late");
    roller.add_wal(late.clone());

    wait_for(|| early.rotate_calls() == 1);
    wait_for(|| roller.wal_roll_finished());
    assert_eq!(late.rotate_calls(), 0, "later registration is unaffected");
    roller.stop();
}

#[test]
fn listener_request_wakes_the_loop_and_rolls() {
    let roller = default_roller();
    let wal = ScriptedWal::named("wal-0");
    roller.add_wal(wal.clone());
    roller.start().expect("start roller");

    wal.fire_roll_request(RollReason::SlowSync);
    wait_for(|| wal.rotate_calls() == 1);
    wait_for(|| roller.wal_roll_finished());
    assert_eq!(roller.metrics().explicit_rolls, 1);
    roller.stop();
}

#[test]
fn roll_period_elapsing_triggers_a_periodic_roll() {
    let config = RollerConfig {
        roll_period_ms: 50,
        wake_frequency_ms: 25,
        low_replication_check_interval_ms: 1_000,
    };
    let roller = WalRoller::new(
        "wal-roller-test",
        config,
        Arc::new(RecordingFlushScheduler::default()),
        Arc::new(RecordingAbortable::default()),
    );
    let wal = ScriptedWal::named("wal-0");
    roller.add_wal(wal.clone());
    roller.start().expect("start roller");

    wait_for(|| wal.rotate_calls() >= 1);
    assert!(roller.metrics().periodic_rolls >= 1);
    roller.stop();
}

#[test]
fn rotation_regions_reach_the_flush_scheduler() {
    let scheduler = Arc::new(RecordingFlushScheduler::default());
    let roller = roller_with(scheduler.clone(), Arc::new(RecordingAbortable::default()));
    let wal = ScriptedWal::named("wal-0");
    wal.push_rotate_result(Ok(vec![
        RegionId::new("table-a,row-0"),
        RegionId::new("table-b,row-9"),
    ]));
    roller.add_wal(wal.clone());
    roller.start().expect("start roller");

    roller.request_roll_all();
    wait_for(|| scheduler.scheduled().len() == 2);

    let mut scheduled = scheduler.scheduled();
    scheduled.sort();
    assert_eq!(
        scheduled,
        vec![RegionId::new("table-a,row-0"), RegionId::new("table-b,row-9")]
    );
    assert_eq!(roller.metrics().regions_scheduled, 2);
    roller.stop();
}

#[test]
fn channel_scheduler_delivers_regions_to_a_flush_worker() {
    let (tx, rx) = unbounded::<RegionId>();
    let roller = roller_with(Arc::new(tx), Arc::new(RecordingAbortable::default()));
    let wal = ScriptedWal::named("wal-0");
    wal.push_rotate_result(Ok(vec![RegionId::new("r-0"), RegionId::new("r-1")]));
    roller.add_wal(wal.clone());
    roller.start().expect("start roller");

    roller.request_roll_all();
    let mut received = Vec::new();
    for _ in 0..2 {
        received.push(
            rx.recv_timeout(std::time::Duration::from_secs(4))
                .expect("region delivered"),
        );
    }
    received.sort();
    assert_eq!(received, vec![RegionId::new("r-0"), RegionId::new("r-1")]);
    roller.stop();
}

#[test]
fn full_flush_channel_drops_regions_instead_of_blocking() {
    let (tx, rx) = bounded::<RegionId>(1);
    let roller = roller_with(Arc::new(tx), Arc::new(RecordingAbortable::default()));
    let wal = ScriptedWal::named("wal-0");
    wal.push_rotate_result(Ok(vec![RegionId::new("r-0"), RegionId::new("r-1")]));
    roller.add_wal(wal.clone());
    roller.start().expect("start roller");

    roller.request_roll_all();
    wait_for(|| roller.wal_roll_finished());

    assert_eq!(rx.try_iter().count(), 1, "overflow region is dropped");
    assert_eq!(wal.rotate_calls(), 1, "roller is not stalled by the channel");
    roller.stop();
}

#[test]
fn wait_until_wal_roll_finished_returns_after_quiesce() {
    let roller = default_roller();
    let wal = ScriptedWal::named("wal-0");
    roller.add_wal(wal.clone());
    roller.start().expect("start roller");

    roller.request_roll_all();
    roller.wait_until_wal_roll_finished();
    assert_eq!(wal.rotate_calls(), 1);
    assert!(roller.wal_roll_finished());
    roller.stop();
}

/// Minimal file-backed log: one open segment file, rotation closes it and
/// creates the next one.
struct FileWal {
    name: String,
    dir: PathBuf,
    next_index: AtomicU32,
    current: Mutex<Option<File>>,
}

impl FileWal {
    fn open(dir: &Path) -> RollerResult<Arc<Self>> {
        let wal = Arc::new(Self {
            name: "file-wal".to_string(),
            dir: dir.to_path_buf(),
            next_index: AtomicU32::new(0),
            current: Mutex::new(None),
        });
        wal.open_next_segment()?;
        Ok(wal)
    }

    fn open_next_segment(&self) -> RollerResult<()> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("{}-{index:06}.log", self.name));
        let mut file = File::create(path)?;
        writeln!(file, "segment {index}")?;
        *self.current.lock().unwrap() = Some(file);
        Ok(())
    }

    fn segment_count(&self) -> usize {
        fs::read_dir(&self.dir).map(|dir| dir.count()).unwrap_or(0)
    }
}

impl WalHandle for FileWal {
    fn name(&self) -> &str {
        &self.name
    }

    fn rotate(&self, _force: bool) -> RollerResult<Vec<RegionId>> {
        self.current.lock().unwrap().take();
        self.open_next_segment()?;
        Ok(Vec::new())
    }

    fn shutdown(&self) -> RollerResult<()> {
        self.current.lock().unwrap().take();
        Ok(())
    }

    fn register_roll_listener(&self, _listener: RollListener) {}
}

#[test]
fn file_backed_wal_rotates_into_a_new_segment() {
    let tmp = TempDir::new().expect("create temp dir");
    let wal = FileWal::open(tmp.path()).expect("open file wal");
    assert_eq!(wal.segment_count(), 1);

    let roller = default_roller();
    roller.add_wal(wal.clone());
    roller.start().expect("start roller");

    roller.request_roll_all();
    wait_for(|| wal.segment_count() == 2);
    wait_for(|| roller.wal_roll_finished());
    roller.stop();
}
