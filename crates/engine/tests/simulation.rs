//! End-to-end job runs under simulated time.

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synthload_clock::{LogicalClock, TimeMode};
use synthload_dist::Sampler;
use synthload_engine::{
    JobConfig, JobDriver, JobStatus, RunCoordinator, SinkErrorPolicy, Termination, TimeConfig,
    WorkloadConfig,
};
use synthload_engine::spawner::SpawnController;
use synthload_schema::StateGraph;
use synthload_sink::{Sink, SinkError, TargetConfig};

/// A self-looping single state emitting one counter field per visit.
const LOOP_WORKLOAD: &str = r#"{
    "interarrival": {"type": "constant", "value": 1},
    "emitters": [{
        "name": "basic",
        "dimensions": [{"type": "counter", "name": "seq"}]
    }],
    "states": [{
        "name": "only",
        "emitter": "basic",
        "delay": {"type": "constant", "value": 0},
        "transitions": [{"next": "only", "probability": 1.0}]
    }]
}"#;

fn workload(json: &str) -> WorkloadConfig {
    WorkloadConfig::from_value(&serde_json::from_str(json).unwrap()).unwrap()
}

fn file_job(json: &str, dir: &Path) -> (JobConfig, PathBuf) {
    let out = dir.join("records.jsonl");
    let config = JobConfig::new(
        "test",
        workload(json),
        TargetConfig::File { path: out.clone() },
    );
    (config, out)
}

fn read_records(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn record_time(record: &serde_json::Value, field: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(
        record[field].as_str().unwrap(),
        "%Y-%m-%dT%H:%M:%S%.3f",
    )
    .unwrap()
}

#[test]
fn test_record_target_emits_exactly_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let (config, out) = file_job(LOOP_WORKLOAD, dir.path());
    let config = config
        .with_termination(Termination::Records(5))
        .with_max_entities(1)
        .with_time(TimeConfig::simulated())
        .with_seed(42);

    let driver = JobDriver::new(config).unwrap();
    driver.run().unwrap();

    let records = read_records(&out);
    assert_eq!(records.len(), 5);

    // A single actor with a zero dwell and a counter field: sequential
    // values, non-decreasing timestamps.
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record["seq"].as_str().unwrap(), i.to_string());
    }
    let times: Vec<_> = records.iter().map(|r| record_time(r, "time")).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    let report = driver.report();
    assert_eq!(report.status, JobStatus::Complete);
    assert_eq!(report.total_records, 5);
    assert_eq!(report.active_entities, 0);
}

#[test]
fn test_deadline_bounds_record_timestamps() {
    let start = chrono::DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);

    let dir = tempfile::tempdir().unwrap();
    let looping_with_dwell = LOOP_WORKLOAD.replace(r#""value": 0"#, r#""value": 1"#);
    let (config, out) = file_job(&looping_with_dwell, dir.path());
    let config = config
        .with_termination(Termination::Duration(10.0))
        .with_max_entities(2)
        .with_time(TimeConfig::simulated_from(start))
        .with_seed(7);

    let driver = JobDriver::new(config).unwrap();
    driver.run().unwrap();

    let records = read_records(&out);
    assert!(!records.is_empty());

    // No record lands more than the deadline past the start, give or take
    // one in-flight dwell.
    let limit = start.naive_utc() + chrono::Duration::seconds(11);
    for record in &records {
        assert!(record_time(record, "time") <= limit);
    }

    let report = driver.report();
    assert_eq!(report.status, JobStatus::Complete);
    assert_eq!(report.active_entities, 0);
}

#[test]
fn test_terminate_releases_sleeping_units() {
    let dir = tempfile::tempdir().unwrap();
    let parked = LOOP_WORKLOAD.replace(r#""value": 0"#, r#""value": 100000"#);
    let (config, _out) = file_job(&parked, dir.path());
    let config = config
        .with_max_entities(4)
        .with_time(TimeConfig::simulated())
        .with_seed(3);

    let driver = Arc::new(JobDriver::new(config).unwrap());
    let runner = {
        let driver = driver.clone();
        std::thread::spawn(move || driver.run().unwrap())
    };

    // Wait until at least one actor has emitted and gone to sleep, then
    // terminate out from under everything.
    while driver.report().total_records == 0 {
        std::thread::sleep(Duration::from_millis(5));
    }
    driver.terminate();
    runner.join().unwrap();

    let report = driver.report();
    assert_eq!(report.status, JobStatus::Complete);
    assert_eq!(report.active_entities, 0);
}

#[test]
fn test_replay_cycles_until_target() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.jsonl");
    let mut file = std::fs::File::create(&source).unwrap();
    for (ts, v) in [(1000u64, "a"), (3000, "b"), (4500, "c")] {
        writeln!(file, r#"{{"ts": {ts}, "label": "{v}"}}"#).unwrap();
    }
    drop(file);

    let out = dir.path().join("records.jsonl");
    let replay = format!(
        r#"{{
            "type": "replay",
            "source_file": {source:?},
            "time_field": "ts",
            "time_format": "millis"
        }}"#,
        source = source.display().to_string(),
    );
    let config = JobConfig::new(
        "replay-test",
        workload(&replay),
        TargetConfig::File { path: out.clone() },
    )
    .with_termination(Termination::Records(5))
    .with_time(TimeConfig::simulated())
    .with_seed(9);

    let driver = JobDriver::new(config).unwrap();
    driver.run().unwrap();

    let records = read_records(&out);
    assert_eq!(records.len(), 5);

    // The source cycles a,b,c,a,b and every timestamp is rewritten to the
    // simulated clock, preserving the source cadence (0s, 2s, 1.5s, ...).
    let labels: Vec<_> = records
        .iter()
        .map(|r| r["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["a", "b", "c", "a", "b"]);
    let times: Vec<_> = records.iter().map(|r| record_time(r, "ts")).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!((times[1] - times[0]).num_milliseconds(), 2000);
}

/// Sink that tracks the maximum live-entity count observed at delivery
/// time.
struct WatchSink {
    coordinator: Arc<RunCoordinator>,
    max_live: AtomicU64,
    records: Mutex<Vec<String>>,
}

impl Sink for WatchSink {
    fn accept(&self, record: &str) -> Result<(), SinkError> {
        self.max_live
            .fetch_max(self.coordinator.entity_count(), Ordering::SeqCst);
        self.records.lock().push(record.to_string());
        Ok(())
    }
}

#[test]
fn test_concurrency_cap_is_never_exceeded() {
    let cap = 3usize;
    let clock = Arc::new(LogicalClock::new(TimeMode::Simulated));
    let coordinator = Arc::new(RunCoordinator::new(clock.clone(), Termination::Records(60)));
    let sink = Arc::new(WatchSink {
        coordinator: coordinator.clone(),
        max_live: AtomicU64::new(0),
        records: Mutex::new(Vec::new()),
    });

    let generator = match workload(&LOOP_WORKLOAD.replace(r#""value": 0"#, r#""value": 1"#)) {
        WorkloadConfig::Generator(g) => g,
        WorkloadConfig::Replay(_) => unreachable!(),
    };
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let graph = Arc::new(StateGraph::build(&generator, &mut rng).unwrap());

    let spawner = SpawnController::new(
        graph,
        clock.clone(),
        coordinator.clone(),
        sink.clone(),
        SinkErrorPolicy::Continue,
        Sampler::constant(0.0),
        cap,
        ChaCha8Rng::seed_from_u64(2),
    );

    let waiter = {
        let coordinator = coordinator.clone();
        std::thread::spawn(move || coordinator.await_completion())
    };
    for actor in spawner.run() {
        actor.join().unwrap();
    }
    waiter.join().unwrap();

    assert!(coordinator.record_count() >= 60);
    assert!(
        sink.max_live.load(Ordering::SeqCst) <= cap as u64,
        "live entities exceeded the cap: {}",
        sink.max_live.load(Ordering::SeqCst)
    );
    assert_eq!(coordinator.entity_count(), 0);
}
