//! Replay producer.
//!
//! Digital-twin mode: instead of generating records from a state graph, an
//! existing time-sorted event file is re-emitted with fresh logical-clock
//! timestamps at the original cadence, cycling from the top until the run
//! terminates. The producer is a single entity participating in the clock
//! like any actor, so replay works at real, accelerated, or fully simulated
//! speed unchanged.

use crate::config::SinkErrorPolicy;
use crate::error::JobError;
use crate::lifecycle::RunCoordinator;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use synthload_clock::LogicalClock;
use synthload_schema::fields::format_timestamp;
use synthload_sink::Sink;
use tracing::{debug, error, info};

fn default_time_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

/// Replay-mode workload definition.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// Newline-delimited JSON source, sorted by time.
    pub source_file: PathBuf,

    /// Record field carrying the event time.
    pub time_field: String,

    /// `millis`, `seconds`, `nanos`, or a chrono format string.
    #[serde(default = "default_time_format")]
    pub time_format: String,

    /// Fields to null out with the given probability on each emission.
    #[serde(default)]
    pub null_injection: Vec<NullInjection>,

    /// Occasionally jump ahead in the source, simulating gaps.
    pub time_skipping: Option<TimeSkipping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NullInjection {
    pub field: String,
    pub null_probability: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeSkipping {
    pub skip_probability: f64,
    /// Minimum gap to skip over, in seconds.
    pub min_skip_duration: f64,
    /// Maximum gap to skip over, in seconds.
    pub max_skip_duration: f64,
}

/// One source event with its parsed timestamp.
#[derive(Debug, Clone)]
pub struct ReplayEvent {
    at: DateTime<Utc>,
    record: Map<String, Value>,
}

/// Parse and validate the replay source up front, so a malformed file fails
/// the job before anything starts.
pub fn load_events(config: &ReplayConfig) -> Result<Vec<ReplayEvent>, JobError> {
    if let Some(skipping) = &config.time_skipping {
        if skipping.min_skip_duration > skipping.max_skip_duration {
            return Err(JobError::InvalidReplay(format!(
                "time_skipping min {} exceeds max {}",
                skipping.min_skip_duration, skipping.max_skip_duration
            )));
        }
    }

    let file = File::open(&config.source_file).map_err(|source| JobError::Io {
        path: config.source_file.clone(),
        source,
    })?;

    let mut events = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| JobError::Io {
            path: config.source_file.clone(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Map<String, Value> =
            serde_json::from_str(&line).map_err(|err| JobError::ReplayRecord {
                path: config.source_file.clone(),
                line: idx + 1,
                reason: err.to_string(),
            })?;
        let at = parse_event_time(&record, &config.time_field, &config.time_format).map_err(
            |reason| JobError::ReplayRecord {
                path: config.source_file.clone(),
                line: idx + 1,
                reason,
            },
        )?;
        events.push(ReplayEvent { at, record });
    }

    if events.is_empty() {
        return Err(JobError::InvalidReplay(format!(
            "source file {:?} contains no events",
            config.source_file
        )));
    }

    info!(
        events = events.len(),
        source = %config.source_file.display(),
        "loaded replay source"
    );
    Ok(events)
}

fn parse_event_time(
    record: &Map<String, Value>,
    time_field: &str,
    time_format: &str,
) -> Result<DateTime<Utc>, String> {
    let value = record
        .get(time_field)
        .ok_or_else(|| format!("missing time field {time_field:?}"))?;

    match time_format {
        "millis" => epoch(value, 1e3),
        "seconds" | "epoch" | "posix" => epoch(value, 1.0),
        "nanos" => epoch(value, 1e9),
        format => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("time field {time_field:?} is not a string"))?;
            NaiveDateTime::parse_from_str(text, format)
                .map(|naive| naive.and_utc())
                .map_err(|err| format!("unparseable time {text:?}: {err}"))
        }
    }
}

/// Parse an epoch-style time value, numeric or stringified, scaled by
/// `per_second` units per second.
fn epoch(value: &Value, per_second: f64) -> Result<DateTime<Utc>, String> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("unparseable epoch time {value}"))?;
    let millis = (raw / per_second * 1000.0) as i64;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| format!("epoch time {raw} out of range"))
}

/// Re-emits the loaded events with logical-clock timestamps.
pub struct ReplayProducer {
    config: ReplayConfig,
    events: Arc<Vec<ReplayEvent>>,
    clock: Arc<LogicalClock>,
    coordinator: Arc<RunCoordinator>,
    sink: Arc<dyn Sink>,
    policy: SinkErrorPolicy,
    rng: ChaCha8Rng,
}

impl ReplayProducer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ReplayConfig,
        events: Arc<Vec<ReplayEvent>>,
        clock: Arc<LogicalClock>,
        coordinator: Arc<RunCoordinator>,
        sink: Arc<dyn Sink>,
        policy: SinkErrorPolicy,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            config,
            events,
            clock,
            coordinator,
            sink,
            policy,
            rng,
        }
    }

    /// Register the producer as an entity and start it on its own thread.
    pub fn launch(self) -> io::Result<JoinHandle<()>> {
        self.coordinator.entity_started();
        let coordinator = self.coordinator.clone();
        let rollback = coordinator.clone();
        std::thread::Builder::new()
            .name("replay".to_string())
            .spawn(move || {
                self.run();
                coordinator.entity_finished();
            })
            .inspect_err(|_| rollback.entity_finished())
    }

    fn run(mut self) {
        self.clock.activate();
        info!(events = self.events.len(), "replay producer started");

        let events = self.events.clone();
        'replay: while !self.coordinator.is_done() {
            let mut i = 0;
            while i < events.len() {
                if !self.emit(&events[i]) {
                    break 'replay;
                }
                self.coordinator.record_emitted();

                let current = events[i].at;
                i += 1;
                if i < events.len() {
                    let next_idx = self.maybe_skip(&events, current, i);
                    let gap =
                        (events[next_idx].at - current).num_milliseconds() as f64 / 1000.0;
                    i = next_idx;
                    self.clock.sleep(gap);
                }
                if self.coordinator.is_done() {
                    break 'replay;
                }
            }
            debug!("replay cycle complete, restarting from the top");
        }

        self.clock.end_participation();
        info!("replay producer finished");
    }

    /// Emit one event with a fresh timestamp and any configured null
    /// injections. Returns false when a delivery failure aborts the
    /// producer.
    fn emit(&mut self, event: &ReplayEvent) -> bool {
        let mut record = event.record.clone();
        record.insert(
            self.config.time_field.clone(),
            Value::String(format_timestamp(self.clock.now())),
        );
        for injection in &self.config.null_injection {
            if self.rng.gen::<f64>() < injection.null_probability {
                if let Some(slot) = record.get_mut(&injection.field) {
                    *slot = Value::Null;
                }
            }
        }

        let line = Value::Object(record).to_string();
        if let Err(err) = self.sink.accept(&line) {
            match self.policy {
                SinkErrorPolicy::Continue => {
                    error!(%err, "record delivery failed");
                }
                SinkErrorPolicy::Abort => {
                    error!(%err, "record delivery failed, aborting replay");
                    return false;
                }
            }
        }
        true
    }

    /// With time skipping configured, occasionally advance past events
    /// until the gap from `current` exceeds a sampled skip duration.
    fn maybe_skip(&mut self, events: &[ReplayEvent], current: DateTime<Utc>, i: usize) -> usize {
        let Some(skipping) = &self.config.time_skipping else {
            return i;
        };
        if self.rng.gen::<f64>() >= skipping.skip_probability {
            return i;
        }

        let skip_secs = self
            .rng
            .gen_range(skipping.min_skip_duration..=skipping.max_skip_duration);
        let mut idx = i;
        while idx < events.len() - 1
            && ((events[idx].at - current).num_milliseconds() as f64) < skip_secs * 1000.0
        {
            idx += 1;
        }
        debug!(from = i, to = idx, skip_secs, "time skip");
        idx
    }
}
