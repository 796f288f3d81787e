//! Job configuration.
//!
//! A job is a workload definition (generator state graph or replay source),
//! an output target, a termination mode, and run-level knobs: concurrency
//! cap, time mode, and RNG seed. Workload files keep their original JSON
//! shape, with `"type"` defaulting to `"generator"` when absent.

use crate::error::JobError;
use crate::lifecycle::Termination;
use crate::replay::ReplayConfig;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use synthload_clock::TimeMode;
use synthload_schema::GeneratorConfig;
use synthload_sink::TargetConfig;

/// What an actor does when record delivery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkErrorPolicy {
    /// Log the failure and keep walking the graph.
    #[default]
    Continue,
    /// Log the failure and end the actor's life.
    Abort,
}

/// The two producer shapes a workload file can describe.
#[derive(Debug, Clone)]
pub enum WorkloadConfig {
    Generator(GeneratorConfig),
    Replay(ReplayConfig),
}

impl WorkloadConfig {
    /// Interpret a parsed workload file. The `type` key selects the
    /// producer and defaults to `"generator"`, matching the usual file
    /// shape where only replay jobs say so explicitly.
    pub fn from_value(value: &Value) -> Result<Self, JobError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("generator");
        match kind {
            "generator" => Ok(WorkloadConfig::Generator(serde_json::from_value(
                value.clone(),
            )?)),
            "replay" => Ok(WorkloadConfig::Replay(serde_json::from_value(
                value.clone(),
            )?)),
            other => Err(JobError::UnknownWorkloadType(other.to_string())),
        }
    }
}

/// Extract the `target` section of a workload file, if present.
pub fn target_from_value(value: &Value) -> Result<Option<TargetConfig>, JobError> {
    match value.get("target") {
        Some(target) => Ok(Some(serde_json::from_value(target.clone())?)),
        None => Ok(None),
    }
}

/// Clock setup for a run.
#[derive(Debug, Clone, Copy)]
pub struct TimeConfig {
    pub mode: TimeMode,
    /// Explicit start time for the simulated cursor. Only meaningful
    /// outside real-time mode.
    pub start_time: Option<DateTime<Utc>>,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            mode: TimeMode::Real,
            start_time: None,
        }
    }
}

impl TimeConfig {
    pub fn real() -> Self {
        Self::default()
    }

    pub fn simulated() -> Self {
        Self {
            mode: TimeMode::Simulated,
            start_time: None,
        }
    }

    /// Simulated time starting from an explicit instant.
    pub fn simulated_from(start: DateTime<Utc>) -> Self {
        Self {
            mode: TimeMode::Simulated,
            start_time: Some(start),
        }
    }

    /// Simulated until the cursor reaches the wall clock, then real.
    pub fn sim_to_real(start: DateTime<Utc>) -> Self {
        Self {
            mode: TimeMode::SimToReal,
            start_time: Some(start),
        }
    }
}

impl Termination {
    /// Combine the two mutually exclusive termination options, rejecting
    /// conflicts before the run starts.
    pub fn from_options(records: Option<u64>, seconds: Option<f64>) -> Result<Self, JobError> {
        match (records, seconds) {
            (Some(_), Some(_)) => Err(JobError::ConflictingTermination),
            (Some(n), None) => Ok(Termination::Records(n)),
            (None, Some(s)) => Ok(Termination::Duration(s)),
            (None, None) => Ok(Termination::Unbounded),
        }
    }
}

/// Default concurrency cap, matching the CLI default.
pub const DEFAULT_MAX_ENTITIES: usize = 100;

/// Everything needed to run one job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Job name, carried into reports.
    pub name: String,
    pub workload: WorkloadConfig,
    pub target: TargetConfig,
    pub termination: Termination,
    /// Cap on concurrently live entities.
    pub max_entities: usize,
    pub time: TimeConfig,
    /// Seed for reproducible runs; entropy-seeded when absent.
    pub seed: Option<u64>,
    pub on_sink_error: SinkErrorPolicy,
}

impl JobConfig {
    /// Create a job with defaults: unbounded, real time, cap of
    /// [`DEFAULT_MAX_ENTITIES`], entropy-seeded.
    pub fn new(name: impl Into<String>, workload: WorkloadConfig, target: TargetConfig) -> Self {
        Self {
            name: name.into(),
            workload,
            target,
            termination: Termination::Unbounded,
            max_entities: DEFAULT_MAX_ENTITIES,
            time: TimeConfig::default(),
            seed: None,
            on_sink_error: SinkErrorPolicy::default(),
        }
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities;
        self
    }

    pub fn with_time(mut self, time: TimeConfig) -> Self {
        self.time = time;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sink_error_policy(mut self, policy: SinkErrorPolicy) -> Self {
        self.on_sink_error = policy;
        self
    }
}
