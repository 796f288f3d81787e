//! Job driver.
//!
//! Ties a workload together: clock, coordinator, sink, and producer
//! (state-graph spawner or replay). `run` blocks until the job completes;
//! `report` and `terminate` are the narrow surface an external job manager
//! consumes, safe to call from any thread while the run is in flight.

use crate::config::{JobConfig, SinkErrorPolicy, WorkloadConfig};
use crate::error::JobError;
use crate::lifecycle::{RunCoordinator, Termination};
use crate::replay::{load_events, ReplayConfig, ReplayEvent, ReplayProducer};
use crate::spawner::SpawnController;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use synthload_clock::{LogicalClock, TimeMode};
use synthload_dist::Sampler;
use synthload_schema::StateGraph;
use synthload_sink::Sink;
use tracing::info;

enum Producer {
    Generator {
        graph: Arc<StateGraph>,
        interarrival: Sampler,
    },
    Replay {
        config: ReplayConfig,
        events: Arc<Vec<ReplayEvent>>,
    },
}

/// Snapshot of a running or finished job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub name: String,
    pub active_entities: u64,
    pub total_records: u64,
    pub start_time: String,
    pub run_seconds: f64,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Complete,
}

/// One configured job, ready to run.
pub struct JobDriver {
    name: String,
    clock: Arc<LogicalClock>,
    coordinator: Arc<RunCoordinator>,
    sink: Arc<dyn Sink>,
    policy: SinkErrorPolicy,
    producer: Producer,
    termination: Termination,
    max_entities: usize,
    seed: u64,
}

impl JobDriver {
    /// Validate the configuration and set up the run. Everything that can
    /// fail — graph construction, sink setup, replay source parsing — fails
    /// here, before any unit starts.
    pub fn new(config: JobConfig) -> Result<Self, JobError> {
        let seed = config
            .seed
            .unwrap_or_else(|| rand::thread_rng().next_u64());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let clock = Arc::new(match config.time.start_time {
            Some(start) if config.time.mode != TimeMode::Real => {
                LogicalClock::with_start_time(config.time.mode, start)
            }
            _ => LogicalClock::new(config.time.mode),
        });
        let coordinator = Arc::new(RunCoordinator::new(clock.clone(), config.termination));
        let sink = config.target.build()?;

        let producer = match &config.workload {
            WorkloadConfig::Generator(generator) => Producer::Generator {
                graph: Arc::new(StateGraph::build(generator, &mut rng)?),
                interarrival: Sampler::from_config(&generator.interarrival)?,
            },
            WorkloadConfig::Replay(replay) => Producer::Replay {
                config: replay.clone(),
                events: Arc::new(load_events(replay)?),
            },
        };

        Ok(Self {
            name: config.name,
            clock,
            coordinator,
            sink,
            policy: config.on_sink_error,
            producer,
            termination: config.termination,
            max_entities: config.max_entities,
            seed,
        })
    }

    /// Run the job to completion, blocking the calling thread. An
    /// unbounded job blocks until [`JobDriver::terminate`] is called from
    /// another thread.
    pub fn run(&self) -> Result<(), JobError> {
        info!(name = %self.name, seed = self.seed, "starting job");

        match &self.producer {
            Producer::Generator { graph, interarrival } => {
                let spawner = SpawnController::new(
                    graph.clone(),
                    self.clock.clone(),
                    self.coordinator.clone(),
                    self.sink.clone(),
                    self.policy,
                    interarrival.clone(),
                    self.max_entities,
                    ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(1)),
                );
                let spawner = thread::Builder::new()
                    .name("spawner".to_string())
                    .spawn(move || spawner.run())
                    .map_err(|source| JobError::Thread {
                        name: "spawner",
                        source,
                    })?;
                let waiter = self.start_completion_waiter(|| spawner.is_finished())?;
                for actor in spawner.join().expect("spawner thread panicked") {
                    actor.join().expect("actor thread panicked");
                }
                waiter.join().expect("completion thread panicked");
            }
            Producer::Replay { config, events } => {
                let producer = ReplayProducer::new(
                    config.clone(),
                    events.clone(),
                    self.clock.clone(),
                    self.coordinator.clone(),
                    self.sink.clone(),
                    self.policy,
                    ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(2)),
                );
                let producer = producer.launch().map_err(|source| JobError::Thread {
                    name: "replay",
                    source,
                })?;
                let waiter = self.start_completion_waiter(|| producer.is_finished())?;
                producer.join().expect("replay thread panicked");
                waiter.join().expect("completion thread panicked");
            }
        }

        let report = self.report();
        info!(
            records = report.total_records,
            run_seconds = report.run_seconds,
            "job finished"
        );
        Ok(())
    }

    /// Start the completion waiter once the producer is participating in
    /// the clock.
    ///
    /// A simulated-mode deadline waiter that went to sleep as the sole
    /// participant would fast-forward the cursor straight to the deadline
    /// before any producer registered, ending the run with nothing
    /// emitted. Deadlines are anchored regardless: the waiter sleeps to
    /// the absolute deadline, not a relative one.
    fn start_completion_waiter(
        &self,
        producer_finished: impl Fn() -> bool,
    ) -> Result<thread::JoinHandle<()>, JobError> {
        if matches!(self.termination, Termination::Duration(_))
            && self.clock.mode() != TimeMode::Real
        {
            while self.clock.active_participants() == 0
                && self.clock.pending_wakes() == 0
                && !producer_finished()
            {
                thread::yield_now();
            }
        }

        let coordinator = self.coordinator.clone();
        thread::Builder::new()
            .name("completion".to_string())
            .spawn(move || coordinator.await_completion())
            .map_err(|source| JobError::Thread {
                name: "completion",
                source,
            })
    }

    /// Snapshot the job's state. Safe to call from any thread at any time.
    pub fn report(&self) -> JobReport {
        JobReport {
            name: self.name.clone(),
            active_entities: self.coordinator.entity_count(),
            total_records: self.coordinator.record_count(),
            start_time: self
                .clock
                .start_time()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            run_seconds: self.clock.elapsed_seconds(),
            status: if self.coordinator.is_done() {
                JobStatus::Complete
            } else {
                JobStatus::Running
            },
        }
    }

    /// Force the job to complete. Sleeping units are released; `run`
    /// returns once every unit has observed completion and exited.
    pub fn terminate(&self) {
        self.coordinator.terminate();
    }

    /// The seed this run derives all randomness from.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
