//! Actor spawning.
//!
//! The spawn controller populates the run with actors at a sampled cadence,
//! bounded by the concurrency cap. It participates in the clock like any
//! other unit, so in simulated mode arrival gaps are simulated seconds.

use crate::actor::Actor;
use crate::config::SinkErrorPolicy;
use crate::lifecycle::RunCoordinator;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::thread::JoinHandle;
use synthload_clock::LogicalClock;
use synthload_dist::Sampler;
use synthload_schema::StateGraph;
use synthload_sink::Sink;
use tracing::{error, info};

/// Backoff when the run is at capacity, so the controller re-checks without
/// busy-spinning.
const CAPACITY_BACKOFF_SECS: f64 = 5.0;

/// Launches actors while the run is live, respecting the concurrency cap.
pub struct SpawnController {
    graph: Arc<StateGraph>,
    clock: Arc<LogicalClock>,
    coordinator: Arc<RunCoordinator>,
    sink: Arc<dyn Sink>,
    policy: SinkErrorPolicy,
    interarrival: Sampler,
    max_entities: usize,
    rng: ChaCha8Rng,
    spawned: u64,
    handles: Vec<JoinHandle<()>>,
}

impl SpawnController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: Arc<StateGraph>,
        clock: Arc<LogicalClock>,
        coordinator: Arc<RunCoordinator>,
        sink: Arc<dyn Sink>,
        policy: SinkErrorPolicy,
        interarrival: Sampler,
        max_entities: usize,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            graph,
            clock,
            coordinator,
            sink,
            policy,
            interarrival,
            max_entities,
            rng,
            spawned: 0,
            handles: Vec::new(),
        }
    }

    /// Spawn actors until the run completes, then hand back the join
    /// handles of every actor launched.
    pub fn run(mut self) -> Vec<JoinHandle<()>> {
        info!(max_entities = self.max_entities, "spawn controller started");
        self.clock.activate();

        while !self.coordinator.is_done() {
            if (self.coordinator.entity_count() as usize) < self.max_entities {
                self.launch_actor();
                let gap = self.interarrival.sample(&mut self.rng);
                self.clock.sleep(gap);
            } else {
                self.clock.sleep(CAPACITY_BACKOFF_SECS);
            }
        }

        self.clock.end_participation();
        info!(spawned = self.spawned, "spawn controller finished");
        self.handles
    }

    fn launch_actor(&mut self) {
        let id = self.spawned;
        let actor = Actor::new(
            id,
            self.graph.clone(),
            self.clock.clone(),
            self.coordinator.clone(),
            self.sink.clone(),
            self.policy,
            ChaCha8Rng::seed_from_u64(self.rng.gen()),
        );
        match actor.launch() {
            Ok(handle) => {
                self.spawned += 1;
                self.handles.push(handle);
            }
            Err(err) => error!(actor = id, %err, "failed to spawn actor thread"),
        }
    }
}
