//! Per-actor execution.
//!
//! Each actor walks the shared state graph on its own thread: emit a record
//! for the current state, account for it, dwell on the clock, then take a
//! weighted transition. The only blocking point is `clock.sleep`; completion
//! is checked right after emission and right after waking, never mid-record.

use crate::config::SinkErrorPolicy;
use crate::lifecycle::RunCoordinator;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use synthload_clock::LogicalClock;
use synthload_schema::{Next, StateGraph};
use synthload_sink::Sink;
use tracing::{debug, error};

/// One simulated entity traversing the state graph.
pub struct Actor {
    id: u64,
    graph: Arc<StateGraph>,
    clock: Arc<LogicalClock>,
    coordinator: Arc<RunCoordinator>,
    sink: Arc<dyn Sink>,
    policy: SinkErrorPolicy,
    rng: ChaCha8Rng,
}

impl Actor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        graph: Arc<StateGraph>,
        clock: Arc<LogicalClock>,
        coordinator: Arc<RunCoordinator>,
        sink: Arc<dyn Sink>,
        policy: SinkErrorPolicy,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            id,
            graph,
            clock,
            coordinator,
            sink,
            policy,
            rng,
        }
    }

    /// Register the entity and start it on its own thread.
    ///
    /// The live-entity count is incremented here, in the launcher's thread,
    /// so the spawner's capacity check never races the new thread's
    /// startup.
    pub fn launch(self) -> io::Result<JoinHandle<()>> {
        self.coordinator.entity_started();
        let coordinator = self.coordinator.clone();
        let rollback = coordinator.clone();
        std::thread::Builder::new()
            .name(format!("actor-{}", self.id))
            .spawn(move || {
                self.run();
                coordinator.entity_finished();
            })
            .inspect_err(|_| rollback.entity_finished())
    }

    /// Drive the actor to completion on the current thread. The caller is
    /// responsible for entity accounting; clock participation begins and
    /// ends here on every exit path.
    fn run(mut self) {
        self.clock.activate();
        debug!(actor = self.id, "actor started");
        self.walk();
        debug!(actor = self.id, "actor finished");
        self.clock.end_participation();
    }

    fn walk(&mut self) {
        let graph = self.graph.clone();
        let mut state = graph.initial();
        let mut vars: HashMap<String, Value> = HashMap::new();

        loop {
            state.bind_variables(&mut self.rng, &mut vars);
            let record = state.render_record(self.clock.now(), &mut self.rng, &vars);

            if let Err(err) = self.sink.accept(&record) {
                match self.policy {
                    SinkErrorPolicy::Continue => {
                        error!(actor = self.id, state = state.name(), %err, "record delivery failed");
                    }
                    SinkErrorPolicy::Abort => {
                        error!(
                            actor = self.id,
                            state = state.name(),
                            %err,
                            "record delivery failed, aborting actor"
                        );
                        return;
                    }
                }
            }

            self.coordinator.record_emitted();
            if self.coordinator.is_done() {
                return;
            }

            let dwell = state.sample_dwell(&mut self.rng);
            self.clock.sleep(dwell);
            if self.coordinator.is_done() {
                return;
            }

            match state.next(&mut self.rng) {
                Next::Stop => return,
                Next::State(idx) => state = graph.state(idx),
            }
        }
    }
}
