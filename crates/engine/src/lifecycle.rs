//! Run completion and entity accounting.
//!
//! The [`RunCoordinator`] owns the two counters every unit shares — records
//! emitted and entities alive — and decides when the run is over. It holds
//! no lock while calling into the clock and the clock never calls back into
//! it, so the two components cannot deadlock each other.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use synthload_clock::LogicalClock;
use tracing::info;

/// How a run decides it is finished. Record target and duration are
/// mutually exclusive; the conflict is rejected when options are parsed,
/// before anything starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    /// Stop once this many records have been emitted.
    Records(u64),
    /// Stop once this many logical seconds have elapsed.
    Duration(f64),
    /// Run until externally terminated.
    Unbounded,
}

/// Tracks emitted records and live entities, and evaluates run completion.
pub struct RunCoordinator {
    clock: Arc<LogicalClock>,
    termination: Termination,
    records: AtomicU64,
    entities: AtomicU64,
    done: AtomicBool,
    completion: Mutex<bool>,
    completed: Condvar,
}

impl RunCoordinator {
    pub fn new(clock: Arc<LogicalClock>, termination: Termination) -> Self {
        Self {
            clock,
            termination,
            records: AtomicU64::new(0),
            entities: AtomicU64::new(0),
            done: AtomicBool::new(false),
            completion: Mutex::new(false),
            completed: Condvar::new(),
        }
    }

    /// Record one emitted record. Flips the done flag when a record target
    /// is configured and reached.
    pub fn record_emitted(&self) {
        let emitted = self.records.fetch_add(1, Ordering::SeqCst) + 1;
        if let Termination::Records(target) = self.termination {
            if emitted >= target {
                self.set_done();
            }
        }
    }

    /// Register a newly launched entity.
    pub fn entity_started(&self) {
        self.entities.fetch_add(1, Ordering::SeqCst);
    }

    /// Register an entity's exit. The live count can never go negative;
    /// if it would, the engine has a pairing bug and must fail loudly.
    pub fn entity_finished(&self) {
        self.entities
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or_else(|_| panic!("live entity count went negative"));
    }

    /// Whether the run is complete. Lock-free; safe to call from any unit
    /// at any point.
    pub fn is_done(&self) -> bool {
        if self.done.load(Ordering::SeqCst) {
            return true;
        }
        match self.termination {
            Termination::Records(target) => self.records.load(Ordering::SeqCst) >= target,
            Termination::Duration(deadline) => self.clock.elapsed_seconds() > deadline,
            Termination::Unbounded => false,
        }
    }

    /// Block until the run completes, then force-wake anything still
    /// sleeping on the clock.
    ///
    /// With a duration configured, this unit participates in the clock so a
    /// simulated run's deadline elapses in simulated seconds. With a record
    /// target (or nothing), it blocks on the completion signal. Either way
    /// every sleeper is released afterwards, so no unit stays blocked once
    /// the run is over.
    pub fn await_completion(&self) {
        match self.termination {
            Termination::Duration(deadline) => {
                self.clock.activate();
                // Sleep to the absolute deadline. The waiter may be
                // scheduled after producers have already advanced logical
                // time; sleeping the remainder keeps the deadline anchored
                // to the run's start.
                let remaining = deadline - self.clock.elapsed_seconds();
                self.clock.sleep(remaining);
                self.set_done();
                self.clock.deactivate();
            }
            Termination::Records(_) | Termination::Unbounded => {
                let mut completed = self.completion.lock();
                while !*completed {
                    self.completed.wait(&mut completed);
                }
                drop(completed);
            }
        }
        self.clock.release_all();
    }

    /// Force completion. With a record target configured, the reported
    /// count snaps to the target so reports stay consistent.
    pub fn terminate(&self) {
        if let Termination::Records(target) = self.termination {
            self.records.store(target, Ordering::SeqCst);
        }
        info!("run terminated externally");
        self.set_done();
    }

    /// Total records emitted so far.
    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::SeqCst)
    }

    /// Entities currently alive.
    pub fn entity_count(&self) -> u64 {
        self.entities.load(Ordering::SeqCst)
    }

    fn set_done(&self) {
        self.done.store(true, Ordering::SeqCst);
        let mut completed = self.completion.lock();
        *completed = true;
        self.completed.notify_all();
    }
}
