//! Logical time for the workload engine.
//!
//! A single [`LogicalClock`] is shared by every execution unit in a run: the
//! spawner, each actor, and the completion waiter. In real-time mode `sleep`
//! is a plain thread sleep. In simulated mode time never flows on its own;
//! it jumps forward in discrete steps, and only when every participating
//! unit is asleep. The unit that reaches that quiescent point advances the
//! cursor to the earliest pending wake and resumes its owner, so all units
//! observe a single, globally monotonic timeline regardless of how the OS
//! schedules their threads.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      LogicalClock                         │
//! │                                                           │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │   Pending wakes (BTreeMap<(time, seq), WakeHandle>) │  │
//! │  │   Ordered by: scheduled time, registration order    │  │
//! │  └──────────────────────────┬──────────────────────────┘  │
//! │                             │                             │
//! │        active == 1 ⇒ advance cursor to earliest wake      │
//! │                             │                             │
//! │                             ▼                             │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │   Woken unit runs, emits, and sleeps again          │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration as TimeDelta, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How the clock maps logical time onto wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    /// Logical time is wall-clock time; `sleep` blocks for real.
    Real,
    /// Logical time advances only through the pending-wake queue.
    Simulated,
    /// Starts simulated (usually from a back-dated start time) and switches
    /// permanently to real time once the cursor catches up with the wall
    /// clock. The transition is one-way.
    SimToReal,
}

/// Why a sleeping unit was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeReason {
    /// The clock advanced to the wake's scheduled time.
    Elapsed,
    /// The sleeper was force-woken during shutdown; the cursor did not move.
    Released,
}

/// One-shot resume signal owned by a single sleeping unit.
struct WakeHandle {
    reason: Mutex<Option<WakeReason>>,
    resumed: Condvar,
}

impl WakeHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            reason: Mutex::new(None),
            resumed: Condvar::new(),
        })
    }

    /// Block until `resume` is called. Returns immediately if it already was.
    fn wait(&self) -> WakeReason {
        let mut reason = self.reason.lock();
        while reason.is_none() {
            self.resumed.wait(&mut reason);
        }
        reason.take().unwrap()
    }

    fn resume(&self, why: WakeReason) {
        let mut reason = self.reason.lock();
        *reason = Some(why);
        self.resumed.notify_one();
    }
}

/// Pending wakes keyed by scheduled time, with a registration sequence
/// breaking ties in FIFO order.
type WakeKey = (DateTime<Utc>, u64);

struct ClockState {
    cursor: DateTime<Utc>,
    mode: TimeMode,
    active: usize,
    pending: BTreeMap<WakeKey, Arc<WakeHandle>>,
    next_seq: u64,
}

/// Authoritative source of "now" for a single run.
///
/// Clock operations never fail. Malformed durations are the caller's
/// responsibility; a negative or NaN sleep is a no-op because time never
/// moves backward. Violations of the scheduling invariants (a participant
/// count going negative, the cursor moving backward during a quiescent
/// advance) panic: they indicate an engine bug, not a recoverable state.
pub struct LogicalClock {
    start: DateTime<Utc>,
    state: Mutex<ClockState>,
}

impl LogicalClock {
    /// Create a clock starting at the current wall-clock time.
    pub fn new(mode: TimeMode) -> Self {
        Self::with_start_time(mode, Utc::now())
    }

    /// Create a clock with an explicit start time.
    ///
    /// Back-dated start times are the usual companion of
    /// [`TimeMode::SimToReal`]: the run replays history at simulation speed
    /// and then continues live.
    pub fn with_start_time(mode: TimeMode, start: DateTime<Utc>) -> Self {
        Self {
            start,
            state: Mutex::new(ClockState {
                cursor: start,
                mode,
                active: 0,
                pending: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// The current logical time.
    pub fn now(&self) -> DateTime<Utc> {
        let state = self.state.lock();
        match state.mode {
            TimeMode::Real => Utc::now(),
            TimeMode::Simulated | TimeMode::SimToReal => state.cursor,
        }
    }

    /// The time the run started.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    /// Logical seconds elapsed since the run started.
    pub fn elapsed_seconds(&self) -> f64 {
        (self.now() - self.start).num_milliseconds() as f64 / 1000.0
    }

    /// The current time mode. [`TimeMode::SimToReal`] reports
    /// [`TimeMode::Real`] once the cursor has caught up.
    pub fn mode(&self) -> TimeMode {
        self.state.lock().mode
    }

    /// Join the scheduling domain. No-op in real-time mode.
    pub fn activate(&self) {
        let mut state = self.state.lock();
        if state.mode != TimeMode::Real {
            state.active += 1;
        }
    }

    /// Leave the scheduling domain without waking anyone. No-op in
    /// real-time mode.
    pub fn deactivate(&self) {
        let mut state = self.state.lock();
        if state.mode != TimeMode::Real {
            Self::retire(&mut state);
        }
    }

    /// Leave the scheduling domain for good, handing control to the
    /// earliest pending sleeper if one exists. Without the hand-off, a unit
    /// exiting as the last active participant would strand every sleeper.
    pub fn end_participation(&self) {
        let mut state = self.state.lock();
        if state.mode != TimeMode::Real {
            Self::retire(&mut state);
        }
        if let Some(((wake_at, _), handle)) = state.pending.pop_first() {
            state.cursor = state.cursor.max(wake_at);
            handle.resume(WakeReason::Elapsed);
        }
    }

    /// Force-wake every pending sleeper without advancing the cursor.
    /// Shutdown safety net: after this call no unit remains blocked on the
    /// clock.
    pub fn release_all(&self) {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending);
        if !pending.is_empty() {
            debug!(sleepers = pending.len(), "releasing all pending sleepers");
        }
        for handle in pending.into_values() {
            handle.resume(WakeReason::Released);
        }
    }

    /// Suspend the calling unit for `seconds` of logical time.
    ///
    /// Negative or NaN durations are a no-op: time never moves backward.
    /// In simulated mode a zero-length sleep still registers a wake, which
    /// yields to any unit scheduled for the current instant.
    pub fn sleep(&self, seconds: f64) {
        if !(seconds >= 0.0) {
            return;
        }

        let mut state = self.state.lock();
        if state.mode == TimeMode::Real {
            drop(state);
            if let Ok(duration) = Duration::try_from_secs_f64(seconds) {
                std::thread::sleep(duration);
            }
            return;
        }

        let wake_at = state.cursor + TimeDelta::microseconds((seconds * 1e6) as i64);
        let seq = state.next_seq;
        state.next_seq += 1;
        let handle = WakeHandle::new();
        state.pending.insert((wake_at, seq), handle.clone());

        if state.active == 1 {
            // Quiescent: every other unit is asleep or gone, so time may
            // advance to the earliest pending wake.
            let ((next_at, _), next) = state
                .pending
                .pop_first()
                .expect("pending set contains at least our own wake");
            assert!(
                next_at >= state.cursor,
                "logical clock moved backward: {} -> {}",
                state.cursor,
                next_at,
            );
            state.cursor = next_at;
            if !Arc::ptr_eq(&next, &handle) {
                next.resume(WakeReason::Elapsed);
                state = self.park(state, &handle);
            }
            // Our own wake was earliest: continue without suspending.
        } else {
            state = self.park(state, &handle);
        }

        if state.mode == TimeMode::SimToReal {
            let wall = Utc::now();
            if state.cursor > wall {
                state.mode = TimeMode::Real;
                state.cursor = wall;
                debug!("simulated clock caught up with wall clock, switching to real time");
            }
        }
    }

    /// Number of units currently registered for a future wake. Diagnostic.
    pub fn pending_wakes(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of active (running, not sleeping) participants. Diagnostic.
    pub fn active_participants(&self) -> usize {
        self.state.lock().active
    }

    /// Suspend until the wake handle is resumed. The clock lock is released
    /// while parked and re-taken on resume; the participant count excludes
    /// parked units so the quiescence check sees only runnable ones.
    fn park<'a>(
        &'a self,
        mut state: MutexGuard<'a, ClockState>,
        handle: &WakeHandle,
    ) -> MutexGuard<'a, ClockState> {
        Self::retire(&mut state);
        drop(state);
        handle.wait();
        let mut state = self.state.lock();
        state.active += 1;
        state
    }

    fn retire(state: &mut ClockState) {
        state.active = state
            .active
            .checked_sub(1)
            .unwrap_or_else(|| panic!("active participant count went negative"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_real_mode_now_is_monotonic() {
        let clock = LogicalClock::new(TimeMode::Real);
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_simulated_sleep_advances_without_waiting() {
        let clock = LogicalClock::new(TimeMode::Simulated);
        clock.activate();

        let wall_start = Instant::now();
        clock.sleep(3600.0);
        clock.deactivate();

        assert!(wall_start.elapsed().as_secs() < 5, "simulated sleep blocked");
        assert!((clock.elapsed_seconds() - 3600.0).abs() < 0.01);
    }

    #[test]
    fn test_negative_sleep_is_noop() {
        let clock = LogicalClock::new(TimeMode::Simulated);
        clock.activate();
        let before = clock.now();
        clock.sleep(-5.0);
        assert_eq!(clock.now(), before);
        assert_eq!(clock.pending_wakes(), 0);
        clock.deactivate();
    }

    #[test]
    fn test_sleepers_wake_in_time_order() {
        let clock = Arc::new(LogicalClock::new(TimeMode::Simulated));
        let wakes: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));

        // The main thread stays active so neither sleeper triggers the
        // quiescent advance until both are parked.
        clock.activate();

        let mut handles = Vec::new();
        for delay in [10.0, 20.0] {
            let clock = clock.clone();
            let wakes = wakes.clone();
            handles.push(std::thread::spawn(move || {
                clock.activate();
                clock.sleep(delay);
                wakes.lock().push(clock.elapsed_seconds());
                clock.end_participation();
            }));
        }

        while clock.pending_wakes() < 2 {
            std::thread::yield_now();
        }

        // Sleeping past both wakes hands control to each sleeper in order
        // before the main thread resumes at t=30.
        clock.sleep(30.0);
        clock.deactivate();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*wakes.lock(), vec![10.0, 20.0]);
        assert!((clock.elapsed_seconds() - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_release_all_wakes_every_sleeper() {
        let clock = Arc::new(LogicalClock::new(TimeMode::Simulated));
        clock.activate();

        let mut handles = Vec::new();
        for delay in [100.0, 200.0, 300.0] {
            let clock = clock.clone();
            handles.push(std::thread::spawn(move || {
                clock.activate();
                clock.sleep(delay);
                clock.end_participation();
            }));
        }

        while clock.pending_wakes() < 3 {
            std::thread::yield_now();
        }

        clock.release_all();
        for handle in handles {
            handle.join().unwrap();
        }

        // Forced wakes do not advance the cursor.
        assert!(clock.elapsed_seconds() < 100.0);
        assert_eq!(clock.pending_wakes(), 0);
        clock.deactivate();
    }

    #[test]
    fn test_sim_to_real_switches_once_cursor_passes_wall_clock() {
        let start = Utc::now() - TimeDelta::seconds(5);
        let clock = LogicalClock::with_start_time(TimeMode::SimToReal, start);
        clock.activate();

        clock.sleep(1.0);
        assert_eq!(clock.mode(), TimeMode::SimToReal);

        // Jumping past the wall clock flips the mode permanently and resets
        // the cursor to real time.
        clock.sleep(60.0);
        assert_eq!(clock.mode(), TimeMode::Real);
        let drift = (clock.now() - Utc::now()).num_milliseconds().abs();
        assert!(drift < 1000, "cursor should track the wall clock, drift {drift}ms");
    }

    #[test]
    #[should_panic(expected = "active participant count went negative")]
    fn test_deactivate_without_activate_panics() {
        let clock = LogicalClock::new(TimeMode::Simulated);
        clock.deactivate();
    }
}
