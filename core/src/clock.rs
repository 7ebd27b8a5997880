//! Simulation clock: scaled wall time with pause and resume.
//!
//! Simulated time = elapsed wall seconds × rate + time accumulated before
//! the last pause. While paused the accumulated value is returned as-is,
//! so every read during a pause is bit-for-bit identical.

use crate::{
    error::{SimError, SimResult},
    types::SimTime,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Returned by [`WorldClock::now`] before [`WorldClock::start`].
pub const CLOCK_NOT_STARTED: SimTime = -1.0;

/// Source of monotonic wall-clock seconds.
pub trait TimeSource: Send + Sync {
    fn wall_seconds(&self) -> f64;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn wall_seconds(&self) -> f64 {
        (**self).wall_seconds()
    }
}

/// Real wall time, measured from construction.
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn wall_seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Wall time that only moves when told to. Used by tests and replays
/// of a fixed schedule.
#[derive(Default)]
pub struct ManualTimeSource {
    seconds: Mutex<f64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        let mut now = self.seconds.lock().unwrap_or_else(PoisonError::into_inner);
        *now += seconds.max(0.0);
    }

    pub fn set(&self, seconds: f64) {
        let mut now = self.seconds.lock().unwrap_or_else(PoisonError::into_inner);
        if seconds > *now {
            *now = seconds;
        }
    }
}

impl TimeSource for ManualTimeSource {
    fn wall_seconds(&self) -> f64 {
        *self.seconds.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy)]
struct ClockState {
    started:     bool,
    paused:      bool,
    origin_wall: f64,
    accumulated: SimTime,
    rate:        u32,
}

pub struct WorldClock {
    source:   Box<dyn TimeSource>,
    state:    Mutex<ClockState>,
    duration: SimTime,
}

impl WorldClock {
    /// `rate` is simulated seconds per wall second, `duration` the total
    /// simulated length of the run.
    pub fn new(source: Box<dyn TimeSource>, rate: u32, duration: SimTime) -> SimResult<Self> {
        if rate == 0 {
            return Err(SimError::InvalidTimeRate { rate: 0 });
        }
        Ok(Self {
            source,
            state: Mutex::new(ClockState {
                started:     false,
                paused:      false,
                origin_wall: 0.0,
                accumulated: 0.0,
                rate,
            }),
            duration,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self, state: &ClockState) -> SimTime {
        if !state.started {
            return CLOCK_NOT_STARTED;
        }
        if state.paused {
            return state.accumulated;
        }
        let elapsed = (self.source.wall_seconds() - state.origin_wall).max(0.0);
        elapsed * f64::from(state.rate) + state.accumulated
    }

    /// Reset the origin to now, clear accumulated time, and un-pause.
    pub fn start(&self) {
        let mut state = self.lock();
        state.origin_wall = self.source.wall_seconds();
        state.accumulated = 0.0;
        state.paused = false;
        state.started = true;
    }

    /// Freeze the current simulated time.
    pub fn pause(&self) {
        let mut state = self.lock();
        if !state.started || state.paused {
            return;
        }
        state.accumulated = self.read(&state);
        state.paused = true;
    }

    /// Continue from the frozen value.
    pub fn resume(&self) {
        let mut state = self.lock();
        if !state.paused {
            return;
        }
        state.origin_wall = self.source.wall_seconds();
        state.paused = false;
    }

    /// Simulated seconds, or [`CLOCK_NOT_STARTED`] before `start`.
    pub fn now(&self) -> SimTime {
        let state = self.lock();
        self.read(&state)
    }

    /// Like [`now`](Self::now) but as an error when the clock is not running yet.
    pub fn try_now(&self) -> SimResult<SimTime> {
        let state = self.lock();
        if !state.started {
            return Err(SimError::ClockNotStarted);
        }
        Ok(self.read(&state))
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn time_rate(&self) -> u32 {
        self.lock().rate
    }

    /// Change the rate without a jump in simulated time.
    pub fn set_time_rate(&self, rate: i64) -> SimResult<()> {
        let rate = u32::try_from(rate)
            .ok()
            .filter(|r| *r > 0)
            .ok_or(SimError::InvalidTimeRate { rate })?;
        let mut state = self.lock();
        if state.started && !state.paused {
            state.accumulated = self.read(&state);
            state.origin_wall = self.source.wall_seconds();
        }
        state.rate = rate;
        Ok(())
    }

    pub fn duration(&self) -> SimTime {
        self.duration
    }

    /// True once simulated time has passed the configured total duration.
    pub fn is_elapsed(&self) -> bool {
        self.now() > self.duration
    }

    /// Wall-clock seconds needed to cover `sim_seconds` at the current rate.
    pub fn wall_seconds_for(&self, sim_seconds: SimTime) -> f64 {
        sim_seconds.max(0.0) / f64::from(self.time_rate())
    }
}
