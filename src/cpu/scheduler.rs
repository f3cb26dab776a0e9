//! Run-mode bookkeeping for continuous execution.
//!
//! The machine never runs cycles on its own. `start_running` hands out a
//! [`RunHandle`] and the host calls back once per timer tick or idle
//! callback; every `halt` bumps the generation so older handles go dead
//! immediately.

use std::time::{Duration, Instant};
use serde::{Serialize, Deserialize};

/// The machine's scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Only explicit `step` calls advance the machine.
    #[default]
    Stopped,
    /// Running at a human-visible cadence.
    Slow,
    /// Running as fast as the host will tick.
    Fast,
}

impl RunMode {
    /// Whether cycles are being scheduled.
    pub fn is_running(self) -> bool {
        self != RunMode::Stopped
    }
}

/// Host cadence for each running mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub slow: Duration,
    pub fast: Duration,
}

impl Cadence {
    /// Time between cycles for `mode`, or `None` when stopped.
    pub fn period(&self, mode: RunMode) -> Option<Duration> {
        match mode {
            RunMode::Stopped => None,
            RunMode::Slow => Some(self.slow),
            RunMode::Fast => Some(self.fast),
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            slow: Duration::from_millis(250),
            fast: Duration::ZERO,
        }
    }
}

/// Ticket for one run session, returned by `start_running`.
///
/// Not `Clone`: a session has exactly one driver.
#[derive(Debug, PartialEq, Eq)]
pub struct RunHandle {
    generation: u64,
    mode: RunMode,
}

impl RunHandle {
    /// Mode the session was started in.
    pub fn mode(&self) -> RunMode {
        self.mode
    }
}

/// Result of a scheduled cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// One cycle ran; keep ticking.
    Stepped,
    /// One cycle ran and ended the session (halt or fault).
    Stopped,
    /// The handle is stale; nothing ran and the host should drop its timer.
    Cancelled,
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    mode: RunMode,
    generation: u64,
}

impl Scheduler {
    pub(crate) fn mode(&self) -> RunMode {
        self.mode
    }

    pub(crate) fn start(&mut self, mode: RunMode) -> RunHandle {
        self.generation += 1;
        self.mode = mode;
        RunHandle { generation: self.generation, mode }
    }

    /// Stop and invalidate every outstanding handle. Returns whether the
    /// mode changed.
    pub(crate) fn stop(&mut self) -> bool {
        self.generation += 1;
        let was_running = self.mode.is_running();
        self.mode = RunMode::Stopped;
        was_running
    }

    pub(crate) fn is_live(&self, handle: &RunHandle) -> bool {
        handle.generation == self.generation && self.mode.is_running()
    }
}

/// Deadline tracker for hosts driven by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    period: Duration,
    next_due: Instant,
}

impl Pacer {
    /// First cycle is due immediately.
    pub fn new(period: Duration, now: Instant) -> Self {
        Self { period, next_due: now }
    }

    /// Returns true when a cycle is due at `now`, and books the next one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.period;
        true
    }

    /// How long the host may sleep before the next cycle.
    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }
}
