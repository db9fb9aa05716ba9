//! Time sources for rate limit decisions.

use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use super::state::Timestamp;

/// Clock abstraction so timing can be faked in tests.
///
/// Implementations must never go backwards; every algorithm computes
/// `now - last` durations from consecutive readings.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock anchored to the wall clock once, at construction.
///
/// Readings advance with `Instant` so they never regress, while staying
/// close enough to UTC for epoch-aligned windows. Drift from the system
/// clock accumulates over the lifetime of the process.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Timestamp,
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Utc::now(),
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let elapsed = chrono::Duration::from_std(self.start.elapsed())
            .unwrap_or(chrono::Duration::MAX);
        self.origin
            .checked_add_signed(elapsed)
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC)
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        *now = now.checked_add_signed(delta).unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
    }

    /// Jump to `to`. Callers are responsible for not moving backwards.
    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
