//! Time sources for presence bookkeeping.
//!
//! Liveness is judged on a monotonic clock (`Instant`) so wall-clock steps
//! never expire or resurrect anyone. The wall clock is only used to stamp
//! `last_seen_at` for display.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// A single observation of both clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    pub instant: Instant,
    pub wall: DateTime<Utc>,
}

impl Moment {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }

    /// The moment `elapsed` after this one, on both clocks.
    pub fn after(&self, elapsed: Duration) -> Self {
        let wall_delta = chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero());
        Self {
            instant: self.instant + elapsed,
            wall: self.wall + wall_delta,
        }
    }

    /// Monotonic time elapsed since `earlier`, saturating at zero.
    pub fn since(&self, earlier: Instant) -> Duration {
        self.instant.saturating_duration_since(earlier)
    }
}

/// Source of [`Moment`]s for the registry and the heartbeat monitor.
pub trait Clock: Send + Sync {
    fn now(&self) -> Moment;
}

/// Reads the real clocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Moment {
        Moment::now()
    }
}

/// Manually advanced clock for deterministic timing tests.
#[cfg(test)]
pub struct ManualClock {
    origin: Moment,
    offset: parking_lot::Mutex<Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Moment::now(),
            offset: parking_lot::Mutex::new(Duration::ZERO),
        }
    }

    /// Jump to `ms` milliseconds after the origin.
    pub fn set_ms(&self, ms: u64) {
        *self.offset.lock() = Duration::from_millis(ms);
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// The moment `ms` milliseconds after the origin.
    pub fn at_ms(&self, ms: u64) -> Moment {
        self.origin.after(Duration::from_millis(ms))
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Moment {
        self.origin.after(*self.offset.lock())
    }
}
