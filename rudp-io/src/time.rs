//! Time utilities for RUDP drivers
//!
//! Connection drivers block on the socket for a bounded time. [`Deadline`]
//! models a caller's optional cut-off, and [`Deadline::wait_until`] combines
//! it with the connection's own next timer to produce the socket timeout.

use std::time::{Duration, Instant};

/// Optional point in time after which an operation gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No cut-off
    pub const fn never() -> Self {
        Deadline(None)
    }

    /// Cut-off at a fixed instant
    pub const fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    /// Cut-off `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Deadline(Instant::now().checked_add(timeout))
    }

    /// Cut-off `timeout` from now, or none for `None`
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or(Self::never(), Self::after)
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Check whether the deadline has passed at `now`
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.0.is_some_and(|at| now >= at)
    }

    /// Time left at `now`, `None` if there is no deadline
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(now))
    }

    /// How long to block at `now` given another wake-up instant
    ///
    /// Returns the time until whichever of the deadline and `wake` comes
    /// first, or `None` when neither is set.
    pub fn wait_until(&self, now: Instant, wake: Option<Instant>) -> Option<Duration> {
        let earliest = match (self.0, wake) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        earliest.map(|at| at.saturating_duration_since(now))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::never()
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Deadline::at(instant)
    }
}

/// Timer for periodic operations
///
/// Used for idle detection and periodic statistics reports.
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a new timer with the given interval
    pub fn new(interval: Duration) -> Self {
        Timer {
            interval,
            last_fire: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the timer has expired
    pub fn expired(&self) -> bool {
        self.last_fire.elapsed() >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.last_fire = Instant::now();
    }

    /// Get time until next expiration
    pub fn time_until_expiration(&self) -> Duration {
        self.interval.saturating_sub(self.last_fire.elapsed())
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self) -> bool {
        if self.expired() {
            self.reset();
            true
        } else {
            false
        }
    }
}
