//! Cancellable scheduled tasks.
//!
//! A [`Timer`] is a single-shot deadline owned by the component that armed it.
//! Components poll their timers from `tick(now)`; nothing fires on its own, so
//! dropping or cancelling a timer is all the teardown there is.

use std::time::Duration;

use crate::env::MonotonicInstant;

/// Single-shot timer with a fixed period.
///
/// Re-arming an armed timer restarts the period from the new instant, which is
/// exactly the debounce behavior.
#[derive(Debug, Clone, Copy)]
pub struct Timer<I> {
    period: Duration,
    armed_at: Option<I>,
}

impl<I: MonotonicInstant> Timer<I> {
    /// Create a disarmed timer.
    pub fn new(period: Duration) -> Self {
        Self { period, armed_at: None }
    }

    /// Period between arming and expiry.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Change the period. Takes effect from the next `arm`.
    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    /// Start (or restart) the countdown at `now`.
    pub fn arm(&mut self, now: I) {
        self.armed_at = Some(now);
    }

    /// Stop the countdown without firing.
    pub fn cancel(&mut self) {
        self.armed_at = None;
    }

    /// Whether a countdown is in progress.
    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Fire if the period has elapsed.
    ///
    /// Returns `true` exactly once per arming; the timer is disarmed when it
    /// fires.
    pub fn poll(&mut self, now: I) -> bool {
        match self.armed_at {
            Some(at) if now - at >= self.period => {
                self.armed_at = None;
                true
            },
            _ => false,
        }
    }
}
