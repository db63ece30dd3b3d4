//! Wall-clock environment for the CLI.
//!
//! Monotonic time comes from `std::time::Instant`, message timestamps from the
//! system calendar clock, the correlation-id session nonce from the OS RNG,
//! and sleeps from tokio.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hangspace_core::env::Environment;

/// [`Environment`] backed by the operating system.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// The system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG is available");
    }
}
