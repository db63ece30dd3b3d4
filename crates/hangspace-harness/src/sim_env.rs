//! Simulated environment with a virtual clock and seeded RNG.
//!
//! Time only moves when the test says so ([`SimEnv::advance`]) or when code
//! sleeps through the environment. Randomness comes from a ChaCha stream
//! seeded per run, so a failing seed replays exactly.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use hangspace_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Point on the virtual monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Start of the simulation.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Time since the simulation started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

/// Deterministic environment. Clones share the clock and RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    seed: u64,
    elapsed: Arc<Mutex<Duration>>,
    wall_base: DateTime<Utc>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment whose RNG is seeded with `seed`.
    ///
    /// The wall clock starts at 2026-01-05 09:00 UTC.
    pub fn with_seed(seed: u64) -> Self {
        let wall_base = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).single().unwrap_or_default();
        Self {
            seed,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            wall_base,
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Seed this environment was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        *lock(&self.elapsed) += by;
    }

    /// Time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        *lock(&self.elapsed)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_default();
        self.wall_base + elapsed
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        lock(&self.rng).fill_bytes(buffer);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_moves_when_advanced() {
        let env = SimEnv::with_seed(1);
        let t0 = env.now();
        assert_eq!(env.now(), t0);

        env.advance(Duration::from_millis(250));
        assert_eq!(env.now() - t0, Duration::from_millis(250));
        assert_eq!(env.now(), t0 + Duration::from_millis(250));
    }

    #[test]
    fn wall_clock_tracks_virtual_time() {
        let env = SimEnv::with_seed(1);
        let start = env.wall_clock();
        env.advance(Duration::from_secs(90));
        assert_eq!((env.wall_clock() - start).num_seconds(), 90);
    }

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        assert_eq!(a.random_u64(), b.random_u64());
        assert_ne!(a.random_u64(), SimEnv::with_seed(43).random_u64());
    }

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::with_seed(0);
        let other = env.clone();
        env.advance(Duration::from_secs(1));
        assert_eq!(other.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn earlier_minus_later_saturates() {
        let t0 = SimInstant::ZERO;
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(t0 - t1, Duration::ZERO);
    }
}
