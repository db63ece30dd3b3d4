//! Environment abstraction for deterministic testing.
//!
//! Decouples client logic from system resources (time, randomness). Enables
//! deterministic simulation with a virtual clock and seeded RNG, and
//! production use with real system resources.

use std::{ops::Sub, time::Duration};

use chrono::{DateTime, Utc};

/// Monotonic instant usable by the state machines.
///
/// Production uses `std::time::Instant`; simulation uses a virtual instant.
pub trait MonotonicInstant: Copy + Ord + Send + Sync + Sub<Output = Duration> {}

impl<T> MonotonicInstant for T where T: Copy + Ord + Send + Sync + Sub<Output = Duration> {}

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `wall_clock()` is only used for display and message timestamps, never
///   for timeouts
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    type Instant: MonotonicInstant;

    /// Current time (monotonic). Drives debounce, backoff and TTL timers.
    fn now(&self) -> Self::Instant;

    /// Current calendar time in UTC.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not client logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same RNG seed, this produces the same sequence of bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for the session nonce embedded in message correlation ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Deterministic environment for unit tests in this and dependent crates.
pub mod test_utils {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    };

    use chrono::{DateTime, TimeZone, Utc};

    use super::Environment;

    /// Manually advanced clock with a counter-based RNG.
    ///
    /// Clones share the same clock.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        base: Instant,
        wall_base: DateTime<Utc>,
        elapsed_ms: Arc<AtomicU64>,
        rng_state: Arc<AtomicU64>,
    }

    impl MockEnv {
        /// Clock starting at 2026-01-05 09:00 UTC (a Monday).
        pub fn new() -> Self {
            let wall_base = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).single().unwrap_or_default();
            Self {
                base: Instant::now(),
                wall_base,
                elapsed_ms: Arc::new(AtomicU64::new(0)),
                rng_state: Arc::new(AtomicU64::new(0x9E37_79B9_7F4A_7C15)),
            }
        }

        /// Move both clocks forward.
        pub fn advance(&self, by: Duration) {
            self.elapsed_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }

        fn elapsed(&self) -> Duration {
            Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            self.base + self.elapsed()
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
            for chunk in buffer.chunks_mut(8) {
                // splitmix64
                let mut z = self.rng_state.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::SeqCst);
                z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
                z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
                z ^= z >> 31;
                chunk.copy_from_slice(&z.to_be_bytes()[..chunk.len()]);
            }
        }
    }
}
