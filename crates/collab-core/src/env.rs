//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). Enables
//! deterministic simulation with [`test_utils::MockEnv`] (virtual clock,
//! counter-based RNG) and production use with real system resources
//! (`collab_server::system_env::SystemEnv`).

use std::time::Duration;

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time (e.g., [`test_utils::MockEnv`]'s
    /// `Duration`-since-start).
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - This method MUST return values that never decrease within a single
    ///   execution context. Subsequent calls must return times >= previous
    ///   calls.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time in milliseconds, used to stamp presence
    /// records (§3 `PresenceRecord.timestamp`) and to drive the heartbeat
    /// tick's TTL comparisons (§4.3). Distinct from [`Self::now`] because the
    /// latter's `Instant` type is opaque and simulation environments use
    /// virtual time unrelated to the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not protocol logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// This is a convenience method for common use cases like generating
    /// session IDs or request IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    ///
    /// Useful for UUIDs or room IDs.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}

/// A deterministic [`Environment`] for unit tests across crate boundaries.
///
/// Exposed unconditionally (not `#[cfg(test)]`) so downstream crates'
/// `#[cfg(test)]` modules can depend on it without a dev-dependency cycle.
pub mod test_utils {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU8, AtomicU64, Ordering},
        },
        time::Duration,
    };

    use super::Environment;

    /// Virtual-time, counter-randomness environment for tests.
    ///
    /// Time only advances via [`MockEnv::advance`]; `random_bytes` fills with
    /// a wrapping byte counter, so output is deterministic and distinct
    /// across successive calls within a test.
    #[derive(Clone)]
    pub struct MockEnv {
        now_millis: Arc<AtomicU64>,
        counter: Arc<AtomicU8>,
    }

    impl MockEnv {
        /// Construct a `MockEnv` starting at virtual time zero.
        #[must_use]
        pub fn new() -> Self {
            Self { now_millis: Arc::new(AtomicU64::new(0)), counter: Arc::new(AtomicU8::new(0)) }
        }

        /// Advance virtual time by `by`.
        pub fn advance(&self, by: Duration) {
            #[allow(clippy::cast_possible_truncation)]
            self.now_millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::from_millis(self.now_millis.load(Ordering::SeqCst))
        }

        fn now_ms(&self) -> i64 {
            #[allow(clippy::cast_possible_wrap)]
            let ms = self.now_millis.load(Ordering::SeqCst) as i64;
            ms
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for byte in buffer.iter_mut() {
                *byte = self.counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
