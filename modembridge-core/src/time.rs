//! Time management for the bridge
//!
//! Provides clock implementations for the `TimeSource` abstraction:
//! - Monotonic clock (for all interval measurements)
//! - System clock (for reporting)
//! - Mock clock (for deterministic tests of guard times and timeouts)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub use crate::traits::time::TimeSource;

/// Timestamp in milliseconds since the clock's epoch
pub type Timestamp = u64;

/// Shared clock handle used throughout the core
pub type Clock = Arc<dyn TimeSource>;

/// Milliseconds elapsed between two timestamps, zero if `later` is earlier
#[inline]
pub fn elapsed_ms(earlier: Timestamp, later: Timestamp) -> u64 {
    later.saturating_sub(earlier)
}

/// Monotonic time source backed by `Instant`
///
/// Starts at 0 when created, always increases
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Convenience constructor returning a shared [`Clock`]
    pub fn shared() -> Clock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        false
    }

    fn precision_ms(&self) -> u32 {
        1
    }
}

/// Wall clock time source
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }

    fn precision_ms(&self) -> u32 {
        1
    }
}

/// Controllable time source for testing
///
/// Backed by an atomic so one instance can be shared (via `Arc`) between
/// the test body, receive threads and the bridge itself.
#[derive(Debug, Default)]
pub struct MockTimeSource {
    now: AtomicU64,
}

impl MockTimeSource {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Shared handle starting at `start`
    pub fn shared(start: Timestamp) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }

    fn is_wall_clock(&self) -> bool {
        false
    }

    fn precision_ms(&self) -> u32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_time_advances() {
        let time = MockTimeSource::new(1000);
        assert_eq!(time.now(), 1000);

        time.advance(500);
        assert_eq!(time.now(), 1500);

        time.set(10);
        assert_eq!(time.now(), 10);
    }

    #[test]
    fn shared_mock_is_visible_through_clock() {
        let mock = MockTimeSource::shared(0);
        let clock: Clock = mock.clone();

        mock.advance(250);
        assert_eq!(clock.now(), 250);
        assert!(!clock.is_wall_clock());
    }

    #[test]
    fn elapsed_saturates() {
        assert_eq!(elapsed_ms(100, 350), 250);
        assert_eq!(elapsed_ms(350, 100), 0);
    }

    #[test]
    fn monotonic_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
