//! Time Source Abstraction
//!
//! This module provides the `TimeSource` trait which abstracts the clock
//! used by every time-dependent rule in the bridge: escape guard times,
//! line-assembly timeouts, quantum expiry, starvation detection, state
//! timeouts and resize cool-downs.
//!
//! ## Design Goals
//!
//! - **Testability**: Guard times and starvation thresholds are seconds long;
//!   tests drive them with a mock clock instead of sleeping
//! - **Thread Safety**: The clock is shared by receive threads and the
//!   management thread
//! - **Efficiency**: A single millisecond counter, no allocation
//!
//! ## Common Implementations
//!
//! - `MonotonicClock`: `Instant`-based, milliseconds since creation
//! - `SystemClock`: Wall clock, milliseconds since the Unix epoch
//! - `MockTimeSource`: Settable atomic clock for deterministic tests

use crate::time::Timestamp;

/// Source of time for the bridge
///
/// ## Implementation Requirements
///
/// - `now()` is called from several threads and must be thread-safe
/// - Monotonic sources must never go backwards; consumers use
///   saturating arithmetic but a backwards clock delays timeouts
/// - Precision should be documented for each implementation
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in milliseconds
    ///
    /// The epoch depends on the implementation:
    /// - Monotonic sources: milliseconds since the clock was created
    /// - Wall clock sources: milliseconds since Unix epoch
    /// - Test sources: arbitrary starting point
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs monotonic)
    fn is_wall_clock(&self) -> bool;

    /// Get precision in milliseconds
    fn precision_ms(&self) -> u32;
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn is_wall_clock(&self) -> bool {
        (**self).is_wall_clock()
    }

    fn precision_ms(&self) -> u32 {
        (**self).precision_ms()
    }
}
