//! Backpressure control for the adaptive buffers
//!
//! Signals producers to stop when a buffer fills and lets them resume once
//! the consumer has caught up. Apply and release use different watermarks
//! so a buffer hovering around one threshold does not oscillate.

use crate::buffer::watermark::WatermarkLevel;
use crate::time::{elapsed_ms, Timestamp};

/// Result of feeding a new level into the control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureChange {
    /// Nothing changed
    Unchanged,
    /// Backpressure became active
    Applied,
    /// Backpressure was released after being active for `held_ms`
    Released { held_ms: u64 },
}

/// Hysteretic backpressure state
///
/// ## Hysteresis
///
/// ```text
///            apply at High/Critical
///   ┌──────────┐ ───────────────→ ┌──────────┐
///   │ flowing  │                  │ paused   │
///   └──────────┘ ←─────────────── └──────────┘
///            release at Low/Empty
///
///   Normal neither applies nor releases.
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BackpressureControl {
    active: bool,
    since: Option<Timestamp>,
    activations: u64,
}

impl BackpressureControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from the current level
    pub fn update(&mut self, level: WatermarkLevel, now: Timestamp) -> BackpressureChange {
        if !self.active && level.applies_backpressure() {
            self.active = true;
            self.since = Some(now);
            self.activations += 1;
            BackpressureChange::Applied
        } else if self.active && level.releases_backpressure() {
            let held_ms = self.since.map_or(0, |since| elapsed_ms(since, now));
            self.active = false;
            self.since = None;
            BackpressureChange::Released { held_ms }
        } else {
            BackpressureChange::Unchanged
        }
    }

    /// Check if producers should pause
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When backpressure was applied, if active
    pub fn active_since(&self) -> Option<Timestamp> {
        self.since
    }

    /// Number of times backpressure was applied
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Force release regardless of level
    pub fn reset(&mut self) {
        self.active = false;
        self.since = None;
    }
}
