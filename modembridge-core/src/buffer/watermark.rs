//! Watermark classification of buffer fill levels
//!
//! A watermark level is a pure function of the fill ratio
//! `used / capacity`, where capacity is both regions together. Thresholds
//! are precomputed in bytes whenever the region size changes.
//!
//! ```text
//!  0%    5%        20%                       80%        95%   100%
//!  ├─────┼─────────┼─────────────────────────┼──────────┼──────┤
//!  Empty    Low              Normal              High   Critical
//! ```

use crate::constants::buffers::{
    WATERMARK_CRITICAL_PCT, WATERMARK_EMPTY_PCT, WATERMARK_HIGH_PCT, WATERMARK_LOW_PCT,
};

/// Discrete fill level, ordered from emptiest to fullest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WatermarkLevel {
    /// At or below 5%
    #[default]
    Empty,
    /// At or below 20%
    Low,
    /// Between 20% and 80%
    Normal,
    /// At or above 80%
    High,
    /// At or above 95%
    Critical,
}

impl WatermarkLevel {
    /// Level at which backpressure is applied
    pub fn applies_backpressure(self) -> bool {
        self >= WatermarkLevel::High
    }

    /// Level at which backpressure is released
    pub fn releases_backpressure(self) -> bool {
        self <= WatermarkLevel::Low
    }
}

/// Byte thresholds derived from a capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkThresholds {
    capacity: usize,
    critical: usize,
    high: usize,
    low: usize,
    empty: usize,
}

impl WatermarkThresholds {
    /// Derive thresholds for a total capacity in bytes
    pub fn for_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            critical: capacity * WATERMARK_CRITICAL_PCT / 100,
            high: capacity * WATERMARK_HIGH_PCT / 100,
            low: capacity * WATERMARK_LOW_PCT / 100,
            empty: capacity * WATERMARK_EMPTY_PCT / 100,
        }
    }

    /// Classify a fill level
    ///
    /// Monotonic in `used`: more bytes never yields a lower level.
    pub fn classify(&self, used: usize) -> WatermarkLevel {
        if used >= self.critical {
            WatermarkLevel::Critical
        } else if used >= self.high {
            WatermarkLevel::High
        } else if used <= self.empty {
            WatermarkLevel::Empty
        } else if used <= self.low {
            WatermarkLevel::Low
        } else {
            WatermarkLevel::Normal
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn high(&self) -> usize {
        self.high
    }

    pub fn low(&self) -> usize {
        self.low
    }
}
