//! Per-direction chunk latency tracking and violation checks

use crate::constants::scheduling::{LATENCY_EMA_ALPHA, LATENCY_PEAK_DECAY};

/// Outcome of a latency check
///
/// `None` is the "no violation" result; it is a normal value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LatencyViolation {
    #[default]
    None,
    Warning,
    Critical,
}

impl LatencyViolation {
    pub fn is_violation(self) -> bool {
        self != LatencyViolation::None
    }
}

/// Exponential moving average plus a decaying peak
///
/// ```text
/// avg  ← α·sample + (1 − α)·avg          α = 0.2
/// peak ← max(sample, peak · 0.9)
/// ```
///
/// The peak decays so that one slow chunk does not hold a direction in
/// violation forever.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LatencyTracker {
    average_ms: f32,
    peak_ms: f32,
    last_ms: u64,
    samples: u64,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one chunk's processing latency
    pub fn record(&mut self, latency_ms: u64) {
        let sample = latency_ms as f32;
        self.average_ms = if self.samples == 0 {
            sample
        } else {
            LATENCY_EMA_ALPHA * sample + (1.0 - LATENCY_EMA_ALPHA) * self.average_ms
        };
        self.peak_ms = sample.max(self.peak_ms * LATENCY_PEAK_DECAY);
        self.last_ms = latency_ms;
        self.samples += 1;
    }

    /// Classify against warning/critical thresholds
    ///
    /// Critical when the average exceeds the critical threshold; warning
    /// when the average exceeds the warning threshold or the peak exceeds
    /// the critical one.
    pub fn check(&self, warning_ms: f32, critical_ms: f32) -> LatencyViolation {
        if self.samples == 0 {
            return LatencyViolation::None;
        }
        if self.average_ms > critical_ms {
            LatencyViolation::Critical
        } else if self.average_ms > warning_ms || self.peak_ms > critical_ms {
            LatencyViolation::Warning
        } else {
            LatencyViolation::None
        }
    }

    pub fn average_ms(&self) -> f32 {
        self.average_ms
    }

    pub fn peak_ms(&self) -> f32 {
        self.peak_ms
    }

    pub fn last_ms(&self) -> u64 {
        self.last_ms
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}
