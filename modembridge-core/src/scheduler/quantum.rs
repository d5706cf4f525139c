//! Adaptive quantum and fair-weight computation
//!
//! Both are pure functions of the observed backlog and latency so they can
//! be tested without a running scheduler.

use crate::config::SchedulingConfig;
use crate::constants::scheduling::{
    BACKLOG_GROW_FACTOR, BACKLOG_HIGH_BYTES, BACKLOG_LOW_BYTES, BACKLOG_SHRINK_FACTOR,
    FAIR_WEIGHT_FAVOURED, FAIR_WEIGHT_NEUTRAL, FAIR_WEIGHT_TOTAL, IMBALANCE_MIN_QUANTUM_RATIO,
    LATENCY_HALVE_FACTOR, LATENCY_HALVE_MS, LATENCY_REDUCE_FACTOR, LATENCY_REDUCE_MS,
    WEIGHT_IMBALANCE_RATIO,
};

/// Recompute the quantum from the base length
///
/// ```text
/// combined backlog > 4096  → × 0.5
/// combined backlog < 512   → × 1.5
/// imbalance ratio  > 3     → minimum quantum
/// average latency  > 200ms → × 0.5
/// average latency  > 100ms → × 0.75
/// result clamped to [min, max]
/// ```
///
/// The imbalance ratio only applies while both directions have backlog.
pub fn adaptive_quantum(config: &SchedulingConfig, backlog: [usize; 2], avg_latency_ms: f32) -> u64 {
    if imbalance_ratio(backlog) > IMBALANCE_MIN_QUANTUM_RATIO {
        return config.min_quantum_ms;
    }

    let total = backlog[0] + backlog[1];
    let mut quantum = config.base_quantum_ms as f32;

    if total > BACKLOG_HIGH_BYTES {
        quantum *= BACKLOG_SHRINK_FACTOR;
    } else if total < BACKLOG_LOW_BYTES {
        quantum *= BACKLOG_GROW_FACTOR;
    }

    if avg_latency_ms > LATENCY_HALVE_MS {
        quantum *= LATENCY_HALVE_FACTOR;
    } else if avg_latency_ms > LATENCY_REDUCE_MS {
        quantum *= LATENCY_REDUCE_FACTOR;
    }

    clamp_quantum(config, quantum as u64)
}

/// Larger backlog over smaller, or 1.0 unless both directions have data
pub fn imbalance_ratio(backlog: [usize; 2]) -> f32 {
    let (small, large) = if backlog[0] <= backlog[1] {
        (backlog[0], backlog[1])
    } else {
        (backlog[1], backlog[0])
    };
    if small == 0 {
        return 1.0;
    }
    large as f32 / small as f32
}

/// Fair weights: 7:3 toward a direction with more than twice the other's
/// backlog, otherwise 5:5
pub fn rebalance_weights(backlog: [usize; 2]) -> [u8; 2] {
    let favoured = FAIR_WEIGHT_FAVOURED;
    let other = FAIR_WEIGHT_TOTAL - FAIR_WEIGHT_FAVOURED;

    if backlog[0] as f32 > backlog[1] as f32 * WEIGHT_IMBALANCE_RATIO {
        [favoured, other]
    } else if backlog[1] as f32 > backlog[0] as f32 * WEIGHT_IMBALANCE_RATIO {
        [other, favoured]
    } else {
        [FAIR_WEIGHT_NEUTRAL, FAIR_WEIGHT_NEUTRAL]
    }
}

/// Scale a value by a direction's weight relative to the neutral weight
pub fn weighted(value: u64, weight: u8) -> u64 {
    value * weight as u64 / FAIR_WEIGHT_NEUTRAL as u64
}

pub fn clamp_quantum(config: &SchedulingConfig, quantum_ms: u64) -> u64 {
    quantum_ms.clamp(config.min_quantum_ms, config.max_quantum_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlog_shapes_quantum() {
        let config = SchedulingConfig::default();
        assert_eq!(adaptive_quantum(&config, [0, 0], 0.0), 75);
        assert_eq!(adaptive_quantum(&config, [1000, 1000], 0.0), 50);
        assert_eq!(adaptive_quantum(&config, [3000, 3000], 0.0), 25);
    }

    #[test]
    fn imbalance_forces_minimum() {
        let config = SchedulingConfig::default();
        assert_eq!(adaptive_quantum(&config, [4000, 1000], 0.0), config.min_quantum_ms);
        // One idle direction is not imbalance
        assert_eq!(adaptive_quantum(&config, [1000, 0], 0.0), 50);
    }

    #[test]
    fn latency_trims_quantum() {
        let config = SchedulingConfig::default();
        assert_eq!(adaptive_quantum(&config, [1000, 1000], 150.0), 37);
        assert_eq!(adaptive_quantum(&config, [1000, 1000], 250.0), 25);
        assert_eq!(adaptive_quantum(&config, [3000, 3000], 250.0), 12);
    }

    #[test]
    fn result_is_clamped() {
        let config = SchedulingConfig {
            base_quantum_ms: 190,
            ..SchedulingConfig::default()
        };
        assert_eq!(adaptive_quantum(&config, [0, 0], 0.0), config.max_quantum_ms);
    }

    #[test]
    fn weights_follow_backlog() {
        assert_eq!(rebalance_weights([0, 0]), [5, 5]);
        assert_eq!(rebalance_weights([300, 100]), [7, 3]);
        assert_eq!(rebalance_weights([100, 300]), [3, 7]);
        assert_eq!(rebalance_weights([150, 100]), [5, 5]);
    }

    #[test]
    fn weighted_scaling() {
        assert_eq!(weighted(50, 7), 70);
        assert_eq!(weighted(50, 3), 30);
        assert_eq!(weighted(2048, 5), 2048);
    }
}
