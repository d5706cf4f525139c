//! Fair Quantum Scheduler
//!
//! ## Overview
//!
//! The serial link is half-duplex, so the two pipelines take turns. The
//! scheduler decides, one chunk at a time, which direction runs:
//!
//! ```text
//!  next_direction(now, backlog)
//!   │
//!   ├─ 1. quantum expired (time or byte budget)?  → flip, re-adapt quantum
//!   ├─ 2. latency violation in either direction?  → minimum quantum, reweigh
//!   ├─ 3. other direction starving?               → force it, maximum quantum
//!   ├─ 4. current direction empty, other not?     → work-conserving switch
//!   └─ current direction (or None when both are idle)
//!
//!  … caller processes one chunk …
//!
//!  complete(direction, bytes, latency, now_after)   ← last-serviced updated
//! ```
//!
//! ## Starvation
//!
//! A direction with backlog is starving when its wait since last service
//! exceeds the starvation threshold; a forced switch also happens once the
//! wait exceeds 1.5 × the latency bound. Directions with no backlog are
//! never starving: their last-serviced time tracks `now` while idle.
//! Last-serviced is updated in [`FairScheduler::complete`], after the chunk
//! ran, so a slow chunk does not make its own direction look starved.
//!
//! ## Low-Speed Links
//!
//! At or below 2400 baud the latency bound and starvation threshold are
//! relaxed × 1.5 and the latency violation thresholds × 2.

pub mod latency;
pub mod quantum;

use crate::config::SchedulingConfig;
use crate::constants::scheduling::{
    FORCED_SWITCH_FACTOR, LOW_SPEED_BOUND_FACTOR, LOW_SPEED_VIOLATION_FACTOR,
};
use crate::pipeline::Direction;
use crate::time::{elapsed_ms, Timestamp};

pub use latency::{LatencyTracker, LatencyViolation};

/// Why the scheduler last changed direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SwitchReason {
    #[default]
    Initial,
    QuantumExpired,
    Starvation,
    WorkConserving,
}

/// Scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SchedulerStats {
    /// Scheduling decisions taken
    pub cycles: u64,
    /// Direction flips on quantum expiry
    pub quantum_switches: u64,
    /// Switches forced by starvation or wait over the latency bound
    pub forced_switches: u64,
    /// Forced switches where the wait exceeded the starvation threshold
    pub starvation_events: u64,
    /// Entries into latency violation
    pub latency_violations: u64,
    /// Switches away from an empty direction
    pub work_conserving_switches: u64,
    /// Bytes served per direction
    pub bytes_served: [u64; 2],
    /// Chunks processed per direction
    pub chunks: [u64; 2],
}

/// Point-in-time scheduler view
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SchedulerSnapshot {
    pub current: Direction,
    pub last_switch: SwitchReason,
    pub quantum_ms: u64,
    pub weights: [u8; 2],
    pub violation: LatencyViolation,
    pub latency: [LatencyTracker; 2],
    pub fairness_ratio: f32,
    pub stats: SchedulerStats,
}

/// Quantum-based, latency-aware scheduler for the two pipelines
#[derive(Debug, Clone)]
pub struct FairScheduler {
    config: SchedulingConfig,
    low_speed: bool,
    current: Direction,
    last_switch: SwitchReason,
    quantum_start: Timestamp,
    current_quantum_ms: u64,
    bytes_in_quantum: usize,
    consecutive_slices: u32,
    last_serviced: [Timestamp; 2],
    weights: [u8; 2],
    latency: [LatencyTracker; 2],
    violation: LatencyViolation,
    stats: SchedulerStats,
}

impl FairScheduler {
    /// Create a scheduler for a link running at `baud_rate`
    pub fn new(config: SchedulingConfig, baud_rate: u32, now: Timestamp) -> Self {
        let low_speed = baud_rate <= config.low_speed_baud;
        if low_speed {
            log_info!("Low-speed link ({} baud): relaxing latency bounds", baud_rate);
        }
        Self {
            low_speed,
            current: Direction::SerialToNetwork,
            last_switch: SwitchReason::Initial,
            quantum_start: now,
            current_quantum_ms: config.base_quantum_ms,
            bytes_in_quantum: 0,
            consecutive_slices: 0,
            last_serviced: [now; 2],
            weights: config.weights,
            latency: [LatencyTracker::new(); 2],
            violation: LatencyViolation::None,
            stats: SchedulerStats::default(),
            config,
        }
    }

    // ========================================================================
    // Decisions
    // ========================================================================

    /// Choose the direction to service next
    ///
    /// `backlog` is the pending byte count per direction, indexed by
    /// [`Direction::index`]. Returns `None` when neither has work.
    pub fn next_direction(&mut self, now: Timestamp, backlog: [usize; 2]) -> Option<Direction> {
        self.stats.cycles += 1;

        for direction in Direction::ALL {
            if backlog[direction.index()] == 0 {
                self.last_serviced[direction.index()] = now;
            }
        }

        // 1. Quantum expiry
        let current = self.current;
        let expired = elapsed_ms(self.quantum_start, now) >= self.quantum_for(current)
            || self.bytes_in_quantum >= self.byte_budget(current);
        if expired {
            if self.config.adaptive_quantum {
                self.current_quantum_ms =
                    quantum::adaptive_quantum(&self.config, backlog, self.worst_average_latency());
            }
            if self.config.fair_queue {
                self.weights = quantum::rebalance_weights(backlog);
            }
            self.switch_to(current.other(), now, SwitchReason::QuantumExpired);
            self.stats.quantum_switches += 1;
        }

        // 2. Latency bounds
        let violation = self.check_latency();
        if violation.is_violation() {
            if !self.violation.is_violation() {
                self.stats.latency_violations += 1;
                log_warn!("Latency violation ({:?}), forcing minimum quantum", violation);
            }
            self.current_quantum_ms = self.config.min_quantum_ms;
            self.weights = quantum::rebalance_weights(backlog);
        }
        self.violation = violation;

        // 3. Starvation
        let other = self.current.other();
        if backlog[other.index()] > 0 {
            let waited = elapsed_ms(self.last_serviced[other.index()], now);
            let starving = waited > self.starvation_threshold_ms();
            let over_bound = waited as f32 > FORCED_SWITCH_FACTOR * self.latency_bound_ms();
            if starving || over_bound {
                if starving {
                    self.stats.starvation_events += 1;
                }
                self.stats.forced_switches += 1;
                log_debug!("Forced switch to {} after {}ms wait", other, waited);
                self.switch_to(other, now, SwitchReason::Starvation);
                self.current_quantum_ms = self.config.max_quantum_ms;
            }
        }

        // 4. Work conservation
        let current = self.current;
        if backlog[current.index()] == 0 {
            if backlog[current.other().index()] == 0 {
                return None;
            }
            self.switch_to(current.other(), now, SwitchReason::WorkConserving);
            self.stats.work_conserving_switches += 1;
        }

        Some(self.current)
    }

    /// Record a processed chunk
    ///
    /// `now_after` is the time after processing finished.
    pub fn complete(&mut self, direction: Direction, bytes: usize, latency_ms: u64, now_after: Timestamp) {
        let idx = direction.index();
        self.last_serviced[idx] = now_after;
        self.latency[idx].record(latency_ms);
        self.stats.bytes_served[idx] += bytes as u64;
        self.stats.chunks[idx] += 1;
        if direction == self.current {
            self.bytes_in_quantum += bytes;
            self.consecutive_slices += 1;
        }
    }

    /// Worst latency classification over both directions
    pub fn check_latency(&self) -> LatencyViolation {
        let factor = if self.low_speed {
            LOW_SPEED_VIOLATION_FACTOR
        } else {
            1.0
        };
        let warning = self.config.latency_warning_ms as f32 * factor;
        let critical = self.config.latency_critical_ms as f32 * factor;

        self.latency
            .iter()
            .map(|tracker| tracker.check(warning, critical))
            .max()
            .unwrap_or_default()
    }

    // ========================================================================
    // Quantum accounting
    // ========================================================================

    /// Quantum length for `direction` at its current weight
    pub fn quantum_for(&self, direction: Direction) -> u64 {
        let weighted = quantum::weighted(self.current_quantum_ms, self.weights[direction.index()]);
        quantum::clamp_quantum(&self.config, weighted)
    }

    /// Byte budget for `direction` at its current weight
    pub fn byte_budget(&self, direction: Direction) -> usize {
        quantum::weighted(self.config.quantum_byte_budget as u64, self.weights[direction.index()]) as usize
    }

    /// When the current quantum ends
    pub fn quantum_deadline(&self) -> Timestamp {
        self.quantum_start + self.quantum_for(self.current)
    }

    /// Effective latency bound, relaxed on low-speed links
    pub fn latency_bound_ms(&self) -> f32 {
        let bound = self.config.latency_bound_ms as f32;
        if self.low_speed {
            bound * LOW_SPEED_BOUND_FACTOR
        } else {
            bound
        }
    }

    /// Effective starvation threshold, relaxed on low-speed links
    pub fn starvation_threshold_ms(&self) -> u64 {
        let threshold = self.config.starvation_threshold_ms;
        if self.low_speed {
            (threshold as f32 * LOW_SPEED_BOUND_FACTOR) as u64
        } else {
            threshold
        }
    }

    fn switch_to(&mut self, direction: Direction, now: Timestamp, reason: SwitchReason) {
        if direction != self.current {
            self.current = direction;
            self.consecutive_slices = 0;
            self.last_switch = reason;
        }
        self.quantum_start = now;
        self.bytes_in_quantum = 0;
    }

    fn worst_average_latency(&self) -> f32 {
        self.latency[0].average_ms().max(self.latency[1].average_ms())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn current(&self) -> Direction {
        self.current
    }

    pub fn current_quantum_ms(&self) -> u64 {
        self.current_quantum_ms
    }

    pub fn weights(&self) -> [u8; 2] {
        self.weights
    }

    pub fn is_low_speed(&self) -> bool {
        self.low_speed
    }

    pub fn consecutive_slices(&self) -> u32 {
        self.consecutive_slices
    }

    pub fn last_serviced(&self, direction: Direction) -> Timestamp {
        self.last_serviced[direction.index()]
    }

    pub fn latency(&self, direction: Direction) -> &LatencyTracker {
        &self.latency[direction.index()]
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Smaller over larger bytes served; 1.0 is perfectly even
    pub fn fairness_ratio(&self) -> f32 {
        let [a, b] = self.stats.bytes_served;
        let high = a.max(b);
        if high == 0 {
            return 1.0;
        }
        a.min(b) as f32 / high as f32
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            current: self.current,
            last_switch: self.last_switch,
            quantum_ms: self.current_quantum_ms,
            weights: self.weights,
            violation: self.violation,
            latency: self.latency,
            fairness_ratio: self.fairness_ratio(),
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S2N: Direction = Direction::SerialToNetwork;
    const N2S: Direction = Direction::NetworkToSerial;

    fn scheduler() -> FairScheduler {
        FairScheduler::new(SchedulingConfig::default(), 9600, 0)
    }

    #[test]
    fn idle_returns_none() {
        let mut s = scheduler();
        assert_eq!(s.next_direction(10, [0, 0]), None);
        assert_eq!(s.stats().cycles, 1);
    }

    #[test]
    fn work_conserving_switch() {
        let mut s = scheduler();
        assert_eq!(s.next_direction(1, [0, 100]), Some(N2S));
        assert_eq!(s.stats().work_conserving_switches, 1);
    }

    #[test]
    fn quantum_expiry_flips_direction() {
        let mut s = scheduler();
        assert_eq!(s.next_direction(0, [1000, 1000]), Some(S2N));
        s.complete(S2N, 100, 1, 1);

        // Quantum is 50ms at neutral weight
        assert_eq!(s.next_direction(40, [900, 1000]), Some(S2N));
        s.complete(S2N, 100, 1, 41);
        assert_eq!(s.next_direction(50, [800, 1000]), Some(N2S));
        assert_eq!(s.stats().quantum_switches, 1);
    }

    #[test]
    fn byte_budget_flips_direction() {
        let mut s = scheduler();
        assert_eq!(s.next_direction(0, [5000, 100]), Some(S2N));
        s.complete(S2N, 2048, 1, 0);
        assert_eq!(s.next_direction(1, [3000, 100]), Some(N2S));
    }

    #[test]
    fn starving_direction_selected_next() {
        let config = SchedulingConfig {
            base_quantum_ms: 1000,
            max_quantum_ms: 2000,
            latency_bound_ms: 1000,
            adaptive_quantum: false,
            fair_queue: false,
            ..SchedulingConfig::default()
        };
        let mut s = FairScheduler::new(config, 9600, 0);

        // Serial→Network keeps getting serviced; network side waits
        let mut now = 0;
        while now <= 500 {
            assert_eq!(s.next_direction(now, [10_000, 10]), Some(S2N));
            s.complete(S2N, 10, 0, now);
            now += 100;
        }
        assert_eq!(s.next_direction(now, [10_000, 10]), Some(N2S));
        assert_eq!(s.stats().starvation_events, 1);
        assert_eq!(s.current_quantum_ms(), 2000);
    }

    #[test]
    fn wait_over_latency_bound_forces_switch() {
        let config = SchedulingConfig {
            base_quantum_ms: 200,
            adaptive_quantum: false,
            fair_queue: false,
            ..SchedulingConfig::default()
        };
        let mut s = FairScheduler::new(config, 9600, 0);
        assert_eq!(s.next_direction(0, [1000, 0]), Some(S2N));
        s.complete(S2N, 10, 0, 0);
        assert_eq!(s.next_direction(100, [1000, 5]), Some(S2N));
        s.complete(S2N, 10, 0, 100);

        // Network side waiting since t=0: over 150ms at t=160
        assert_eq!(s.next_direction(160, [1000, 5]), Some(N2S));
        assert_eq!(s.stats().forced_switches, 1);
        assert_eq!(s.stats().starvation_events, 0);
    }

    #[test]
    fn low_speed_relaxes_bounds() {
        let s = FairScheduler::new(SchedulingConfig::default(), 2400, 0);
        assert!(s.is_low_speed());
        assert_eq!(s.latency_bound_ms(), 150.0);
        assert_eq!(s.starvation_threshold_ms(), 750);

        let mut slow = FairScheduler::new(SchedulingConfig::default(), 1200, 0);
        slow.complete(S2N, 10, 250, 0);
        assert_eq!(slow.check_latency(), LatencyViolation::Warning);

        let mut fast = scheduler();
        fast.complete(S2N, 10, 250, 0);
        assert_eq!(fast.check_latency(), LatencyViolation::Critical);
    }

    #[test]
    fn latency_violation_forces_minimum_quantum() {
        let mut s = scheduler();
        s.complete(S2N, 10, 300, 0);
        s.next_direction(1, [100, 0]);
        assert_eq!(s.current_quantum_ms(), 10);
        assert_eq!(s.stats().latency_violations, 1);

        // Still violating: counted once
        s.next_direction(2, [100, 0]);
        assert_eq!(s.stats().latency_violations, 1);
    }

    #[test]
    fn weighted_quantum() {
        let config = SchedulingConfig {
            weights: [7, 3],
            ..SchedulingConfig::default()
        };
        let s = FairScheduler::new(config, 9600, 0);
        assert_eq!(s.quantum_for(S2N), 70);
        assert_eq!(s.quantum_for(N2S), 30);
        assert_eq!(s.byte_budget(N2S), 1228);
    }

    #[test]
    fn fairness_ratio_from_bytes_served() {
        let mut s = scheduler();
        assert_eq!(s.fairness_ratio(), 1.0);
        s.complete(S2N, 300, 0, 0);
        s.complete(N2S, 100, 0, 0);
        assert!((s.fairness_ratio() - 1.0 / 3.0).abs() < 1e-6);
    }
}
