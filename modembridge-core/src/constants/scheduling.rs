//! Scheduler Quantum, Latency and Fairness Parameters
//!
//! The fair scheduler hands out time/byte quanta to the two pipeline
//! directions. These constants define the default quantum bounds, the
//! latency and starvation limits it enforces, and the adaptive rules it
//! uses to resize quanta and rebalance weights.

// ===== QUANTUM BOUNDS =====

/// Default quantum length (milliseconds).
pub const DEFAULT_BASE_QUANTUM_MS: u64 = 50;

/// Shortest quantum the adaptive rules may select (milliseconds).
pub const DEFAULT_MIN_QUANTUM_MS: u64 = 10;

/// Longest quantum the adaptive rules may select (milliseconds).
pub const DEFAULT_MAX_QUANTUM_MS: u64 = 200;

/// Byte allowance per quantum at neutral weight (bytes).
///
/// Scaled by the direction's fair weight relative to the neutral weight.
pub const DEFAULT_QUANTUM_BYTE_BUDGET: usize = 2048;

// ===== LATENCY AND STARVATION =====

/// Target upper bound for the time a direction waits to be serviced (milliseconds).
pub const DEFAULT_LATENCY_BOUND_MS: u64 = 100;

/// Wait time after which a direction with backlog is starving (milliseconds).
pub const DEFAULT_STARVATION_THRESHOLD_MS: u64 = 500;

/// Multiplier on the latency bound beyond which a switch is forced.
pub const FORCED_SWITCH_FACTOR: f32 = 1.5;

/// Chunk latency moving average above which a warning violation is raised (milliseconds).
pub const LATENCY_WARNING_MS: u64 = 100;

/// Chunk latency above which a critical violation is raised (milliseconds).
pub const LATENCY_CRITICAL_MS: u64 = 200;

/// Smoothing factor of the latency and processing-time moving averages.
pub const LATENCY_EMA_ALPHA: f32 = 0.2;

/// Per-sample decay of the tracked latency peak.
///
/// A single slow chunk must not hold the direction in violation forever.
pub const LATENCY_PEAK_DECAY: f32 = 0.9;

// ===== LOW-SPEED LINKS =====

/// Serial speeds at or below this are treated as low speed (bits per second).
pub const LOW_SPEED_BAUD: u32 = 2400;

/// Latency bound and starvation multiplier on low-speed links.
pub const LOW_SPEED_BOUND_FACTOR: f32 = 1.5;

/// Latency violation threshold multiplier on low-speed links.
pub const LOW_SPEED_VIOLATION_FACTOR: f32 = 2.0;

/// Default serial speed when none is configured (bits per second).
pub const DEFAULT_BAUD_RATE: u32 = 9600;

// ===== ADAPTIVE QUANTUM =====

/// Combined backlog above which the quantum is shortened (bytes).
pub const BACKLOG_HIGH_BYTES: usize = 4096;

/// Combined backlog below which the quantum is lengthened (bytes).
pub const BACKLOG_LOW_BYTES: usize = 512;

/// Quantum multiplier applied under high backlog.
pub const BACKLOG_SHRINK_FACTOR: f32 = 0.5;

/// Quantum multiplier applied under low backlog.
pub const BACKLOG_GROW_FACTOR: f32 = 1.5;

/// Backlog ratio between directions that forces the minimum quantum.
pub const IMBALANCE_MIN_QUANTUM_RATIO: f32 = 3.0;

/// Average latency above which the quantum is reduced (milliseconds).
pub const LATENCY_REDUCE_MS: f32 = 100.0;

/// Average latency above which the quantum is halved (milliseconds).
pub const LATENCY_HALVE_MS: f32 = 200.0;

/// Quantum multiplier past the reduce trip point.
pub const LATENCY_REDUCE_FACTOR: f32 = 0.75;

/// Quantum multiplier past the halve trip point.
pub const LATENCY_HALVE_FACTOR: f32 = 0.5;

// ===== FAIR WEIGHTS =====

/// Sum of both directions' fair weights.
pub const FAIR_WEIGHT_TOTAL: u8 = 10;

/// Neutral per-direction weight.
pub const FAIR_WEIGHT_NEUTRAL: u8 = 5;

/// Weight of the favoured direction when backlogs are imbalanced.
pub const FAIR_WEIGHT_FAVOURED: u8 = 7;

/// Backlog ratio above which weights are skewed toward the larger backlog.
pub const WEIGHT_IMBALANCE_RATIO: f32 = 2.0;
