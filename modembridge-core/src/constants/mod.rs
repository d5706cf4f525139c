//! Constants for the ModemBridge core
//!
//! This module provides centralized, documented constants used throughout
//! the bridge. Every numeric default for buffering, scheduling, protocol
//! handling and state timing is defined here with its unit and purpose.
//!
//! ## Organization
//!
//! Constants are grouped by domain:
//! - **Buffers**: Double-buffer sizing, watermarks, resize policy, memory pool
//! - **Scheduling**: Quantum bounds, latency and starvation limits, fair weights
//! - **Protocol**: Telnet command bytes and Hayes escape/line timing
//! - **Time**: Unit conversions, state timeouts and management-loop sleeps
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. Include the unit in the name (`_MS`, `_S`, `_BYTES`, `_PCT`)
//! 3. Group related constants together

/// Buffer sizes, watermark percentages and resize policy.
pub mod buffers;

/// Scheduler quantum, latency and fairness parameters.
pub mod scheduling;

/// Telnet command bytes and Hayes command-set timing.
pub mod protocol;

/// Time conversions, state timeouts and loop intervals.
pub mod time;

// Re-export commonly used constants for convenience
pub use buffers::{
    DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE, MAX_BUFFER_SIZE,
    DEFAULT_BURST_SIZE, LINE_BUFFER_SIZE,
};

pub use scheduling::{
    DEFAULT_BASE_QUANTUM_MS, DEFAULT_MIN_QUANTUM_MS, DEFAULT_MAX_QUANTUM_MS,
    DEFAULT_LATENCY_BOUND_MS, DEFAULT_STARVATION_THRESHOLD_MS, FAIR_WEIGHT_TOTAL,
};

pub use protocol::{IAC, ESCAPE_GUARD_MS, ESCAPE_WINDOW_MS, LINE_TIMEOUT_MS};

pub use time::{MS_PER_SECOND, CONNECT_RETRY_INTERVAL_MS};
