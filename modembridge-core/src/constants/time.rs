//! Time-Related Constants
//!
//! This module defines unit conversions, per-state timeouts of the
//! connection state machine, and the bounded sleep intervals of the
//! management loop.

// ===== TIME UNIT CONVERSIONS =====

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

/// Microseconds per millisecond.
pub const US_PER_MS: u64 = 1000;

// ===== STATE TIMEOUTS =====

/// Time allowed for the modem side to report ready (seconds).
pub const INITIALIZING_TIMEOUT_S: u32 = 10;

/// Time allowed to establish the network connection (seconds).
pub const CONNECTING_TIMEOUT_S: u32 = 30;

/// Time allowed for Telnet option negotiation (seconds).
///
/// On expiry negotiation is considered complete and data transfer starts.
pub const NEGOTIATING_TIMEOUT_S: u32 = 10;

/// Time allowed to drain both pipelines after carrier loss (seconds).
pub const FLUSHING_TIMEOUT_S: u32 = 5;

/// Time allowed for shutdown before forcing Terminated (seconds).
pub const SHUTTING_DOWN_TIMEOUT_S: u32 = 5;

/// Interval between network connection attempts (milliseconds).
pub const CONNECT_RETRY_INTERVAL_MS: u64 = 2000;

// ===== MANAGEMENT LOOP SLEEPS =====

/// Sleep while waiting for a connection to come up (milliseconds).
pub const CONNECTING_SLEEP_MS: u64 = 20;

/// Sleep while transferring data with empty buffers (milliseconds).
pub const DATA_IDLE_SLEEP_MS: u64 = 10;

/// Sleep while idle in Initializing/Ready/Negotiating (milliseconds).
pub const IDLE_SLEEP_MS: u64 = 100;

/// Sleep after an error before attempting recovery (milliseconds).
pub const ERROR_SLEEP_MS: u64 = 500;

/// Sleep while terminated (milliseconds).
pub const TERMINATED_SLEEP_MS: u64 = 1000;
