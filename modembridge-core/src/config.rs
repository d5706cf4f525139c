//! Bridge Configuration
//!
//! ## Overview
//!
//! All tunables are grouped into small plain structs aggregated by
//! [`BridgeConfig`]. Every struct:
//!
//! - implements `Default` from the named constants in [`crate::constants`]
//! - derives `Serialize`/`Deserialize` (feature `serde`) with
//!   `#[serde(default)]`, so a partial document fills in the rest
//! - offers `validate()` rejecting inconsistent values with
//!   [`BridgeError::InvalidParameter`]
//!
//! Loading the configuration from disk or the command line is left to the
//! embedding application.
//!
//! ```text
//! BridgeConfig
//! ├── network:    NetworkTarget    host/port for the Telnet back-end
//! ├── serial:     SerialProfile    line speed (drives low-speed relaxation)
//! ├── buffers:    BufferConfig     double-buffer sizing and resize policy
//! ├── scheduling: SchedulingConfig quantum, latency, starvation, weights
//! ├── timeouts:   StateTimeouts    per-state timeouts, connect retry
//! ├── filter:     FilterConfig     Hayes escape and line timing
//! └── auto_restart
//! ```

use crate::constants::buffers::{
    DEFAULT_BUFFER_SIZE, DEFAULT_BURST_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE, POOL_BLOCK_SIZE,
    RESIZE_COOLDOWN_MS, RESIZE_STEP,
};
use crate::constants::protocol::{
    ESCAPE_CHAR, ESCAPE_GUARD_MS, ESCAPE_WINDOW_MS, LINE_TIMEOUT_MS, RESULT_TIMEOUT_MS,
};
use crate::constants::scheduling::{
    DEFAULT_BASE_QUANTUM_MS, DEFAULT_BAUD_RATE, DEFAULT_LATENCY_BOUND_MS, DEFAULT_MAX_QUANTUM_MS,
    DEFAULT_MIN_QUANTUM_MS, DEFAULT_QUANTUM_BYTE_BUDGET, DEFAULT_STARVATION_THRESHOLD_MS,
    FAIR_WEIGHT_NEUTRAL, FAIR_WEIGHT_TOTAL, LATENCY_CRITICAL_MS, LATENCY_WARNING_MS,
    LOW_SPEED_BAUD,
};
use crate::constants::time::{
    CONNECTING_TIMEOUT_S, CONNECT_RETRY_INTERVAL_MS, FLUSHING_TIMEOUT_S, INITIALIZING_TIMEOUT_S,
    NEGOTIATING_TIMEOUT_S, SHUTTING_DOWN_TIMEOUT_S,
};
use crate::errors::{BridgeError, BridgeResult};
use crate::state::SystemState;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

fn invalid(reason: &'static str) -> BridgeError {
    BridgeError::InvalidParameter { reason }
}

// ===== NETWORK =====

/// Telnet back-end address
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkTarget {
    pub host: String,
    pub port: u16,
}

impl Default for NetworkTarget {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 23,
        }
    }
}

impl NetworkTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("network host must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("network port must be non-zero"));
        }
        Ok(())
    }
}

impl core::fmt::Display for NetworkTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ===== SERIAL =====

/// Serial line characteristics the core cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SerialProfile {
    /// Line speed in bits per second
    pub baud_rate: u32,
}

impl Default for SerialProfile {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl SerialProfile {
    pub fn validate(&self) -> BridgeResult<()> {
        if self.baud_rate == 0 {
            return Err(invalid("baud rate must be non-zero"));
        }
        Ok(())
    }
}

// ===== BUFFERS =====

/// Adaptive double buffer sizing
///
/// Sizes are per region; each buffer holds up to twice `initial_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BufferConfig {
    /// Size of each of the two regions; total capacity is twice this
    pub initial_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    /// Grow/shrink step in bytes
    pub resize_step: usize,
    /// Minimum time between resize decisions
    pub resize_cooldown_ms: u64,
    /// Memory pool block size in bytes
    pub pool_block_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_BUFFER_SIZE,
            min_size: MIN_BUFFER_SIZE,
            max_size: MAX_BUFFER_SIZE,
            resize_step: RESIZE_STEP,
            resize_cooldown_ms: RESIZE_COOLDOWN_MS,
            pool_block_size: POOL_BLOCK_SIZE,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> BridgeResult<()> {
        if self.min_size == 0 {
            return Err(invalid("minimum buffer size must be non-zero"));
        }
        if self.min_size > self.max_size {
            return Err(invalid("minimum buffer size exceeds maximum"));
        }
        if self.initial_size < self.min_size || self.initial_size > self.max_size {
            return Err(invalid("initial buffer size outside [min, max]"));
        }
        if self.resize_step == 0 {
            return Err(invalid("resize step must be non-zero"));
        }
        if self.pool_block_size == 0 {
            return Err(invalid("pool block size must be non-zero"));
        }
        Ok(())
    }
}

// ===== SCHEDULING =====

/// Fair scheduler parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulingConfig {
    /// Starting quantum length
    pub base_quantum_ms: u64,
    pub min_quantum_ms: u64,
    pub max_quantum_ms: u64,
    /// Bytes a direction may move in one quantum at neutral weight
    pub quantum_byte_budget: usize,
    /// Most bytes drained from a buffer per chunk
    pub burst_size: usize,
    /// Latency a waiting direction should not exceed
    pub latency_bound_ms: u64,
    /// Wait after which a direction with backlog is starving
    pub starvation_threshold_ms: u64,
    /// Chunk latency average that raises a warning
    pub latency_warning_ms: u64,
    /// Chunk latency that is a critical violation
    pub latency_critical_ms: u64,
    /// Line speed at or below which bounds are relaxed
    pub low_speed_baud: u32,
    /// Recompute the quantum from backlog and latency
    pub adaptive_quantum: bool,
    /// Rebalance weights toward the heavier direction
    pub fair_queue: bool,
    /// Initial weights `[serial→network, network→serial]`, summing to 10
    pub weights: [u8; 2],
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            base_quantum_ms: DEFAULT_BASE_QUANTUM_MS,
            min_quantum_ms: DEFAULT_MIN_QUANTUM_MS,
            max_quantum_ms: DEFAULT_MAX_QUANTUM_MS,
            quantum_byte_budget: DEFAULT_QUANTUM_BYTE_BUDGET,
            burst_size: DEFAULT_BURST_SIZE,
            latency_bound_ms: DEFAULT_LATENCY_BOUND_MS,
            starvation_threshold_ms: DEFAULT_STARVATION_THRESHOLD_MS,
            latency_warning_ms: LATENCY_WARNING_MS,
            latency_critical_ms: LATENCY_CRITICAL_MS,
            low_speed_baud: LOW_SPEED_BAUD,
            adaptive_quantum: true,
            fair_queue: true,
            weights: [FAIR_WEIGHT_NEUTRAL, FAIR_WEIGHT_NEUTRAL],
        }
    }
}

impl SchedulingConfig {
    pub fn validate(&self) -> BridgeResult<()> {
        if self.min_quantum_ms == 0 {
            return Err(invalid("minimum quantum must be non-zero"));
        }
        if self.min_quantum_ms > self.max_quantum_ms {
            return Err(invalid("minimum quantum exceeds maximum"));
        }
        if self.base_quantum_ms < self.min_quantum_ms || self.base_quantum_ms > self.max_quantum_ms {
            return Err(invalid("base quantum outside [min, max]"));
        }
        if self.weights[0] as u16 + self.weights[1] as u16 != FAIR_WEIGHT_TOTAL as u16 {
            return Err(invalid("fair weights must sum to 10"));
        }
        if self.weights.contains(&0) {
            return Err(invalid("fair weights must be non-zero"));
        }
        if self.burst_size == 0 || self.quantum_byte_budget == 0 {
            return Err(invalid("burst size and byte budget must be non-zero"));
        }
        if self.latency_warning_ms > self.latency_critical_ms {
            return Err(invalid("latency warning threshold exceeds critical"));
        }
        Ok(())
    }
}

// ===== STATE TIMEOUTS =====

/// Per-state timeouts (seconds) and connect retry interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StateTimeouts {
    pub initializing_s: u32,
    pub connecting_s: u32,
    pub negotiating_s: u32,
    pub flushing_s: u32,
    pub shutting_down_s: u32,
    pub connect_retry_ms: u64,
}

impl Default for StateTimeouts {
    fn default() -> Self {
        Self {
            initializing_s: INITIALIZING_TIMEOUT_S,
            connecting_s: CONNECTING_TIMEOUT_S,
            negotiating_s: NEGOTIATING_TIMEOUT_S,
            flushing_s: FLUSHING_TIMEOUT_S,
            shutting_down_s: SHUTTING_DOWN_TIMEOUT_S,
            connect_retry_ms: CONNECT_RETRY_INTERVAL_MS,
        }
    }
}

impl StateTimeouts {
    /// Timeout applied on entering `state`, if it has one
    pub fn for_state(&self, state: SystemState) -> Option<u32> {
        let seconds = match state {
            SystemState::Initializing => self.initializing_s,
            SystemState::Connecting => self.connecting_s,
            SystemState::Negotiating => self.negotiating_s,
            SystemState::Flushing => self.flushing_s,
            SystemState::ShuttingDown => self.shutting_down_s,
            _ => return None,
        };
        (seconds > 0).then_some(seconds)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.connect_retry_ms == 0 {
            return Err(invalid("connect retry interval must be non-zero"));
        }
        Ok(())
    }
}

// ===== FILTERS =====

/// Hayes filter timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FilterConfig {
    /// Escape character (`+` by default)
    pub escape_char: u8,
    /// Silence required before the first escape character
    pub escape_guard_ms: u64,
    /// Maximum gap between escape characters
    pub escape_window_ms: u64,
    /// Age after which a partial line is discarded
    pub line_timeout_ms: u64,
    /// Time to wait for a result code after a command
    pub result_timeout_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            escape_char: ESCAPE_CHAR,
            escape_guard_ms: ESCAPE_GUARD_MS,
            escape_window_ms: ESCAPE_WINDOW_MS,
            line_timeout_ms: LINE_TIMEOUT_MS,
            result_timeout_ms: RESULT_TIMEOUT_MS,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> BridgeResult<()> {
        if matches!(self.escape_char, b'\r' | b'\n') {
            return Err(invalid("escape character cannot be a line terminator"));
        }
        if self.escape_window_ms == 0 || self.line_timeout_ms == 0 {
            return Err(invalid("filter timeouts must be non-zero"));
        }
        Ok(())
    }
}

// ===== BRIDGE =====

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BridgeConfig {
    pub network: NetworkTarget,
    pub serial: SerialProfile,
    pub buffers: BufferConfig,
    pub scheduling: SchedulingConfig,
    pub timeouts: StateTimeouts,
    pub filter: FilterConfig,
    /// Re-initialize after Terminated so the next call can be answered
    pub auto_restart: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            network: NetworkTarget::default(),
            serial: SerialProfile::default(),
            buffers: BufferConfig::default(),
            scheduling: SchedulingConfig::default(),
            timeouts: StateTimeouts::default(),
            filter: FilterConfig::default(),
            auto_restart: true,
        }
    }
}

impl BridgeConfig {
    /// Validate every section
    pub fn validate(&self) -> BridgeResult<()> {
        self.network.validate()?;
        self.serial.validate()?;
        self.buffers.validate()?;
        self.scheduling.validate()?;
        self.timeouts.validate()?;
        self.filter.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_quantum_bounds() {
        let config = SchedulingConfig {
            min_quantum_ms: 300,
            ..SchedulingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BridgeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn rejects_bad_weights() {
        let config = SchedulingConfig {
            weights: [6, 6],
            ..SchedulingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulingConfig {
            weights: [10, 0],
            ..SchedulingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inconsistent_buffers() {
        let config = BufferConfig {
            min_size: 8192,
            max_size: 4096,
            ..BufferConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BufferConfig {
            pool_block_size: 0,
            ..BufferConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn state_timeouts_by_state() {
        let timeouts = StateTimeouts::default();
        assert_eq!(timeouts.for_state(SystemState::Connecting), Some(30));
        assert_eq!(timeouts.for_state(SystemState::Flushing), Some(5));
        assert_eq!(timeouts.for_state(SystemState::DataTransfer), None);
    }

    #[test]
    fn network_target_display() {
        let target = NetworkTarget::new("bbs.example.org", 2323);
        assert_eq!(target.to_string(), "bbs.example.org:2323");
        assert!(NetworkTarget::new("", 23).validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_document_fills_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"network":{"host":"bbs","port":6400},"auto_restart":false}"#)
                .unwrap();
        assert_eq!(config.network.port, 6400);
        assert!(!config.auto_restart);
        assert_eq!(config.buffers, BufferConfig::default());
    }
}
