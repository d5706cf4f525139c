//! Error Types for the Bridge Core
//!
//! ## Design Philosophy
//!
//! The bridge core runs a cooperative management loop that must never stall
//! on an error, so the error system is designed for cheap local handling:
//!
//! 1. **Small Size**: Variants carry only `Copy` data and `&'static str`
//!    context, so errors can be returned from the hot path and stored in
//!    statistics without allocation.
//!
//! 2. **Copy Semantics**: Errors implement `Copy` and can be recorded and
//!    re-reported freely.
//!
//! 3. **Local Recovery First**: Transient conditions (overflow, underflow,
//!    backpressure, rescheduling) never become errors at all. They are
//!    dropped-and-counted by the component that sees them.
//!
//! ## Error Categories
//!
//! ### Caller Mistakes
//! - `InvalidParameter`: Configuration or argument out of range
//! - `InvalidTransition`: State change not present in the validity table
//!
//! ### Resource Conditions
//! - `BufferFull`: No space left in a buffer or pending-output area
//! - `ResourceBusy`: A lock or collaborator is busy; retry later
//! - `OutOfMemory`: The memory pool cannot satisfy an allocation
//! - `Timeout`: An operation exceeded its deadline
//!
//! ### Infrastructure Failures
//! - `SyncFailure`: Thread or synchronization setup failed (aborts start-up)
//! - `Io`: A serial or network collaborator reported an I/O failure
//!
//! ## Propagation Policy
//!
//! ```text
//! overflow / underflow / backpressure ──→ counted in statistics, never surfaced
//! invalid transition ───────────────────→ rejected, logged, state unchanged
//! collaborator I/O failure ─────────────→ logged; state machine decides
//! SyncFailure during start-up ──────────→ start-up aborted
//! ```

use std::io::ErrorKind;

use thiserror_no_std::Error;

use crate::state::SystemState;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge errors - kept small and `Copy`
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// Argument or configuration value out of range
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// What was wrong with the parameter
        reason: &'static str,
    },

    /// Requested state change is not in the transition table
    #[error("Invalid state transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// State the machine was in
        from: SystemState,
        /// State that was requested
        to: SystemState,
    },

    /// Operation exceeded its deadline
    #[error("Operation timed out")]
    Timeout,

    /// No space left to accept data
    #[error("Buffer full")]
    BufferFull,

    /// Resource is temporarily held elsewhere
    #[error("Resource busy")]
    ResourceBusy,

    /// Memory pool could not satisfy an allocation
    #[error("Out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes requested
        requested: usize,
        /// Largest contiguous span available
        available: usize,
    },

    /// Thread or synchronization primitive could not be set up
    #[error("Synchronization failure: {reason}")]
    SyncFailure {
        /// What failed
        reason: &'static str,
    },

    /// I/O failure reported by a serial or network collaborator
    #[error("I/O failure: {0:?}")]
    Io(ErrorKind),
}

impl BridgeError {
    /// Whether the condition is expected to clear on its own
    ///
    /// Connecting retries either kind; transient connect failures are
    /// counted apart from hard ones and logged at debug level.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ResourceBusy | Self::BufferFull | Self::Timeout => true,
            Self::Io(kind) => matches!(
                kind,
                ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BridgeError::ResourceBusy.is_transient());
        assert!(BridgeError::Io(ErrorKind::WouldBlock).is_transient());
        assert!(!BridgeError::Io(ErrorKind::ConnectionRefused).is_transient());
        assert!(!BridgeError::SyncFailure { reason: "spawn" }.is_transient());
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let err: BridgeError = std::io::Error::new(ErrorKind::BrokenPipe, "gone").into();
        assert_eq!(err, BridgeError::Io(ErrorKind::BrokenPipe));
    }

    #[test]
    fn transition_error_display() {
        let err = BridgeError::InvalidTransition {
            from: SystemState::Ready,
            to: SystemState::Flushing,
        };
        let text = format!("{}", err);
        assert!(text.contains("Ready"));
        assert!(text.contains("Flushing"));
    }
}
