//! Collaborator Contracts
//!
//! The serial port, the network link and the modem personality are
//! external to the core. These traits describe exactly what the core needs
//! from each of them and nothing more.
//!
//! ## Blocking Rules
//!
//! The management thread calls these methods from inside a quantum, so
//! every call must be bounded:
//! - `SerialPort::write` is non-blocking and reports `WouldBlock` through
//!   [`nb`] when the line cannot take more bytes right now
//! - `NetworkLink::queue_send` only enqueues; `flush` pushes what the socket
//!   accepts without waiting
//! - `NetworkLink::connect` may block for at most the collaborator's own
//!   connect timeout; the state machine retries every 2 seconds

use crate::config::NetworkTarget;
use crate::errors::{BridgeError, BridgeResult};

/// Serial-side output used by the Network→Serial pipeline
///
/// ## Example Implementation
///
/// ```rust
/// use modembridge_core::traits::SerialPort;
/// use modembridge_core::errors::BridgeError;
/// use modembridge_core::nb;
///
/// struct CaptureSerial {
///     sent: Vec<u8>,
/// }
///
/// impl SerialPort for CaptureSerial {
///     fn write(&mut self, data: &[u8]) -> nb::Result<usize, BridgeError> {
///         self.sent.extend_from_slice(data);
///         Ok(data.len())
///     }
/// }
/// ```
pub trait SerialPort: Send {
    /// Write as many bytes as the line accepts right now
    ///
    /// Returns the number of bytes accepted (possibly fewer than offered),
    /// `Err(nb::Error::WouldBlock)` when nothing can be written, or
    /// `Err(nb::Error::Other(_))` on an I/O failure.
    fn write(&mut self, data: &[u8]) -> nb::Result<usize, BridgeError>;
}

/// Network-side connection used by the Serial→Network pipeline and the
/// Connecting/ShuttingDown states
pub trait NetworkLink: Send {
    /// Attempt to establish the connection
    ///
    /// Called at most once per retry interval while Connecting.
    fn connect(&mut self, target: &NetworkTarget) -> BridgeResult<()>;

    /// Whether the connection is currently established
    fn is_connected(&self) -> bool;

    /// Whether connect-time option negotiation has finished
    ///
    /// Links without negotiation report complete immediately.
    fn negotiation_complete(&self) -> bool {
        true
    }

    /// Append bytes to the outbound queue
    fn queue_send(&mut self, data: &[u8]) -> BridgeResult<usize>;

    /// Push queued bytes toward the peer without blocking
    fn flush(&mut self) -> BridgeResult<()>;

    /// Tear the connection down
    fn disconnect(&mut self);
}

/// Readiness of the serial/modem side
pub trait ModemStatus: Send {
    /// Whether the serial line and modem personality are initialized
    fn is_ready(&self) -> bool;
}

/// A modem status that is always ready
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl ModemStatus for AlwaysReady {
    fn is_ready(&self) -> bool {
        true
    }
}
