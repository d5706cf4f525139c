//! Pipeline-management core for a serial modem to Telnet bridge
//!
//! Moves bytes between an AT-command-driven serial client and a Telnet
//! back-end. Two directional pipelines share a half-duplex serial link
//! under a fair, latency-aware scheduler, with backpressure before buffers
//! overflow and a connection state machine driven by carrier detect.
//!
//! Key properties:
//! - Bytes within one direction are forwarded in order
//! - Overflow, underflow and backpressure are dropped-and-counted, never fatal
//! - Carrier-detect edges can be posted from any thread without blocking
//! - All timing comes from an injected clock, so tests run on a mock clock
//!
//! ```no_run
//! use std::sync::Arc;
//! use modembridge_core::{BridgeConfig, BridgeCore, ManagementThread};
//! # use modembridge_core::{BridgeResult, NetworkLink, NetworkTarget, SerialPort, BridgeError};
//! # struct Port;
//! # impl SerialPort for Port {
//! #     fn write(&mut self, d: &[u8]) -> modembridge_core::nb::Result<usize, BridgeError> { Ok(d.len()) }
//! # }
//! # struct Link;
//! # impl NetworkLink for Link {
//! #     fn connect(&mut self, _: &NetworkTarget) -> BridgeResult<()> { Ok(()) }
//! #     fn is_connected(&self) -> bool { true }
//! #     fn queue_send(&mut self, d: &[u8]) -> BridgeResult<usize> { Ok(d.len()) }
//! #     fn flush(&mut self) -> BridgeResult<()> { Ok(()) }
//! #     fn disconnect(&mut self) {}
//! # }
//!
//! let core = Arc::new(
//!     BridgeCore::builder(BridgeConfig::default())
//!         .serial(Port)
//!         .network(Link)
//!         .build()?,
//! );
//! core.start()?;
//! let thread = ManagementThread::spawn(Arc::clone(&core))?;
//!
//! // Serial hardware reports an incoming call
//! core.carrier_rising();
//! # thread.stop();
//! # Ok::<(), BridgeError>(())
//! ```

#![deny(unsafe_code)]

#[macro_use]
mod macros;

pub mod bridge;
pub mod buffer;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filter;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod time;
pub mod traits;

// Public API
pub use bridge::{BridgeBuilder, BridgeCore, CarrierHandle, ManagementThread, TickReport};
pub use buffer::{AdaptiveBuffer, SharedBuffer, WatermarkLevel};
pub use config::{
    BridgeConfig, BufferConfig, FilterConfig, NetworkTarget, SchedulingConfig, SerialProfile,
    StateTimeouts,
};
pub use errors::{BridgeError, BridgeResult};
pub use filter::{FilterSignals, StreamFilter};
pub use pipeline::{Direction, IngressHandle, Pipeline};
pub use queue::{CarrierEdge, CarrierEvent};
pub use scheduler::{FairScheduler, LatencyViolation};
pub use state::{ConnectionMode, StateMachine, SystemState};
pub use stats::StatisticsSnapshot;
pub use time::{Clock, MockTimeSource, MonotonicClock, Timestamp};
pub use traits::{ModemStatus, NetworkLink, SerialPort, StateEnvironment, TimeSource};

pub use nb;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
