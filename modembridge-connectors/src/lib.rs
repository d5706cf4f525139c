//! Concrete Collaborators for the Bridge Core
//!
//! ## Overview
//!
//! `modembridge-core` only talks to the outside world through its
//! collaborator traits. This crate provides the std implementations a real
//! deployment plugs in:
//!
//! | Component          | Implements / feeds          | Backed by                    |
//! |--------------------|-----------------------------|------------------------------|
//! | [`TelnetClient`]   | `NetworkLink`, N→S ingress  | `std::net::TcpStream`        |
//! | [`StreamSerial`]   | `SerialPort`                | any `Write`                  |
//! | [`SerialReader`]   | S→N ingress                 | any `Read`                   |
//! | [`ReadyModem`]     | `ModemStatus`               | shared flag                  |
//! | [`CarrierMonitor`] | carrier-detect entry points | polled probe closure         |
//! | [`StatsReporter`]  | statistics export           | `serde_json`                 |
//!
//! ## Threads
//!
//! Every receive path runs on its own [`Worker`] thread and only touches
//! the core through an `IngressHandle` (one buffer lock per chunk) or a
//! `CarrierHandle` (never blocks). Workers stop promptly on request and are
//! joined on drop.
//!
//! ## Wiring
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use modembridge_connectors::{
//!     CarrierMonitor, IngressSlot, SerialReader, StatsReporter, StreamSerial, TelnetClient,
//!     TelnetConfig,
//! };
//! use modembridge_core::{BridgeConfig, BridgeCore, Direction, ManagementThread, NetworkTarget};
//!
//! let slot = IngressSlot::new();
//! let telnet = TelnetClient::new(TelnetConfig::default(), slot.clone());
//! let core = Arc::new(
//!     BridgeCore::builder(BridgeConfig {
//!         network: NetworkTarget::new("bbs.example.org", 23),
//!         ..BridgeConfig::default()
//!     })
//!     .serial(StreamSerial::new(std::io::stdout()))
//!     .network(telnet)
//!     .build()?,
//! );
//! slot.attach(core.ingress(Direction::NetworkToSerial));
//!
//! let _reader = SerialReader::spawn(std::io::stdin(), core.ingress(Direction::SerialToNetwork))?;
//! let _carrier = CarrierMonitor::spawn(core.carrier_handle(), || true, Duration::from_millis(50))?;
//! let _stats = StatsReporter::spawn(Arc::clone(&core), Duration::from_secs(60))?;
//!
//! core.start()?;
//! let thread = ManagementThread::spawn(Arc::clone(&core))?;
//! # thread.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io;

use thiserror::Error;

use modembridge_core::BridgeError;

pub mod carrier;
pub mod report;
pub mod serial;
pub mod telnet;
pub mod worker;

// Re-export common types
pub use carrier::{CarrierMonitor, CarrierProbe};
pub use report::StatsReporter;
pub use serial::{ReadyModem, SerialReader, StreamSerial};
pub use telnet::{IngressSlot, TelnetClient, TelnetConfig};
pub use worker::{ReceiveCounters, ReceiveStats, StopSignal, Worker};

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ConnectorError {
    /// The I/O error kind the core sees for this error
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::NotConnected => io::ErrorKind::NotConnected,
            Self::Resolve { .. } => io::ErrorKind::NotFound,
            Self::Spawn { source, .. } => source.kind(),
            Self::Encode(_) => io::ErrorKind::InvalidData,
            Self::Io(err) => err.kind(),
        }
    }
}

impl From<ConnectorError> for BridgeError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Spawn { .. } => BridgeError::SyncFailure {
                reason: "connector thread could not be started",
            },
            other => BridgeError::Io(other.kind()),
        }
    }
}
