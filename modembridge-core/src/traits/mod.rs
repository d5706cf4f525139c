//! Core Traits and Abstractions
//!
//! This module provides the trait definitions at the seams between the
//! bridge core and everything it does not own.
//!
//! ## Module Organization
//!
//! - [`collaborators`] - Serial, network and modem-status contracts
//! - [`environment`] - The view of the world the state machine runs against
//! - [`time`] - Time source abstraction
//!
//! ## Design Philosophy
//!
//! The core never touches a file descriptor or socket. Serial and network
//! I/O, Telnet negotiation at connect time and carrier sensing all live
//! behind these traits, which lets the whole core run under a mock clock
//! with in-memory collaborators:
//!
//! ```text
//!   serial rx thread ──push──→ [S→N buffer] ──chunk──→ Hayes filter ──→ NetworkLink
//!   network rx thread ─push──→ [N→S buffer] ──chunk──→ Telnet filter ─→ SerialPort
//!   carrier probe ─────edge──→ CarrierBridge ──drain──→ StateMachine ──→ StateEnvironment
//! ```

pub mod collaborators;
pub mod environment;
pub mod time;

pub use collaborators::{AlwaysReady, ModemStatus, NetworkLink, SerialPort};
pub use environment::StateEnvironment;
pub use time::TimeSource;
