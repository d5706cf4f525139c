//! Common test utilities for integration tests
//!
//! This module provides:
//! - Scripted collaborators whose state stays observable after the core
//!   takes ownership of them
//! - A harness that drives the management loop on a mock clock
//! - Proptest strategies for modem and Telnet traffic

#![allow(dead_code)]

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use modembridge_core::{
    nb, BridgeError, BridgeResult, ModemStatus, NetworkLink, NetworkTarget, SerialPort,
};

pub mod generators;
pub mod harness;

/// Serial port that records what the bridge writes to it
///
/// `accept` caps the bytes taken per write; zero makes every write
/// report `WouldBlock`.
#[derive(Clone)]
pub struct RecordingSerial {
    written: Arc<Mutex<Vec<u8>>>,
    accept: Arc<AtomicUsize>,
}

impl RecordingSerial {
    pub fn new() -> Self {
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            accept: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.written.lock())
    }

    pub fn block(&self) {
        self.accept.store(0, Ordering::SeqCst);
    }

    pub fn limit(&self, per_write: usize) {
        self.accept.store(per_write, Ordering::SeqCst);
    }

    pub fn unblock(&self) {
        self.accept.store(usize::MAX, Ordering::SeqCst);
    }
}

impl SerialPort for RecordingSerial {
    fn write(&mut self, data: &[u8]) -> nb::Result<usize, BridgeError> {
        let accept = self.accept.load(Ordering::SeqCst);
        if accept == 0 {
            return Err(nb::Error::WouldBlock);
        }
        let n = data.len().min(accept);
        self.written.lock().extend_from_slice(&data[..n]);
        Ok(n)
    }
}

/// Shared state behind a [`ScriptedLink`]
#[derive(Debug, Default)]
pub struct LinkScript {
    pub connected: bool,
    pub negotiated: bool,
    /// Connect attempts that fail before one succeeds
    pub failures_left: u32,
    pub connect_calls: u32,
    pub disconnects: u32,
    pub sent: Vec<u8>,
    pub last_target: Option<NetworkTarget>,
}

/// Network link driven by a script the test can change at any time
#[derive(Clone)]
pub struct ScriptedLink {
    script: Arc<Mutex<LinkScript>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        let script = LinkScript {
            negotiated: true,
            ..LinkScript::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn failing(failures: u32) -> Self {
        let link = Self::new();
        link.script.lock().failures_left = failures;
        link
    }

    pub fn with_negotiation_pending() -> Self {
        let link = Self::new();
        link.script.lock().negotiated = false;
        link
    }

    pub fn sent(&self) -> Vec<u8> {
        self.script.lock().sent.clone()
    }

    pub fn connect_calls(&self) -> u32 {
        self.script.lock().connect_calls
    }

    pub fn disconnects(&self) -> u32 {
        self.script.lock().disconnects
    }

    pub fn is_up(&self) -> bool {
        self.script.lock().connected
    }

    /// Remote end closes the connection
    pub fn hang_up(&self) {
        self.script.lock().connected = false;
    }

    pub fn finish_negotiation(&self) {
        self.script.lock().negotiated = true;
    }

    pub fn fail_forever(&self) {
        self.script.lock().failures_left = u32::MAX;
    }
}

impl NetworkLink for ScriptedLink {
    fn connect(&mut self, target: &NetworkTarget) -> BridgeResult<()> {
        let mut script = self.script.lock();
        script.connect_calls += 1;
        script.last_target = Some(target.clone());
        if script.failures_left > 0 {
            script.failures_left = script.failures_left.saturating_sub(1);
            return Err(BridgeError::Io(ErrorKind::ConnectionRefused));
        }
        script.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    fn negotiation_complete(&self) -> bool {
        self.script.lock().negotiated
    }

    fn queue_send(&mut self, data: &[u8]) -> BridgeResult<usize> {
        let mut script = self.script.lock();
        if !script.connected {
            return Err(BridgeError::Io(ErrorKind::NotConnected));
        }
        script.sent.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut script = self.script.lock();
        script.connected = false;
        script.disconnects += 1;
    }
}

/// Modem readiness the test can toggle
#[derive(Clone)]
pub struct SwitchModem {
    ready: Arc<AtomicBool>,
}

impl SwitchModem {
    pub fn new(ready: bool) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(ready)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl ModemStatus for SwitchModem {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
