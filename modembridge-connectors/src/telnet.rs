//! TCP Telnet network link
//!
//! ## Overview
//!
//! [`TelnetClient`] is the bridge's `NetworkLink` to a Telnet back-end:
//!
//! ```text
//!             queue_send            flush (non-blocking)
//!  S→N pipeline ────────→ outbound ────────────────────→ TcpStream
//!                         (IAC doubled)                      │
//!                                                            │ reader thread
//!  N→S pipeline ←──────── IngressSlot ←───────────────────────┘
//!               (raw bytes; the core's Telnet filter strips IAC)
//! ```
//!
//! ## Negotiation
//!
//! On connect the client offers a minimal option set (DO SGA, WILL SGA,
//! DO ECHO). Negotiation counts as complete once the server answers with
//! any WILL/WONT/DO/DONT; a silent server is left to the bridge's
//! Negotiating timeout.
//!
//! ## Ingress Slot
//!
//! The client is handed to the bridge builder before the bridge exists,
//! so the reader thread delivers through an [`IngressSlot`] that is
//! attached to the Network→Serial ingress once the core is built.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use modembridge_core::constants::protocol::{DO, DONT, IAC, OPT_ECHO, OPT_SGA, WILL, WONT};
use modembridge_core::{BridgeError, BridgeResult, IngressHandle, NetworkLink, NetworkTarget};

use crate::worker::{pump, ReceiveCounters, ReceiveStats, Worker};
use crate::{ConnectorError, ConnectorResult};

/// Options offered on connect
pub const HANDSHAKE: [u8; 9] = [IAC, DO, OPT_SGA, IAC, WILL, OPT_SGA, IAC, DO, OPT_ECHO];

/// Telnet client settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelnetConfig {
    /// Per-address TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Reader retry interval when the socket has no data
    pub poll_interval_ms: u64,
    /// Outbound queue limit in wire bytes
    pub max_outbound: usize,
    /// Send the option handshake and wait for an answer
    pub negotiate: bool,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            poll_interval_ms: 10,
            max_outbound: 16 * 1024,
            negotiate: true,
        }
    }
}

/// Late-bound destination for received bytes
///
/// Bytes arriving while nothing is attached are dropped and counted.
#[derive(Debug, Clone, Default)]
pub struct IngressSlot {
    handle: Arc<Mutex<Option<IngressHandle>>>,
    unattached_drops: Arc<AtomicU64>,
}

impl IngressSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, handle: IngressHandle) {
        *self.handle.lock() = Some(handle);
    }

    pub fn detach(&self) -> Option<IngressHandle> {
        self.handle.lock().take()
    }

    pub fn is_attached(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Bytes dropped because nothing was attached
    pub fn unattached_drops(&self) -> u64 {
        self.unattached_drops.load(Ordering::Relaxed)
    }

    /// Deliver `data`, returning the bytes accepted
    pub fn push(&self, data: &[u8]) -> usize {
        match self.handle.lock().as_ref() {
            Some(handle) => handle.push(data),
            None => {
                self.unattached_drops
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                0
            }
        }
    }
}

/// Link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelnetLinkStats {
    pub connects: u64,
    pub connect_failures: u64,
    pub disconnects: u64,
    /// Payload bytes accepted by `queue_send`
    pub bytes_queued: u64,
    /// Wire bytes written to the socket
    pub bytes_sent: u64,
    /// Payload bytes refused because the outbound queue was full
    pub bytes_refused: u64,
}

/// Spots the first option reply from the server
#[derive(Debug, Default)]
struct ReplyScanner {
    saw_iac: bool,
}

impl ReplyScanner {
    fn observe(&mut self, chunk: &[u8]) -> bool {
        for &byte in chunk {
            if self.saw_iac {
                self.saw_iac = false;
                if matches!(byte, WILL | WONT | DO | DONT) {
                    return true;
                }
            } else if byte == IAC {
                self.saw_iac = true;
            }
        }
        false
    }
}

#[derive(Debug)]
struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    alive: Arc<AtomicBool>,
    negotiated: Arc<AtomicBool>,
    reader: Worker,
}

/// `NetworkLink` over a TCP Telnet connection
#[derive(Debug)]
pub struct TelnetClient {
    config: TelnetConfig,
    slot: IngressSlot,
    session: Option<Session>,
    outbound: VecDeque<u8>,
    rx: Arc<ReceiveStats>,
    stats: TelnetLinkStats,
}

impl TelnetClient {
    pub fn new(config: TelnetConfig, slot: IngressSlot) -> Self {
        Self {
            config,
            slot,
            session: None,
            outbound: VecDeque::new(),
            rx: Arc::new(ReceiveStats::default()),
            stats: TelnetLinkStats::default(),
        }
    }

    pub fn config(&self) -> &TelnetConfig {
        &self.config
    }

    pub fn slot(&self) -> &IngressSlot {
        &self.slot
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|s| s.peer)
    }

    pub fn stats(&self) -> TelnetLinkStats {
        self.stats
    }

    pub fn rx_counters(&self) -> ReceiveCounters {
        self.rx.counters()
    }

    /// Wire bytes waiting for the socket
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    fn open(&mut self, target: &NetworkTarget) -> ConnectorResult<()> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut last_err = None;
        let mut connected = None;
        for addr in (target.host.as_str(), target.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    connected = Some((stream, addr));
                    break;
                }
                Err(err) => last_err = Some(err),
            }
        }
        let (stream, peer) = match (connected, last_err) {
            (Some(found), _) => found,
            (None, Some(err)) => return Err(err.into()),
            (None, None) => {
                return Err(ConnectorError::Resolve {
                    host: target.host.clone(),
                    port: target.port,
                })
            }
        };

        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        let mut rx_stream = stream.try_clone()?;

        let alive = Arc::new(AtomicBool::new(true));
        let negotiated = Arc::new(AtomicBool::new(!self.config.negotiate));
        let reader = {
            let alive = Arc::clone(&alive);
            let negotiated = Arc::clone(&negotiated);
            let slot = self.slot.clone();
            let stats = Arc::clone(&self.rx);
            let poll = Duration::from_millis(self.config.poll_interval_ms);
            Worker::spawn("modembridge-telnet-rx", move |stop| {
                let mut scanner = ReplyScanner::default();
                let result = pump(&mut rx_stream, &stop, poll, &stats, |chunk| {
                    if !negotiated.load(Ordering::Relaxed) && scanner.observe(chunk) {
                        negotiated.store(true, Ordering::Release);
                        log::debug!("telnet option reply received");
                    }
                    slot.push(chunk)
                });
                match result {
                    Ok(()) if !stop.is_stopped() => log::info!("telnet peer closed the connection"),
                    Ok(()) => {}
                    Err(err) => log::warn!("telnet read failed: {}", err),
                }
                alive.store(false, Ordering::Release);
            })?
        };

        self.outbound.clear();
        self.session = Some(Session {
            stream,
            peer,
            alive,
            negotiated,
            reader,
        });
        if self.config.negotiate {
            self.outbound.extend(HANDSHAKE);
            self.write_out()?;
        }
        Ok(())
    }

    /// Write queued bytes until the socket would block
    fn write_out(&mut self) -> ConnectorResult<()> {
        let session = self.session.as_ref().ok_or(ConnectorError::NotConnected)?;
        while !self.outbound.is_empty() {
            let (front, _) = self.outbound.as_slices();
            match (&session.stream).write(front) {
                Ok(0) => {
                    session.alive.store(false, Ordering::Release);
                    return Err(ConnectorError::NotConnected);
                }
                Ok(n) => {
                    self.outbound.drain(..n);
                    self.stats.bytes_sent += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    session.alive.store(false, Ordering::Release);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}

impl NetworkLink for TelnetClient {
    fn connect(&mut self, target: &NetworkTarget) -> BridgeResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        // Reap a session whose peer went away
        self.disconnect();

        match self.open(target) {
            Ok(()) => {
                self.stats.connects += 1;
                log::info!("connected to {}", target);
                Ok(())
            }
            Err(err) => {
                self.stats.connect_failures += 1;
                self.session = None;
                log::warn!("connect to {} failed: {}", target, err);
                Err(err.into())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.alive.load(Ordering::Acquire))
    }

    fn negotiation_complete(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.negotiated.load(Ordering::Acquire))
    }

    /// Queue payload bytes, doubling IAC for the wire
    fn queue_send(&mut self, data: &[u8]) -> BridgeResult<usize> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected.into());
        }

        let mut accepted = 0;
        for &byte in data {
            let wire = if byte == IAC { 2 } else { 1 };
            if self.outbound.len() + wire > self.config.max_outbound {
                break;
            }
            self.outbound.push_back(byte);
            if byte == IAC {
                self.outbound.push_back(IAC);
            }
            accepted += 1;
        }

        self.stats.bytes_queued += accepted as u64;
        self.stats.bytes_refused += (data.len() - accepted) as u64;
        Ok(accepted)
    }

    fn flush(&mut self) -> BridgeResult<()> {
        self.write_out().map_err(BridgeError::from)
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.stream.shutdown(Shutdown::Both) {
                if err.kind() != io::ErrorKind::NotConnected {
                    log::debug!("telnet shutdown: {}", err);
                }
            }
            session.reader.stop();
            self.stats.disconnects += 1;
            log::info!("disconnected from {}", session.peer);
        }
        self.outbound.clear();
    }
}

impl Drop for TelnetClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
