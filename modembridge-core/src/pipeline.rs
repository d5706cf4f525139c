//! Directional Pipelines
//!
//! ## Overview
//!
//! A pipeline binds one adaptive double buffer, one stream filter and its
//! scheduling bookkeeping into a directional unit. The bridge owns exactly
//! two:
//!
//! ```text
//!  serial rx ─→ IngressHandle ─→ [buffer] ─→ HayesFilter  ─→ NetworkSink ─→ TCP
//!  TCP rx    ─→ IngressHandle ─→ [buffer] ─→ TelnetFilter ─→ SerialSink  ─→ serial tx
//!                                   ↑
//!                      process_chunk (management thread)
//! ```
//!
//! ## Chunk Processing
//!
//! One call to [`Pipeline::process_chunk`]:
//! 1. Delivers output left over from a previous chunk; if the sink still
//!    cannot take all of it, stops there without draining the buffer
//! 2. Reads up to `burst_size` bytes from the buffer
//! 3. Runs the filter (or only its timeouts when nothing was read)
//! 4. Delivers the filtered bytes; whatever the sink refuses stays pending
//!
//! Pending output keeps bytes in order and lets backpressure build up in
//! the buffer when the downstream side is slow.

use std::sync::Arc;

use crate::buffer::{AdaptiveBuffer, BufferSnapshot, ResizeEvent, SharedBuffer};
use crate::config::{BufferConfig, FilterConfig};
use crate::errors::{BridgeError, BridgeResult};
use crate::filter::{FilterSignals, FilterStats, StreamFilter};
use crate::time::{elapsed_ms, Clock, TimeSource, Timestamp};
use crate::traits::{NetworkLink, SerialPort};

/// Data direction through the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    SerialToNetwork,
    NetworkToSerial,
}

impl Direction {
    /// Both directions, in index order
    pub const ALL: [Direction; 2] = [Direction::SerialToNetwork, Direction::NetworkToSerial];

    /// Stable index for per-direction arrays
    pub fn index(self) -> usize {
        match self {
            Direction::SerialToNetwork => 0,
            Direction::NetworkToSerial => 1,
        }
    }

    pub fn other(self) -> Direction {
        match self {
            Direction::SerialToNetwork => Direction::NetworkToSerial,
            Direction::NetworkToSerial => Direction::SerialToNetwork,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::SerialToNetwork => "serial->network",
            Direction::NetworkToSerial => "network->serial",
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ===== SINKS =====

/// Downstream side of a pipeline
pub trait OutputSink {
    /// Deliver as much of `data` as the collaborator accepts now
    ///
    /// Returns the number of bytes accepted; fewer than offered is normal.
    fn deliver(&mut self, data: &[u8]) -> BridgeResult<usize>;
}

/// Serial→Network delivery: queue on the link, then flush
pub struct NetworkSink<'a>(pub &'a mut dyn NetworkLink);

impl OutputSink for NetworkSink<'_> {
    fn deliver(&mut self, data: &[u8]) -> BridgeResult<usize> {
        if !self.0.is_connected() {
            return Err(BridgeError::Io(std::io::ErrorKind::NotConnected));
        }
        let queued = self.0.queue_send(data)?;
        self.0.flush()?;
        Ok(queued)
    }
}

/// Network→Serial delivery: non-blocking serial writes
pub struct SerialSink<'a>(pub &'a mut dyn SerialPort);

impl OutputSink for SerialSink<'_> {
    fn deliver(&mut self, data: &[u8]) -> BridgeResult<usize> {
        let mut sent = 0;
        while sent < data.len() {
            match self.0.write(&data[sent..]) {
                Ok(0) | Err(nb::Error::WouldBlock) => break,
                Ok(n) => sent += n,
                Err(nb::Error::Other(err)) if sent == 0 => return Err(err),
                Err(nb::Error::Other(_)) => break,
            }
        }
        Ok(sent)
    }
}

// ===== INGRESS =====

/// Producer-side handle for pushing received bytes into a pipeline
///
/// Cheap to clone; used by the serial and network receive threads.
#[derive(Clone)]
pub struct IngressHandle {
    direction: Direction,
    buffer: SharedBuffer,
    clock: Clock,
}

impl IngressHandle {
    /// Push received bytes, returning how many were accepted
    ///
    /// Under backpressure nothing is accepted; the drop is counted in the
    /// buffer statistics.
    pub fn push(&self, data: &[u8]) -> usize {
        let now = self.clock.now();
        self.buffer.lock().write(data, now)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_backpressured(&self) -> bool {
        self.buffer.lock().is_backpressure_active()
    }
}

impl core::fmt::Debug for IngressHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IngressHandle")
            .field("direction", &self.direction)
            .finish()
    }
}

// ===== PIPELINE =====

/// Current timeslice bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Timeslice {
    pub start: Timestamp,
    pub duration_ms: u64,
    pub bytes: usize,
}

/// Cumulative pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PipelineStats {
    /// Bytes read from the buffer
    pub bytes_read: u64,
    /// Bytes accepted by the downstream collaborator
    pub bytes_delivered: u64,
    /// Bytes removed by the filter
    pub bytes_filtered: u64,
    /// Chunks processed
    pub chunks: u64,
    /// Chunks that left output pending
    pub partial_deliveries: u64,
    /// Delivery failures reported by the collaborator
    pub delivery_errors: u64,
    /// Moving average of chunk processing time
    pub avg_processing_ms: f32,
    /// Slowest chunk seen
    pub max_processing_ms: u64,
    pub last_chunk_at: Option<Timestamp>,
}

/// Result of one chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Bytes drained from the buffer
    pub read: usize,
    /// Bytes handed to the collaborator
    pub delivered: usize,
    /// Filtered bytes still waiting for the collaborator
    pub pending: usize,
    pub signals: FilterSignals,
    /// Processing time
    pub latency_ms: u64,
    /// Clock reading after processing
    pub finished_at: Timestamp,
    /// Delivery failure, if any; output is kept pending
    pub error: Option<BridgeError>,
}

/// Point-in-time view for statistics
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PipelineSnapshot {
    pub direction: Direction,
    pub active: bool,
    pub pending_output: usize,
    pub timeslice: Timeslice,
    pub buffer: BufferSnapshot,
    pub filter: FilterStats,
    pub stats: PipelineStats,
}

/// One direction of the bridge
pub struct Pipeline {
    direction: Direction,
    buffer: SharedBuffer,
    filter: StreamFilter,
    burst_size: usize,
    scratch: Vec<u8>,
    output: Vec<u8>,
    pending: Vec<u8>,
    active: bool,
    timeslice: Timeslice,
    stats: PipelineStats,
}

const PROCESSING_EMA_ALPHA: f32 = 0.1;

impl Pipeline {
    pub fn new(
        direction: Direction,
        buffers: &BufferConfig,
        filter: &FilterConfig,
        burst_size: usize,
        now: Timestamp,
    ) -> BridgeResult<Self> {
        if burst_size == 0 {
            return Err(BridgeError::InvalidParameter {
                reason: "burst size must be non-zero",
            });
        }
        let buffer = AdaptiveBuffer::new(buffers, now)?.into_shared();
        Ok(Self {
            direction,
            buffer,
            filter: StreamFilter::for_direction(direction, filter),
            burst_size,
            scratch: vec![0; burst_size],
            output: Vec::with_capacity(burst_size * 2),
            pending: Vec::new(),
            active: false,
            timeslice: Timeslice::default(),
            stats: PipelineStats::default(),
        })
    }

    /// Process one chunk into `sink`
    ///
    /// `quantum_ms` is the length of a new timeslice if the current one has
    /// run out.
    pub fn process_chunk(
        &mut self,
        sink: &mut dyn OutputSink,
        clock: &dyn TimeSource,
        quantum_ms: u64,
    ) -> ChunkOutcome {
        let started = clock.now();
        let mut outcome = ChunkOutcome::default();

        if elapsed_ms(self.timeslice.start, started) >= self.timeslice.duration_ms {
            self.timeslice = Timeslice {
                start: started,
                duration_ms: quantum_ms,
                bytes: 0,
            };
        }

        if !self.pending.is_empty() {
            match sink.deliver(&self.pending) {
                Ok(sent) => {
                    self.pending.drain(..sent);
                    outcome.delivered += sent;
                }
                Err(err) => outcome.error = Some(err),
            }
        }

        if self.pending.is_empty() && outcome.error.is_none() {
            outcome.read = self.buffer.lock().read(&mut self.scratch[..self.burst_size], started);

            self.output.clear();
            if outcome.read > 0 {
                outcome.signals =
                    self.filter
                        .process(&self.scratch[..outcome.read], started, &mut self.output);
            } else {
                self.filter.poll(started, &mut self.output);
            }
            self.stats.bytes_filtered +=
                outcome.read.saturating_sub(self.output.len()) as u64;

            if !self.output.is_empty() {
                match sink.deliver(&self.output) {
                    Ok(sent) => {
                        outcome.delivered += sent;
                        self.pending.extend_from_slice(&self.output[sent..]);
                    }
                    Err(err) => {
                        outcome.error = Some(err);
                        self.pending.extend_from_slice(&self.output);
                    }
                }
            }
        }

        if let Some(err) = outcome.error {
            self.stats.delivery_errors += 1;
            log_warn!("{} delivery failed: {}", self.direction, err);
        }
        if !self.pending.is_empty() {
            self.stats.partial_deliveries += 1;
        }

        let finished = clock.now();
        outcome.pending = self.pending.len();
        outcome.latency_ms = elapsed_ms(started, finished);
        outcome.finished_at = finished;

        self.record(&outcome);
        outcome
    }

    fn record(&mut self, outcome: &ChunkOutcome) {
        self.stats.bytes_read += outcome.read as u64;
        self.stats.bytes_delivered += outcome.delivered as u64;
        self.stats.chunks += 1;
        self.stats.last_chunk_at = Some(outcome.finished_at);

        let sample = outcome.latency_ms as f32;
        self.stats.avg_processing_ms = if self.stats.chunks == 1 {
            sample
        } else {
            PROCESSING_EMA_ALPHA * sample + (1.0 - PROCESSING_EMA_ALPHA) * self.stats.avg_processing_ms
        };
        self.stats.max_processing_ms = self.stats.max_processing_ms.max(outcome.latency_ms);
        self.timeslice.bytes += outcome.read;
    }

    /// Apply the buffer resize policy
    pub fn maintain(&mut self, now: Timestamp) -> BridgeResult<Option<ResizeEvent>> {
        self.buffer.lock().check_resize(now)
    }

    /// Bytes waiting in the buffer plus undelivered output
    pub fn backlog(&self) -> usize {
        self.buffer.lock().available() + self.pending.len()
    }

    /// Handle for the receive path feeding this pipeline
    pub fn ingress(&self, clock: Clock) -> IngressHandle {
        IngressHandle {
            direction: self.direction,
            buffer: Arc::clone(&self.buffer),
            clock,
        }
    }

    /// Discard buffered and pending data, returning the bytes discarded
    pub fn discard(&mut self, now: Timestamp) -> usize {
        let pending = self.pending.len();
        self.pending.clear();
        pending + self.buffer.lock().clear(now)
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn filter(&self) -> &StreamFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut StreamFilter {
        &mut self.filter
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn pending_output(&self) -> usize {
        self.pending.len()
    }

    pub fn timeslice(&self) -> Timeslice {
        self.timeslice
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            direction: self.direction,
            active: self.active,
            pending_output: self.pending.len(),
            timeslice: self.timeslice,
            buffer: self.buffer.lock().snapshot(),
            filter: self.filter.stats(),
            stats: self.stats,
        }
    }
}

impl core::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("direction", &self.direction)
            .field("active", &self.active)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::MockTimeSource;

    /// Accepts at most `limit` bytes per delivery
    struct LimitedSink {
        limit: usize,
        received: Vec<u8>,
    }

    impl OutputSink for LimitedSink {
        fn deliver(&mut self, data: &[u8]) -> BridgeResult<usize> {
            let n = data.len().min(self.limit);
            self.received.extend_from_slice(&data[..n]);
            Ok(n)
        }
    }

    fn pipeline(direction: Direction) -> Pipeline {
        Pipeline::new(
            direction,
            &BufferConfig::default(),
            &FilterConfig::default(),
            512,
            0,
        )
        .unwrap()
    }

    #[test]
    fn direction_helpers() {
        assert_eq!(Direction::SerialToNetwork.other(), Direction::NetworkToSerial);
        assert_eq!(Direction::NetworkToSerial.index(), 1);
        assert_eq!(Direction::SerialToNetwork.to_string(), "serial->network");
    }

    #[test]
    fn chunk_filters_and_delivers() {
        let clock = MockTimeSource::shared(0);
        let mut p = pipeline(Direction::NetworkToSerial);
        p.ingress(clock.clone()).push(&[b'h', 0xFF, 0xFB, 0x01, b'i']);

        let mut sink = LimitedSink { limit: usize::MAX, received: Vec::new() };
        let outcome = p.process_chunk(&mut sink, clock.as_ref(), 50);

        assert_eq!(outcome.read, 5);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(sink.received, b"hi");
        assert_eq!(p.stats().bytes_filtered, 3);
        assert_eq!(p.backlog(), 0);
    }

    #[test]
    fn pending_output_blocks_draining() {
        let clock = MockTimeSource::shared(0);
        let mut p = pipeline(Direction::NetworkToSerial);
        let ingress = p.ingress(clock.clone());
        ingress.push(b"abcdef");

        let mut sink = LimitedSink { limit: 1, received: Vec::new() };
        let first = p.process_chunk(&mut sink, clock.as_ref(), 50);
        assert_eq!(first.read, 6);
        assert_eq!(first.pending, 5);

        ingress.push(b"gh");
        let second = p.process_chunk(&mut sink, clock.as_ref(), 50);
        assert_eq!(second.read, 0);
        assert_eq!(second.delivered, 1);
        assert_eq!(p.backlog(), 6);

        sink.limit = usize::MAX;
        let third = p.process_chunk(&mut sink, clock.as_ref(), 50);
        assert_eq!(third.read, 2);
        assert_eq!(sink.received, b"abcdefgh");
        assert_eq!(p.pending_output(), 0);
        assert_eq!(p.stats().partial_deliveries, 2);
    }

    #[test]
    fn burst_size_bounds_chunk() {
        let clock = MockTimeSource::shared(0);
        let mut p = Pipeline::new(
            Direction::NetworkToSerial,
            &BufferConfig::default(),
            &FilterConfig::default(),
            16,
            0,
        )
        .unwrap();
        p.ingress(clock.clone()).push(&[b'x'; 40]);

        let mut sink = LimitedSink { limit: usize::MAX, received: Vec::new() };
        assert_eq!(p.process_chunk(&mut sink, clock.as_ref(), 50).read, 16);
        assert_eq!(p.backlog(), 24);
    }

    #[test]
    fn timeslice_restarts_after_quantum() {
        let clock = MockTimeSource::shared(100);
        let mut p = pipeline(Direction::NetworkToSerial);
        let mut sink = LimitedSink { limit: usize::MAX, received: Vec::new() };

        p.process_chunk(&mut sink, clock.as_ref(), 50);
        assert_eq!(p.timeslice().start, 100);
        clock.advance(30);
        p.process_chunk(&mut sink, clock.as_ref(), 50);
        assert_eq!(p.timeslice().start, 100);
        clock.advance(30);
        p.process_chunk(&mut sink, clock.as_ref(), 50);
        assert_eq!(p.timeslice().start, 160);
    }

    #[test]
    fn serial_sink_stops_on_would_block() {
        struct Slow(usize);
        impl SerialPort for Slow {
            fn write(&mut self, data: &[u8]) -> nb::Result<usize, BridgeError> {
                if self.0 == 0 {
                    return Err(nb::Error::WouldBlock);
                }
                let n = data.len().min(self.0);
                self.0 -= n;
                Ok(n)
            }
        }

        let mut port = Slow(3);
        let mut sink = SerialSink(&mut port);
        assert_eq!(sink.deliver(b"hello").unwrap(), 3);
        assert_eq!(sink.deliver(b"lo").unwrap(), 0);
    }
}
