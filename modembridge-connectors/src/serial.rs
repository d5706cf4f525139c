//! Stream-backed serial side
//!
//! The serial line is split into its two halves: [`StreamSerial`] is the
//! bridge's `SerialPort` over any writer, [`SerialReader`] pumps any reader
//! into the Serial→Network ingress on its own thread. [`ReadyModem`]
//! reports modem readiness from a shared flag.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modembridge_core::{nb, BridgeError, IngressHandle, ModemStatus, SerialPort};

use crate::worker::{pump, ReceiveCounters, ReceiveStats, Worker};
use crate::ConnectorResult;

/// Retry interval for readers that report `WouldBlock`
const READ_POLL: Duration = Duration::from_millis(5);

/// `SerialPort` over a writer
///
/// A writer that accepts nothing (`Ok(0)`, `WouldBlock`, `Interrupted`)
/// maps to `nb::Error::WouldBlock`, so the pipeline keeps the bytes
/// pending. Other errors surface as `BridgeError::Io`.
#[derive(Debug)]
pub struct StreamSerial<W> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> StreamSerial<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> SerialPort for StreamSerial<W> {
    fn write(&mut self, data: &[u8]) -> nb::Result<usize, BridgeError> {
        match self.inner.write(data) {
            Ok(0) => Err(nb::Error::WouldBlock),
            Ok(n) => {
                self.bytes_written += n as u64;
                if let Err(err) = self.inner.flush() {
                    if err.kind() != io::ErrorKind::WouldBlock {
                        log::warn!("serial flush failed: {}", err);
                    }
                }
                Ok(n)
            }
            Err(err)
                if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) =>
            {
                Err(nb::Error::WouldBlock)
            }
            Err(err) => Err(nb::Error::Other(BridgeError::Io(err.kind()))),
        }
    }
}

/// Thread feeding serial input into the Serial→Network pipeline
///
/// Stops at end of input, on a read error or when stopped. A reader that
/// blocks indefinitely delays stopping until its next byte, so hardware
/// readers should be opened with a read timeout.
#[derive(Debug)]
pub struct SerialReader {
    worker: Worker,
    stats: Arc<ReceiveStats>,
}

impl SerialReader {
    pub fn spawn<R>(mut reader: R, ingress: IngressHandle) -> ConnectorResult<Self>
    where
        R: Read + Send + 'static,
    {
        let stats = Arc::new(ReceiveStats::default());
        let counters = Arc::clone(&stats);
        let worker = Worker::spawn("modembridge-serial-rx", move |stop| {
            match pump(&mut reader, &stop, READ_POLL, &counters, |chunk| ingress.push(chunk)) {
                Ok(()) => log::debug!("serial input closed"),
                Err(err) => log::warn!("serial read failed: {}", err),
            }
        })?;

        Ok(Self { worker, stats })
    }

    pub fn counters(&self) -> ReceiveCounters {
        self.stats.counters()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn stop(self) {
        self.worker.stop();
    }
}

/// Modem readiness from a shared flag
///
/// Clones share the flag, so one clone can be handed to the bridge and
/// another kept by whatever initializes the modem.
#[derive(Debug, Clone)]
pub struct ReadyModem {
    ready: Arc<AtomicBool>,
}

impl ReadyModem {
    pub fn new(ready: bool) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(ready)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }
}

impl Default for ReadyModem {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ModemStatus for ReadyModem {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modembridge_core::{
        BufferConfig, Direction, FilterConfig, MonotonicClock, Pipeline, TimeSource,
    };
    use std::io::Cursor;
    use std::time::Instant;

    struct Stalled;

    impl Write for Stalled {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stream_serial_writes_through() {
        let mut serial = StreamSerial::new(Vec::new());
        assert_eq!(serial.write(b"hello").unwrap(), 5);
        assert_eq!(serial.get_ref().as_slice(), b"hello");
        assert_eq!(serial.bytes_written(), 5);
    }

    #[test]
    fn stream_serial_maps_errors() {
        let mut stalled = StreamSerial::new(Stalled);
        assert!(matches!(stalled.write(b"x"), Err(nb::Error::WouldBlock)));

        let mut broken = StreamSerial::new(Broken);
        assert!(matches!(
            broken.write(b"x"),
            Err(nb::Error::Other(BridgeError::Io(io::ErrorKind::BrokenPipe)))
        ));
    }

    #[test]
    fn reader_feeds_ingress_until_eof() {
        let clock = MonotonicClock::shared();
        let pipeline = Pipeline::new(
            Direction::SerialToNetwork,
            &BufferConfig::default(),
            &FilterConfig::default(),
            512,
            clock.now(),
        )
        .unwrap();

        let reader =
            SerialReader::spawn(Cursor::new(b"ATZ\r\nhello\r\n".to_vec()), pipeline.ingress(clock))
                .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while reader.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(reader.counters().bytes_read, 12);
        assert_eq!(reader.counters().bytes_dropped, 0);
        assert_eq!(pipeline.backlog(), 12);
        reader.stop();
    }

    #[test]
    fn ready_modem_clones_share_flag() {
        let modem = ReadyModem::default();
        let handed_out = modem.clone();
        assert!(handed_out.is_ready());
        modem.set_ready(false);
        assert!(!handed_out.is_ready());
    }
}
