//! Background worker threads
//!
//! A [`Worker`] owns one named thread and a [`StopSignal`] the thread
//! checks between bounded waits. Stopping sets the flag, wakes the thread
//! and joins it; dropping a worker stops it.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::{ConnectorError, ConnectorResult};

/// Size of one receive read
pub const RECEIVE_CHUNK: usize = 512;

/// Stop flag with a condition variable for interruptible sleeps
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for `timeout` or until stopped; returns true if stopped
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.wake.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

/// A named background thread with a stop signal
#[derive(Debug)]
pub struct Worker {
    name: &'static str,
    stop: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Run `body` on a new thread named `name`
    pub fn spawn<F>(name: &'static str, body: F) -> ConnectorResult<Self>
    where
        F: FnOnce(Arc<StopSignal>) + Send + 'static,
    {
        let stop = Arc::new(StopSignal::new());
        let signal = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || body(signal))
            .map_err(|source| ConnectorError::Spawn { name, source })?;

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} thread panicked", self.name);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.join();
    }
}

/// Counters for one receive path
#[derive(Debug, Default)]
pub struct ReceiveStats {
    reads: AtomicU64,
    bytes_read: AtomicU64,
    bytes_dropped: AtomicU64,
}

/// Copy of [`ReceiveStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveCounters {
    pub reads: u64,
    pub bytes_read: u64,
    /// Bytes the bridge refused (backpressure or full buffer)
    pub bytes_dropped: u64,
}

impl ReceiveStats {
    pub fn counters(&self) -> ReceiveCounters {
        ReceiveCounters {
            reads: self.reads.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, read: usize, accepted: usize) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(read as u64, Ordering::Relaxed);
        self.bytes_dropped
            .fetch_add(read.saturating_sub(accepted) as u64, Ordering::Relaxed);
    }
}

/// Copy bytes from `reader` into `deliver` until EOF or stop
///
/// `deliver` returns how many bytes the bridge accepted; the rest is
/// counted as dropped. `WouldBlock`, `TimedOut` and `Interrupted` are
/// treated as "no data yet" and retried after `poll`. Any other error
/// ends the pump.
pub fn pump<R, F>(
    reader: &mut R,
    stop: &StopSignal,
    poll: Duration,
    stats: &ReceiveStats,
    mut deliver: F,
) -> io::Result<()>
where
    R: Read + ?Sized,
    F: FnMut(&[u8]) -> usize,
{
    let mut buf = [0u8; RECEIVE_CHUNK];
    while !stop.is_stopped() {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                let accepted = deliver(&buf[..n]);
                stats.record(n, accepted);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                if stop.wait(poll) {
                    break;
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
