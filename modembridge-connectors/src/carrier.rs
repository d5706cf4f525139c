//! Polled carrier-detect monitor
//!
//! Serial hardware rarely delivers DCD as an interrupt to user space, so
//! [`CarrierMonitor`] samples a [`CarrierProbe`] at a fixed interval and
//! posts an edge to the bridge whenever the level changes. Posting never
//! blocks, so a slow management tick cannot stall the monitor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use modembridge_core::CarrierHandle;

use crate::worker::Worker;
use crate::ConnectorResult;

/// Source of the current carrier-detect level
pub trait CarrierProbe: Send + 'static {
    /// True while carrier is present
    fn sample(&mut self) -> bool;
}

impl<F> CarrierProbe for F
where
    F: FnMut() -> bool + Send + 'static,
{
    fn sample(&mut self) -> bool {
        self()
    }
}

#[derive(Debug, Default)]
struct MonitorStats {
    samples: AtomicU64,
    rising: AtomicU64,
    falling: AtomicU64,
    /// Edges that reached the bridge only as overflow flags
    unqueued: AtomicU64,
}

/// Copy of the monitor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CarrierCounters {
    pub samples: u64,
    pub rising: u64,
    pub falling: u64,
    pub unqueued: u64,
}

/// Thread turning probe samples into carrier edges
#[derive(Debug)]
pub struct CarrierMonitor {
    worker: Worker,
    stats: Arc<MonitorStats>,
}

impl CarrierMonitor {
    /// Start sampling `probe` every `interval`
    ///
    /// The line is assumed down at start, so a probe that already reads
    /// high produces a rising edge on the first sample.
    pub fn spawn<P: CarrierProbe>(
        carrier: CarrierHandle,
        mut probe: P,
        interval: Duration,
    ) -> ConnectorResult<Self> {
        let stats = Arc::new(MonitorStats::default());
        let counters = Arc::clone(&stats);
        let worker = Worker::spawn("modembridge-carrier", move |stop| {
            let mut level = false;
            loop {
                let sample = probe.sample();
                counters.samples.fetch_add(1, Ordering::Relaxed);
                if sample != level {
                    level = sample;
                    let post = if level {
                        counters.rising.fetch_add(1, Ordering::Relaxed);
                        carrier.rising()
                    } else {
                        counters.falling.fetch_add(1, Ordering::Relaxed);
                        carrier.falling()
                    };
                    if !post.queued {
                        counters.unqueued.fetch_add(1, Ordering::Relaxed);
                    }
                    log::debug!("carrier {}", if level { "up" } else { "down" });
                }
                if stop.wait(interval) {
                    break;
                }
            }
        })?;

        Ok(Self { worker, stats })
    }

    pub fn counters(&self) -> CarrierCounters {
        CarrierCounters {
            samples: self.stats.samples.load(Ordering::Relaxed),
            rising: self.stats.rising.load(Ordering::Relaxed),
            falling: self.stats.falling.load(Ordering::Relaxed),
            unqueued: self.stats.unqueued.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn stop(self) {
        self.worker.stop();
    }
}
