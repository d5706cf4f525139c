//! Periodic statistics export
//!
//! Logs a JSON rendering of [`StatisticsSnapshot`] at a fixed interval, one
//! line per report, plus a final report when stopped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modembridge_core::{BridgeCore, StatisticsSnapshot};

use crate::worker::Worker;
use crate::ConnectorResult;

/// Log target for statistics lines
pub const REPORT_TARGET: &str = "modembridge::stats";

#[derive(Debug)]
pub struct StatsReporter {
    worker: Worker,
    reports: Arc<AtomicU64>,
}

impl StatsReporter {
    /// Render one snapshot as a single JSON line
    pub fn render(snapshot: &StatisticsSnapshot) -> ConnectorResult<String> {
        Ok(serde_json::to_string(snapshot)?)
    }

    pub fn spawn(core: Arc<BridgeCore>, interval: Duration) -> ConnectorResult<Self> {
        let reports = Arc::new(AtomicU64::new(0));
        let count = Arc::clone(&reports);
        let worker = Worker::spawn("modembridge-stats", move |stop| loop {
            let stopped = stop.wait(interval);
            match Self::render(&core.snapshot()) {
                Ok(line) => {
                    log::info!(target: REPORT_TARGET, "{}", line);
                    count.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => log::warn!("statistics not rendered: {}", err),
            }
            if stopped {
                break;
            }
        })?;

        Ok(Self { worker, reports })
    }

    /// Reports logged so far
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    pub fn stop(self) {
        self.worker.stop();
    }
}
