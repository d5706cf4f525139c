//! Statistics snapshot for external reporting
//!
//! A read-only copy of every counter the bridge keeps, taken under the
//! bridge locks in one go so the numbers are mutually consistent.

use crate::buffer::WatermarkLevel;
use crate::pipeline::{Direction, PipelineSnapshot};
use crate::scheduler::SchedulerSnapshot;
use crate::state::{CarrierStats, ConnectionContext, ConnectionMode, SystemState};
use crate::time::Timestamp;

/// Per-direction summary
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DirectionStats {
    pub direction: Direction,
    /// Bytes accepted into the buffer
    pub bytes_received: u64,
    /// Bytes handed to the downstream collaborator
    pub bytes_processed: u64,
    /// Bytes refused by the buffer or discarded by a shrink
    pub bytes_dropped: u64,
    /// Bytes removed by the stream filter
    pub bytes_filtered: u64,
    pub level: WatermarkLevel,
    pub peak_level: WatermarkLevel,
    pub backpressure_active: bool,
    pub buffer_size: usize,
    pub buffer_switches: u64,
    pub pending_output: usize,
    pub avg_processing_ms: f32,
}

impl From<&PipelineSnapshot> for DirectionStats {
    fn from(p: &PipelineSnapshot) -> Self {
        let buffer = &p.buffer;
        Self {
            direction: p.direction,
            bytes_received: buffer.stats.bytes_written,
            bytes_processed: p.stats.bytes_delivered,
            bytes_dropped: buffer.stats.bytes_dropped + buffer.stats.bytes_truncated,
            bytes_filtered: p.stats.bytes_filtered,
            level: buffer.level,
            peak_level: buffer.stats.peak_level,
            backpressure_active: buffer.backpressure_active,
            buffer_size: buffer.buffer_size,
            buffer_switches: buffer.stats.buffer_switches,
            pending_output: p.pending_output,
            avg_processing_ms: p.stats.avg_processing_ms,
        }
    }
}

/// Everything observable about a running bridge
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatisticsSnapshot {
    pub taken_at: Timestamp,
    pub state: SystemState,
    pub mode: ConnectionMode,
    pub transitions: u64,
    pub rejected_transitions: u64,
    /// Indexed by [`Direction::index`]
    pub directions: [DirectionStats; 2],
    /// Smaller over larger bytes served; 1.0 is perfectly even
    pub fairness_ratio: f32,
    pub scheduling_cycles: u64,
    pub ticks: u64,
    pub scheduler: SchedulerSnapshot,
    pub pipelines: [PipelineSnapshot; 2],
    pub carrier: CarrierStats,
    pub connection: ConnectionContext,
}

impl StatisticsSnapshot {
    pub fn direction(&self, direction: Direction) -> &DirectionStats {
        &self.directions[direction.index()]
    }

    pub fn total_processed(&self) -> u64 {
        self.directions.iter().map(|d| d.bytes_processed).sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.directions.iter().map(|d| d.bytes_dropped).sum()
    }

    /// Highest current watermark over both directions
    pub fn worst_level(&self) -> WatermarkLevel {
        self.directions[0].level.max(self.directions[1].level)
    }
}
