//! Adaptive Double Buffer with Watermark Backpressure
//!
//! ## Overview
//!
//! Every pipeline direction owns one adaptive double buffer. A producer
//! thread (serial or network receive path) writes into it; the management
//! thread drains it one chunk at a time. The buffer has two same-sized
//! regions:
//!
//! ```text
//!            writer                                    reader
//!              │                                         ▲
//!              ▼                                         │
//!   ┌─────────────────────┐                 ┌─────────────────────┐
//!   │ sub  (write target) │ ──── switch ──→ │ main (drain region) │
//!   │ [0 .. sub_len)      │                 │ [main_pos..main_len)│
//!   └─────────────────────┘                 └─────────────────────┘
//! ```
//!
//! When the reader exhausts `main` and `sub` holds data, the regions are
//! switched (two handle swaps, no copying). When the writer fills `sub`
//! while `main` is already drained, the writer switches early so the whole
//! capacity of both regions is usable.
//!
//! ## Invariants
//!
//! - `unread(main) + sub_len <= 2 × buffer_size`
//! - Bytes leave `read` in exactly the order they entered `write`
//! - The watermark level is a pure function of `used / (2 × buffer_size)`
//!
//! ## Backpressure
//!
//! Backpressure follows the hysteresis in [`backpressure`]: a write that
//! finds the buffer at High/Critical (or already under backpressure) is
//! dropped entirely and counted as an overflow. Nothing is surfaced as an
//! error; producers observe the return value and the statistics.
//!
//! ## Adaptive Resize
//!
//! [`AdaptiveBuffer::check_resize`] runs at most once per cool-down period
//! and grows the regions by a fixed step under sustained pressure (fill
//! ratio above 85% or three consecutive overflows), or shrinks them when
//! mostly idle (below 15%). Resizing allocates new regions from the pool,
//! copies content in order, and truncates the newest bytes with a warning if
//! the content no longer fits.

pub mod backpressure;
pub mod watermark;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::BufferConfig;
use crate::constants::buffers::{
    POOL_REGIONS, RESIZE_GROW_RATIO, RESIZE_OVERFLOW_TRIGGER, RESIZE_SHRINK_RATIO,
};
use crate::errors::{BridgeError, BridgeResult};
use crate::pool::{MemoryPool, PoolHandle, PoolStats};
use crate::time::{elapsed_ms, Timestamp};

pub use backpressure::{BackpressureChange, BackpressureControl};
pub use watermark::{WatermarkLevel, WatermarkThresholds};

/// Buffer handle shared between a producer thread and the management thread
pub type SharedBuffer = Arc<Mutex<AdaptiveBuffer>>;

/// Cumulative buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BufferStats {
    /// Bytes accepted by `write`
    pub bytes_written: u64,
    /// Bytes returned by `read`
    pub bytes_read: u64,
    /// Bytes refused by `write` (backpressure or no space)
    pub bytes_dropped: u64,
    /// Bytes discarded by a shrinking resize
    pub bytes_truncated: u64,
    /// Writes that dropped some or all of their data
    pub overflow_events: u64,
    /// Reads that found nothing to return
    pub underflow_events: u64,
    /// Main/sub region switches
    pub buffer_switches: u64,
    /// Resizes that grew the regions
    pub grow_events: u64,
    /// Resizes that shrank the regions
    pub shrink_events: u64,
    /// Highest fill seen (bytes)
    pub peak_used: usize,
    /// Highest watermark level seen
    pub peak_level: WatermarkLevel,
}

/// Outcome of a resize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    /// Region size before
    pub from: usize,
    /// Region size after
    pub to: usize,
    /// Bytes discarded because they no longer fit
    pub truncated: usize,
}

/// Point-in-time view of a buffer for reporting
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BufferSnapshot {
    pub buffer_size: usize,
    pub capacity: usize,
    pub used: usize,
    pub level: WatermarkLevel,
    pub backpressure_active: bool,
    pub backpressure_since: Option<Timestamp>,
    pub consecutive_overflows: u32,
    pub consecutive_underflows: u32,
    pub stats: BufferStats,
    pub pool: PoolStats,
}

/// Per-direction double buffer
pub struct AdaptiveBuffer {
    pool: MemoryPool,
    main: PoolHandle,
    main_len: usize,
    main_pos: usize,
    sub: PoolHandle,
    sub_len: usize,
    buffer_size: usize,
    min_size: usize,
    max_size: usize,
    resize_step: usize,
    resize_cooldown_ms: u64,
    thresholds: WatermarkThresholds,
    backpressure: BackpressureControl,
    last_resize_check: Timestamp,
    consecutive_overflows: u32,
    consecutive_underflows: u32,
    stats: BufferStats,
}

impl AdaptiveBuffer {
    /// Create a buffer from configuration
    ///
    /// `now` seeds the resize cool-down, so the first resize decision can
    /// happen one cool-down period after creation.
    pub fn new(config: &BufferConfig, now: Timestamp) -> BridgeResult<Self> {
        config.validate()?;

        let mut pool = MemoryPool::new(config.max_size * POOL_REGIONS, config.pool_block_size)?;
        let main = pool.allocate(config.initial_size)?;
        let sub = pool.allocate(config.initial_size)?;

        Ok(Self {
            pool,
            main,
            main_len: 0,
            main_pos: 0,
            sub,
            sub_len: 0,
            buffer_size: config.initial_size,
            min_size: config.min_size,
            max_size: config.max_size,
            resize_step: config.resize_step,
            resize_cooldown_ms: config.resize_cooldown_ms,
            thresholds: WatermarkThresholds::for_capacity(config.initial_size * 2),
            backpressure: BackpressureControl::new(),
            last_resize_check: now,
            consecutive_overflows: 0,
            consecutive_underflows: 0,
            stats: BufferStats::default(),
        })
    }

    /// Create a buffer with `size`-byte regions and default policy
    ///
    /// Bounds are widened to include `size` if necessary.
    pub fn with_size(size: usize) -> BridgeResult<Self> {
        let defaults = BufferConfig::default();
        let config = BufferConfig {
            initial_size: size,
            min_size: defaults.min_size.min(size),
            max_size: defaults.max_size.max(size),
            ..defaults
        };
        Self::new(&config, 0)
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedBuffer {
        Arc::new(Mutex::new(self))
    }

    // ========================================================================
    // Producer side
    // ========================================================================

    /// Write bytes into the sub region
    ///
    /// Returns the number of bytes accepted. Under backpressure nothing is
    /// accepted and the whole slice counts as dropped.
    pub fn write(&mut self, data: &[u8], now: Timestamp) -> usize {
        if data.is_empty() {
            return 0;
        }

        self.refresh_backpressure(now);
        if self.backpressure.is_active() {
            self.record_overflow(data.len());
            return 0;
        }

        let mut written = 0;
        while written < data.len() {
            let space = self.buffer_size - self.sub_len;
            if space == 0 {
                if self.main_unread() == 0 {
                    self.switch_regions();
                    continue;
                }
                break;
            }

            let n = space.min(data.len() - written);
            let offset = self.sub_len;
            self.pool.bytes_mut(&self.sub)[offset..offset + n]
                .copy_from_slice(&data[written..written + n]);
            self.sub_len += n;
            written += n;
        }

        if written > 0 {
            self.consecutive_overflows = 0;
            self.stats.bytes_written += written as u64;
        }
        if written < data.len() {
            let dropped = data.len() - written;
            self.stats.bytes_dropped += dropped as u64;
            self.stats.overflow_events += 1;
            if written == 0 {
                self.consecutive_overflows += 1;
            }
        }

        self.record_usage();
        self.refresh_backpressure(now);
        written
    }

    // ========================================================================
    // Consumer side
    // ========================================================================

    /// Read up to `out.len()` bytes in write order
    pub fn read(&mut self, out: &mut [u8], now: Timestamp) -> usize {
        if out.is_empty() {
            return 0;
        }

        let mut copied = 0;
        while copied < out.len() {
            if self.main_unread() == 0 {
                if self.sub_len == 0 {
                    break;
                }
                self.switch_regions();
            }

            let n = self.main_unread().min(out.len() - copied);
            let start = self.main_pos;
            out[copied..copied + n].copy_from_slice(&self.pool.bytes(&self.main)[start..start + n]);
            self.main_pos += n;
            copied += n;
        }

        if copied == 0 {
            self.stats.underflow_events += 1;
            self.consecutive_underflows += 1;
        } else {
            self.consecutive_underflows = 0;
            self.stats.bytes_read += copied as u64;
        }

        self.refresh_backpressure(now);
        copied
    }

    /// Discard all buffered content, returning the bytes discarded
    pub fn clear(&mut self, now: Timestamp) -> usize {
        let discarded = self.available();
        self.main_len = 0;
        self.main_pos = 0;
        self.sub_len = 0;
        self.stats.bytes_dropped += discarded as u64;
        self.refresh_backpressure(now);
        discarded
    }

    // ========================================================================
    // Resize
    // ========================================================================

    /// Apply the grow/shrink policy, at most once per cool-down period
    pub fn check_resize(&mut self, now: Timestamp) -> BridgeResult<Option<ResizeEvent>> {
        if elapsed_ms(self.last_resize_check, now) < self.resize_cooldown_ms {
            return Ok(None);
        }
        self.last_resize_check = now;

        let ratio = self.fill_ratio();
        let target = if ratio > RESIZE_GROW_RATIO
            || self.consecutive_overflows >= RESIZE_OVERFLOW_TRIGGER
        {
            (self.buffer_size + self.resize_step).min(self.max_size)
        } else if ratio < RESIZE_SHRINK_RATIO {
            self.buffer_size.saturating_sub(self.resize_step).max(self.min_size)
        } else {
            self.buffer_size
        };

        if target == self.buffer_size {
            return Ok(None);
        }
        self.resize(target, now).map(Some)
    }

    /// Reallocate both regions at `new_size`, preserving content order
    pub fn resize(&mut self, new_size: usize, now: Timestamp) -> BridgeResult<ResizeEvent> {
        if new_size == 0 {
            return Err(BridgeError::InvalidParameter {
                reason: "buffer size must be non-zero",
            });
        }

        let new_main = self.pool.allocate(new_size)?;
        let new_sub = match self.pool.allocate(new_size) {
            Ok(handle) => handle,
            Err(err) => {
                self.pool.release(new_main);
                return Err(err);
            }
        };

        let unread_main = self.main_unread();
        let total = unread_main + self.sub_len;
        let keep = total.min(new_size * 2);

        let segments = [
            (&self.main, self.main_pos, unread_main),
            (&self.sub, 0, self.sub_len),
        ];
        let mut placed = 0;
        for (src, offset, len) in segments {
            let len = len.min(keep - placed);
            let mut copied = 0;
            while copied < len {
                let (dst, dst_offset) = if placed < new_size {
                    (&new_main, placed)
                } else {
                    (&new_sub, placed - new_size)
                };
                let n = (new_size - dst_offset).min(len - copied);
                self.pool.copy_between(src, offset + copied, dst, dst_offset, n);
                copied += n;
                placed += n;
            }
        }

        let old_main = core::mem::replace(&mut self.main, new_main);
        let old_sub = core::mem::replace(&mut self.sub, new_sub);
        self.pool.release(old_main);
        self.pool.release(old_sub);

        let event = ResizeEvent {
            from: self.buffer_size,
            to: new_size,
            truncated: total - keep,
        };

        self.main_len = placed.min(new_size);
        self.main_pos = 0;
        self.sub_len = placed.saturating_sub(new_size);
        self.buffer_size = new_size;
        self.thresholds = WatermarkThresholds::for_capacity(new_size * 2);
        self.last_resize_check = now;

        if event.to > event.from {
            self.stats.grow_events += 1;
            self.consecutive_overflows = 0;
        } else {
            self.stats.shrink_events += 1;
        }

        if event.truncated > 0 {
            self.stats.bytes_truncated += event.truncated as u64;
            log_warn!(
                "Buffer resize {} -> {} truncated {} bytes",
                event.from, event.to, event.truncated
            );
        } else {
            log_info!("Buffer resized {} -> {} bytes per region", event.from, event.to);
        }

        self.refresh_backpressure(now);
        Ok(event)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Bytes waiting to be read
    pub fn available(&self) -> usize {
        self.main_unread() + self.sub_len
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Size of one region
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Total capacity of both regions
    pub fn capacity(&self) -> usize {
        self.buffer_size * 2
    }

    /// Free space across both regions
    pub fn free_space(&self) -> usize {
        self.capacity() - self.available()
    }

    pub fn fill_ratio(&self) -> f32 {
        self.available() as f32 / self.capacity() as f32
    }

    /// Current watermark level
    pub fn level(&self) -> WatermarkLevel {
        self.thresholds.classify(self.available())
    }

    pub fn thresholds(&self) -> &WatermarkThresholds {
        &self.thresholds
    }

    pub fn is_backpressure_active(&self) -> bool {
        self.backpressure.is_active()
    }

    pub fn backpressure(&self) -> &BackpressureControl {
        &self.backpressure
    }

    pub fn consecutive_overflows(&self) -> u32 {
        self.consecutive_overflows
    }

    pub fn consecutive_underflows(&self) -> u32 {
        self.consecutive_underflows
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            buffer_size: self.buffer_size,
            capacity: self.capacity(),
            used: self.available(),
            level: self.level(),
            backpressure_active: self.backpressure.is_active(),
            backpressure_since: self.backpressure.active_since(),
            consecutive_overflows: self.consecutive_overflows,
            consecutive_underflows: self.consecutive_underflows,
            stats: self.stats,
            pool: self.pool.stats(),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn main_unread(&self) -> usize {
        self.main_len - self.main_pos
    }

    /// Swap regions; only valid once main is drained
    fn switch_regions(&mut self) {
        debug_assert_eq!(self.main_unread(), 0);
        core::mem::swap(&mut self.main, &mut self.sub);
        self.main_len = self.sub_len;
        self.main_pos = 0;
        self.sub_len = 0;
        self.stats.buffer_switches += 1;
    }

    fn record_overflow(&mut self, dropped: usize) {
        self.stats.bytes_dropped += dropped as u64;
        self.stats.overflow_events += 1;
        self.consecutive_overflows += 1;
    }

    fn record_usage(&mut self) {
        let used = self.available();
        if used > self.stats.peak_used {
            self.stats.peak_used = used;
        }
        let level = self.level();
        if level > self.stats.peak_level {
            self.stats.peak_level = level;
        }
    }

    fn refresh_backpressure(&mut self, now: Timestamp) {
        match self.backpressure.update(self.level(), now) {
            BackpressureChange::Applied => {
                log_debug!(
                    "Backpressure applied at {} of {} bytes",
                    self.available(),
                    self.capacity()
                );
            }
            BackpressureChange::Released { held_ms } => {
                log_debug!("Backpressure released after {}ms", held_ms);
            }
            BackpressureChange::Unchanged => {}
        }
    }
}

impl core::fmt::Debug for AdaptiveBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdaptiveBuffer")
            .field("buffer_size", &self.buffer_size)
            .field("available", &self.available())
            .field("level", &self.level())
            .field("backpressure", &self.backpressure.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buffer: &mut AdaptiveBuffer, now: Timestamp) -> Vec<u8> {
        let mut out = vec![0u8; buffer.capacity()];
        let n = buffer.read(&mut out, now);
        out.truncate(n);
        out
    }

    #[test]
    fn write_then_read_preserves_order() {
        let mut buffer = AdaptiveBuffer::with_size(1024).unwrap();
        assert_eq!(buffer.write(b"hello ", 0), 6);
        assert_eq!(buffer.write(b"world", 0), 5);
        assert_eq!(buffer.available(), 11);

        assert_eq!(drain(&mut buffer, 0), b"hello world");
        assert!(buffer.is_empty());
    }

    #[test]
    fn reader_switches_regions() {
        let mut buffer = AdaptiveBuffer::with_size(1024).unwrap();
        buffer.write(b"abc", 0);

        let mut out = [0u8; 2];
        assert_eq!(buffer.read(&mut out, 0), 2);
        assert_eq!(&out, b"ab");
        assert_eq!(buffer.stats().buffer_switches, 1);

        // New writes land in the (now empty) sub region behind "c"
        buffer.write(b"de", 0);
        assert_eq!(drain(&mut buffer, 0), b"cde");
        assert_eq!(buffer.stats().buffer_switches, 2);
    }

    #[test]
    fn writer_uses_both_regions_when_main_drained() {
        let mut buffer = AdaptiveBuffer::with_size(1024).unwrap();
        let data = vec![7u8; 1500];

        assert_eq!(buffer.write(&data, 0), 1500);
        assert_eq!(buffer.available(), 1500);
        assert_eq!(buffer.stats().buffer_switches, 1);
    }

    #[test]
    fn high_watermark_triggers_backpressure_and_drops() {
        // Two 2048-byte regions: 4096 bytes of capacity
        let mut buffer = AdaptiveBuffer::with_size(2048).unwrap();

        assert_eq!(buffer.write(&vec![1u8; 3900], 0), 3900);
        assert!(buffer.level() >= WatermarkLevel::High);
        assert!(buffer.is_backpressure_active());

        let overflows = buffer.stats().overflow_events;
        assert_eq!(buffer.write(&[2u8; 50], 1), 0);
        assert_eq!(buffer.stats().overflow_events, overflows + 1);
        assert_eq!(buffer.consecutive_overflows(), 1);
        assert_eq!(buffer.available(), 3900);
    }

    #[test]
    fn backpressure_not_released_at_normal() {
        let mut buffer = AdaptiveBuffer::with_size(1000).unwrap();
        buffer.write(&vec![0u8; 1700], 0); // 85% -> High
        assert!(buffer.is_backpressure_active());

        // Drain to 50%: Normal keeps backpressure
        let mut out = vec![0u8; 700];
        buffer.read(&mut out, 1);
        assert_eq!(buffer.level(), WatermarkLevel::Normal);
        assert!(buffer.is_backpressure_active());
        assert_eq!(buffer.write(b"x", 2), 0);

        // Drain to 15%: Low releases
        let mut out = vec![0u8; 700];
        buffer.read(&mut out, 3);
        assert_eq!(buffer.level(), WatermarkLevel::Low);
        assert!(!buffer.is_backpressure_active());
        assert_eq!(buffer.write(b"x", 4), 1);
    }

    #[test]
    fn partial_write_when_sub_full_and_main_unread() {
        let mut buffer = AdaptiveBuffer::with_size(1000).unwrap();
        buffer.write(&vec![0u8; 1000], 0); // fills sub, 50%
        let mut out = [0u8; 1];
        buffer.read(&mut out, 0); // switch: main has 999 unread

        let written = buffer.write(&vec![1u8; 1200], 0);
        assert_eq!(written, 1000);
        assert_eq!(buffer.stats().bytes_dropped, 200);
        assert_eq!(buffer.consecutive_overflows(), 0);
    }

    #[test]
    fn underflow_counted_on_empty_read() {
        let mut buffer = AdaptiveBuffer::with_size(1024).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(buffer.read(&mut out, 0), 0);
        assert_eq!(buffer.read(&mut out, 0), 0);
        assert_eq!(buffer.stats().underflow_events, 2);
        assert_eq!(buffer.consecutive_underflows(), 2);
    }

    #[test]
    fn resize_is_rate_limited() {
        let mut buffer = AdaptiveBuffer::with_size(4096).unwrap();

        // Idle buffer shrinks, but only after the cool-down
        assert_eq!(buffer.check_resize(1_000).unwrap(), None);
        let event = buffer.check_resize(30_000).unwrap().unwrap();
        assert_eq!(event.from, 4096);
        assert_eq!(event.to, 3072);

        assert_eq!(buffer.check_resize(45_000).unwrap(), None);
        assert!(buffer.check_resize(60_000).unwrap().is_some());
    }

    #[test]
    fn consecutive_overflows_force_growth() {
        let mut buffer = AdaptiveBuffer::with_size(2048).unwrap();
        buffer.write(&vec![0u8; 3500], 0);
        for t in 1..=3 {
            assert_eq!(buffer.write(b"more", t), 0);
        }
        assert_eq!(buffer.consecutive_overflows(), 3);

        let event = buffer.check_resize(30_000).unwrap().unwrap();
        assert_eq!(event.to, 3072);
        assert_eq!(event.truncated, 0);
        assert_eq!(buffer.consecutive_overflows(), 0);
        assert_eq!(buffer.available(), 3500);
    }

    #[test]
    fn growth_capped_at_max() {
        let config = BufferConfig {
            initial_size: 2048,
            min_size: 1024,
            max_size: 2048,
            ..BufferConfig::default()
        };
        let mut buffer = AdaptiveBuffer::new(&config, 0).unwrap();
        buffer.write(&vec![0u8; 3800], 0);
        assert_eq!(buffer.check_resize(30_000).unwrap(), None);
    }

    #[test]
    fn shrinking_resize_truncates_newest() {
        let mut buffer = AdaptiveBuffer::with_size(2048).unwrap();
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        buffer.write(&data, 0);

        let event = buffer.resize(1024, 1).unwrap();
        assert_eq!(event.truncated, 3000 - 2048);
        assert_eq!(buffer.buffer_size(), 1024);
        assert_eq!(buffer.stats().bytes_truncated, 952);

        let out = drain(&mut buffer, 2);
        assert_eq!(out, &data[..2048]);
    }

    #[test]
    fn resize_preserves_partially_read_content() {
        let mut buffer = AdaptiveBuffer::with_size(1024).unwrap();
        buffer.write(b"0123456789", 0);
        let mut out = [0u8; 4];
        buffer.read(&mut out, 0);
        buffer.write(b"abc", 0);

        buffer.resize(2048, 1).unwrap();
        assert_eq!(drain(&mut buffer, 2), b"456789abc");
        assert_eq!(buffer.pool_stats().allocated_blocks, 2 * 2048 / 256);
    }

    #[test]
    fn clear_discards_everything() {
        let mut buffer = AdaptiveBuffer::with_size(1024).unwrap();
        buffer.write(b"pending", 0);
        assert_eq!(buffer.clear(1), 7);
        assert!(buffer.is_empty());
        assert_eq!(buffer.stats().bytes_dropped, 7);
    }
}
