//! Buffer Sizes, Watermarks and Resize Policy
//!
//! This module defines the sizing of the per-direction adaptive double
//! buffers, the watermark thresholds that drive backpressure, and the
//! block geometry of the memory pool backing them.

// ===== DOUBLE BUFFER SIZES =====

/// Default size of one buffer region (bytes).
///
/// Each pipeline owns two regions of this size (main + sub):
/// - 2 × 4096 = 8KB per direction
/// - Holds several seconds of traffic even at 19200 bps
/// - Large enough for a full Telnet screen redraw burst
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Smallest region size the resize policy may shrink to (bytes).
///
/// Keeps at least one full line plus escape overhead buffered.
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Largest region size the resize policy may grow to (bytes).
///
/// Caps memory at 2 × 16KB per direction regardless of sustained overflow.
pub const MAX_BUFFER_SIZE: usize = 16384;

/// Fixed step applied on each grow or shrink (bytes).
pub const RESIZE_STEP: usize = 1024;

/// Minimum interval between two resize decisions (milliseconds).
///
/// Rate-limits reallocation so a bursty link does not thrash the pool.
pub const RESIZE_COOLDOWN_MS: u64 = 30_000;

/// Fill ratio above which the buffer grows.
pub const RESIZE_GROW_RATIO: f32 = 0.85;

/// Fill ratio below which the buffer shrinks.
pub const RESIZE_SHRINK_RATIO: f32 = 0.15;

/// Consecutive overflow events that force a grow regardless of fill ratio.
pub const RESIZE_OVERFLOW_TRIGGER: u32 = 3;

// ===== WATERMARK THRESHOLDS =====

/// Critical watermark (percent of total capacity, inclusive).
pub const WATERMARK_CRITICAL_PCT: usize = 95;

/// High watermark (percent of total capacity, inclusive).
///
/// Backpressure is applied once the fill level reaches this mark.
pub const WATERMARK_HIGH_PCT: usize = 80;

/// Low watermark (percent of total capacity, inclusive).
///
/// Backpressure is released once the fill level drops to this mark.
pub const WATERMARK_LOW_PCT: usize = 20;

/// Empty watermark (percent of total capacity, inclusive).
pub const WATERMARK_EMPTY_PCT: usize = 5;

// ===== MEMORY POOL =====

/// Block size of the buffer memory pool (bytes).
///
/// Region sizes are multiples of the resize step, which is itself a
/// multiple of this block, so regions never leave partial blocks behind.
pub const POOL_BLOCK_SIZE: usize = 256;

/// Arena capacity expressed in maximum-size regions.
///
/// Two live regions plus two replacement regions during a resize.
pub const POOL_REGIONS: usize = 4;

// ===== CHUNK PROCESSING =====

/// Bytes drained from a buffer per processed chunk.
///
/// At 2400 bps a 512-byte chunk is roughly two seconds of line time,
/// so one chunk never monopolizes a quantum on slow links.
pub const DEFAULT_BURST_SIZE: usize = 512;

/// Capacity of the Hayes filter line-assembly buffer (bytes).
///
/// Hayes modems accept command lines of at most 40-255 characters.
pub const LINE_BUFFER_SIZE: usize = 256;

/// Capacity of the Hayes filter result-code buffer (bytes).
pub const RESULT_BUFFER_SIZE: usize = 64;

/// Capacity of the carrier-detect event queue (events, power of two).
pub const CARRIER_QUEUE_CAPACITY: usize = 16;
