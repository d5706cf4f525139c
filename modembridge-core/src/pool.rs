//! Fixed-Block Memory Pool for Buffer Regions
//!
//! ## Overview
//!
//! Each adaptive double buffer stores its two regions in a private arena
//! carved into fixed-size blocks. Regions are handed out as [`PoolHandle`]s
//! (block spans) instead of separate heap allocations, which gives the
//! buffer three properties:
//!
//! 1. **Cheap switching**: Swapping the main and sub regions swaps two
//!    handles; no bytes move
//! 2. **No heap churn on resize**: Growing or shrinking allocates the new
//!    regions from the same arena, copies in place and releases the old
//!    spans
//! 3. **Observable fragmentation**: Free/allocated block counts and an
//!    approximate fragmentation ratio are exported in statistics
//!
//! ## Layout
//!
//! ```text
//! arena (POOL_REGIONS × max region size, rounded to blocks)
//! ┌────┬────┬────┬────┬────┬────┬────┬────┬────┬────┬────┬────┐
//! │ M  │ M  │ M  │ M  │ S  │ S  │ S  │ S  │    │    │    │    │
//! └────┴────┴────┴────┴────┴────┴────┴────┴────┴────┴────┴────┘
//!   main handle (4 blocks)  sub handle (4 blocks)   free (4 blocks)
//! ```
//!
//! Allocation is first-fit over a block bitmap. The pool is not shared
//! between buffers and is protected by the owning buffer's lock.

use crate::errors::{BridgeError, BridgeResult};

/// A span of blocks owned by one region
///
/// Handles are deliberately not `Clone`: a handle is released exactly once
/// by moving it back into [`MemoryPool::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct PoolHandle {
    first_block: usize,
    blocks: usize,
    len: usize,
}

impl PoolHandle {
    /// Usable length of the region in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks backing the region
    pub fn blocks(&self) -> usize {
        self.blocks
    }
}

/// Pool occupancy statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolStats {
    /// Blocks in the arena
    pub total_blocks: usize,
    /// Blocks currently free
    pub free_blocks: usize,
    /// Blocks currently allocated
    pub allocated_blocks: usize,
    /// Highest number of blocks allocated at once
    pub peak_allocated_blocks: usize,
    /// Successful allocations
    pub allocations: u64,
    /// Releases
    pub releases: u64,
    /// Allocations that could not be satisfied
    pub failed_allocations: u64,
    /// 0.0 = all free space contiguous, approaching 1.0 = highly fragmented
    pub fragmentation: f32,
}

/// Fixed-block arena allocator
pub struct MemoryPool {
    arena: Vec<u8>,
    block_size: usize,
    allocated: Vec<bool>,
    free_blocks: usize,
    peak_allocated: usize,
    allocations: u64,
    releases: u64,
    failed_allocations: u64,
}

impl MemoryPool {
    /// Create a pool of at least `capacity` bytes split into `block_size` blocks
    pub fn new(capacity: usize, block_size: usize) -> BridgeResult<Self> {
        if block_size == 0 {
            return Err(BridgeError::InvalidParameter {
                reason: "pool block size must be non-zero",
            });
        }
        if capacity == 0 {
            return Err(BridgeError::InvalidParameter {
                reason: "pool capacity must be non-zero",
            });
        }

        let total_blocks = capacity.div_ceil(block_size);

        Ok(Self {
            arena: vec![0; total_blocks * block_size],
            block_size,
            allocated: vec![false; total_blocks],
            free_blocks: total_blocks,
            peak_allocated: 0,
            allocations: 0,
            releases: 0,
            failed_allocations: 0,
        })
    }

    /// Allocate a region of `len` bytes (rounded up to whole blocks)
    ///
    /// Uses first-fit over the block bitmap.
    pub fn allocate(&mut self, len: usize) -> BridgeResult<PoolHandle> {
        if len == 0 {
            return Err(BridgeError::InvalidParameter {
                reason: "cannot allocate an empty region",
            });
        }

        let needed = len.div_ceil(self.block_size);

        match self.find_free_run(needed) {
            Some(first_block) => {
                for slot in &mut self.allocated[first_block..first_block + needed] {
                    *slot = true;
                }
                self.free_blocks -= needed;
                self.allocations += 1;

                let in_use = self.total_blocks() - self.free_blocks;
                if in_use > self.peak_allocated {
                    self.peak_allocated = in_use;
                }

                Ok(PoolHandle {
                    first_block,
                    blocks: needed,
                    len,
                })
            }
            None => {
                self.failed_allocations += 1;
                Err(BridgeError::OutOfMemory {
                    requested: len,
                    available: self.largest_free_run() * self.block_size,
                })
            }
        }
    }

    /// Return a region's blocks to the pool
    pub fn release(&mut self, handle: PoolHandle) {
        let end = handle.first_block + handle.blocks;
        debug_assert!(end <= self.allocated.len(), "handle from another pool");

        for slot in self.allocated.iter_mut().take(end).skip(handle.first_block) {
            debug_assert!(*slot, "releasing a free block");
            if *slot {
                *slot = false;
                self.free_blocks += 1;
            }
        }
        self.releases += 1;
    }

    /// Read-only view of a region
    pub fn bytes(&self, handle: &PoolHandle) -> &[u8] {
        let start = handle.first_block * self.block_size;
        &self.arena[start..start + handle.len]
    }

    /// Mutable view of a region
    pub fn bytes_mut(&mut self, handle: &PoolHandle) -> &mut [u8] {
        let start = handle.first_block * self.block_size;
        &mut self.arena[start..start + handle.len]
    }

    /// Copy `len` bytes between two regions of this pool
    ///
    /// Ranges are clamped to both regions; returns the bytes copied.
    pub fn copy_between(
        &mut self,
        src: &PoolHandle,
        src_offset: usize,
        dst: &PoolHandle,
        dst_offset: usize,
        len: usize,
    ) -> usize {
        let len = len
            .min(src.len.saturating_sub(src_offset))
            .min(dst.len.saturating_sub(dst_offset));
        if len == 0 {
            return 0;
        }

        let src_start = src.first_block * self.block_size + src_offset;
        let dst_start = dst.first_block * self.block_size + dst_offset;
        self.arena.copy_within(src_start..src_start + len, dst_start);
        len
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_blocks(&self) -> usize {
        self.allocated.len()
    }

    pub fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    pub fn allocated_blocks(&self) -> usize {
        self.total_blocks() - self.free_blocks
    }

    /// Approximate external fragmentation
    ///
    /// `1 - largest_free_run / free_blocks`: zero when all free blocks are
    /// contiguous (or none are free).
    pub fn fragmentation(&self) -> f32 {
        if self.free_blocks == 0 {
            return 0.0;
        }
        1.0 - self.largest_free_run() as f32 / self.free_blocks as f32
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_blocks: self.total_blocks(),
            free_blocks: self.free_blocks,
            allocated_blocks: self.allocated_blocks(),
            peak_allocated_blocks: self.peak_allocated,
            allocations: self.allocations,
            releases: self.releases,
            failed_allocations: self.failed_allocations,
            fragmentation: self.fragmentation(),
        }
    }

    fn find_free_run(&self, needed: usize) -> Option<usize> {
        if needed > self.free_blocks {
            return None;
        }

        let mut run_start = 0;
        let mut run_len = 0;
        for (idx, used) in self.allocated.iter().enumerate() {
            if *used {
                run_len = 0;
                run_start = idx + 1;
            } else {
                run_len += 1;
                if run_len == needed {
                    return Some(run_start);
                }
            }
        }
        None
    }

    fn largest_free_run(&self) -> usize {
        let mut best = 0;
        let mut current = 0;
        for used in &self.allocated {
            if *used {
                current = 0;
            } else {
                current += 1;
                best = best.max(current);
            }
        }
        best
    }
}

impl core::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("block_size", &self.block_size)
            .field("total_blocks", &self.total_blocks())
            .field("free_blocks", &self.free_blocks)
            .finish()
    }
}
