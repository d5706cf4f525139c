//! Carrier-Detect Bridge
//!
//! ## Overview
//!
//! The serial-hardware side reports DCD edges from its own thread. Posting
//! an edge must never block and must never wait for the state lock, which
//! the management thread may hold for a whole tick. The bridge therefore
//! hands edges over through a lock-free queue plus atomic flags:
//!
//! ```text
//!  post(edge) ──→ level flag (always)
//!             ──→ CarrierQueue (if room)
//!             ──→ overflow flag (if full)
//!
//!  StateMachine::process ──→ drain queue in order, then overflow flags
//! ```
//!
//! Waking the management thread is done separately by
//! [`SharedState`](super::SharedState) with a non-blocking lock attempt.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::queue::{CarrierEdge, CarrierEvent, CarrierQueue, QueueDrain};
use crate::constants::buffers::CARRIER_QUEUE_CAPACITY;
use crate::time::Timestamp;

/// Edge counters for statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CarrierStats {
    pub rising_edges: u32,
    pub falling_edges: u32,
    /// Edges that found the queue full and were kept only as flags
    pub overflowed: u32,
}

/// Edges recovered from the overflow flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarrierOverflow {
    pub rising: bool,
    pub falling: bool,
}

impl CarrierOverflow {
    pub fn any(&self) -> bool {
        self.rising || self.falling
    }
}

/// Lock-free hand-off of carrier edges to the state machine
#[derive(Debug, Default)]
pub struct CarrierBridge {
    queue: CarrierQueue,
    level: AtomicBool,
    rising_overflow: AtomicBool,
    falling_overflow: AtomicBool,
    rising_edges: AtomicU32,
    falling_edges: AtomicU32,
    overflowed: AtomicU32,
}

impl CarrierBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edge; never blocks
    ///
    /// Returns false if the queue was full and the edge survives only as a
    /// flag.
    pub fn post(&self, edge: CarrierEdge, at: Timestamp) -> bool {
        self.level.store(edge.level(), Ordering::SeqCst);
        match edge {
            CarrierEdge::Rising => self.rising_edges.fetch_add(1, Ordering::Relaxed),
            CarrierEdge::Falling => self.falling_edges.fetch_add(1, Ordering::Relaxed),
        };

        if self.queue.push(CarrierEvent::new(edge, at)) {
            return true;
        }

        self.overflowed.fetch_add(1, Ordering::Relaxed);
        let flag = match edge {
            CarrierEdge::Rising => &self.rising_overflow,
            CarrierEdge::Falling => &self.falling_overflow,
        };
        flag.store(true, Ordering::SeqCst);
        false
    }

    /// Queued edges in arrival order
    pub fn events(&self) -> QueueDrain<'_, CARRIER_QUEUE_CAPACITY> {
        self.queue.drain()
    }

    /// Take and clear the overflow flags
    pub fn take_overflow(&self) -> CarrierOverflow {
        CarrierOverflow {
            rising: self.rising_overflow.swap(false, Ordering::SeqCst),
            falling: self.falling_overflow.swap(false, Ordering::SeqCst),
        }
    }

    /// Current carrier level as last posted
    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Whether edges are waiting to be observed
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
            || self.rising_overflow.load(Ordering::SeqCst)
            || self.falling_overflow.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CarrierStats {
        CarrierStats {
            rising_edges: self.rising_edges.load(Ordering::Relaxed),
            falling_edges: self.falling_edges.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
        }
    }
}
