//! Lock-Free Carrier Event Queue
//!
//! ## Overview
//!
//! Carrier-detect edges are produced by the serial-hardware side (a probe
//! thread or interrupt-like callback) and consumed by the management
//! thread at the start of every state-machine step. The producer must never
//! block, and it must never wait on the state lock, so the hand-off is a
//! bounded ring of atomics:
//!
//! ```text
//! Carrier probe                       Management thread
//!      ↓                                     ↓
//!   Atomic Write ────→ Ring Buffer ←──── Atomic Read
//!      ↓                                     ↓
//!   Never Blocks                       Drains per tick
//! ```
//!
//! ## Algorithm
//!
//! Bounded multi-producer ring with a sequence number per slot. Each slot
//! holds the packed [`CarrierEvent`] in one `AtomicU64` (timestamp shifted
//! left by one, edge in the low bit) next to an `AtomicUsize` sequence, so
//! the queue needs no `unsafe`. `head` and `tail` are free-running counters;
//! the slot index is `counter % N`. Slot `i` starts with sequence `i`.
//!
//! ### Write Operation (Producers)
//! 1. Load head and the sequence of `slots[head % N]`
//! 2. `seq == head`: the slot is free; claim it with a compare-exchange on
//!    head, store the event, then publish with `seq = head + 1` (Release)
//! 3. `seq < head`: the slot still holds an unread event, so the queue is
//!    full: count a drop and return
//! 4. Otherwise another producer moved head; retry
//!
//! ### Read Operation (Consumer)
//! 1. Load tail and the sequence of `slots[tail % N]`
//! 2. `seq == tail + 1`: claim with a compare-exchange on tail, read the
//!    event, then release the slot with `seq = tail + N`
//! 3. `seq < tail + 1`: nothing published yet, the queue is empty
//!
//! Two producers can never be handed the same slot: only the winner of the
//! head compare-exchange writes it, and the consumer cannot see it before
//! the sequence store.
//!
//! ## Memory Ordering
//!
//! - **Release** on a slot sequence makes the event store visible before
//!   the slot changes hands
//! - **Acquire** on sequence loads pairs with those releases
//! - **Relaxed** for head, tail and statistics

use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::constants::buffers::CARRIER_QUEUE_CAPACITY;
use crate::time::Timestamp;

/// Carrier-detect signal edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CarrierEdge {
    Rising,
    Falling,
}

impl CarrierEdge {
    /// Signal level after this edge
    pub fn level(self) -> bool {
        matches!(self, CarrierEdge::Rising)
    }
}

/// One observed carrier transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CarrierEvent {
    pub edge: CarrierEdge,
    pub at: Timestamp,
}

impl CarrierEvent {
    pub fn new(edge: CarrierEdge, at: Timestamp) -> Self {
        Self { edge, at }
    }

    fn pack(self) -> u64 {
        (self.at << 1) | u64::from(self.edge.level())
    }

    fn unpack(raw: u64) -> Self {
        let edge = if raw & 1 == 1 {
            CarrierEdge::Rising
        } else {
            CarrierEdge::Falling
        };
        Self { edge, at: raw >> 1 }
    }
}

/// Queue with the default carrier capacity
pub type CarrierQueue = EventQueue<CARRIER_QUEUE_CAPACITY>;

/// Bounded lock-free multi-producer event queue
///
/// ## Example Usage
///
/// ```rust
/// use modembridge_core::queue::{CarrierEdge, CarrierEvent, CarrierQueue};
///
/// let queue = CarrierQueue::new();
///
/// // Producer (carrier probe)
/// assert!(queue.push(CarrierEvent::new(CarrierEdge::Rising, 1_000)));
///
/// // Consumer (management thread)
/// let events: Vec<_> = queue.drain().collect();
/// assert_eq!(events[0].edge, CarrierEdge::Rising);
/// ```
pub struct EventQueue<const N: usize> {
    slots: [Slot; N],
    /// Next write counter
    head: AtomicUsize,
    /// Next read counter
    tail: AtomicUsize,
    stats: QueueStats,
}

struct Slot {
    /// Counter value this slot is ready for
    seq: AtomicUsize,
    event: AtomicU64,
}

/// Queue health counters
///
/// Track queue health without impacting the producer
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total events pushed
    pub pushed: AtomicU32,
    /// Total events popped
    pub popped: AtomicU32,
    /// Events dropped due to full queue
    pub dropped: AtomicU32,
    /// Maximum queue depth seen
    pub max_depth: AtomicU32,
}

/// Plain copy of [`QueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QueueCounters {
    pub pushed: u32,
    pub popped: u32,
    pub dropped: u32,
    pub max_depth: u32,
}

impl QueueStats {
    /// Update max depth if current is higher
    fn update_max_depth(&self, current: u32) {
        let mut max = self.max_depth.load(Ordering::Relaxed);
        while current > max {
            match self.max_depth.compare_exchange_weak(
                max,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => max = actual,
            }
        }
    }

    pub fn counters(&self) -> QueueCounters {
        QueueCounters {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            max_depth: self.max_depth.load(Ordering::Relaxed),
        }
    }
}

impl<const N: usize> EventQueue<N> {
    const NON_EMPTY: () = assert!(N > 0, "queue capacity must be non-zero");

    pub fn new() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            slots: core::array::from_fn(|i| Slot {
                seq: AtomicUsize::new(i),
                event: AtomicU64::new(0),
            }),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            stats: QueueStats::default(),
        }
    }

    /// Push an event; safe from any number of producer threads
    ///
    /// Returns false, counting a drop, if the queue is full
    pub fn push(&self, event: CarrierEvent) -> bool {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos % N];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as isize;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        slot.event.store(event.pack(), Ordering::Relaxed);
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);

                        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                        let tail = self.tail.load(Ordering::Relaxed);
                        let depth = pos.wrapping_add(1).wrapping_sub(tail).min(N);
                        self.stats.update_max_depth(depth as u32);
                        return true;
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            } else {
                core::hint::spin_loop();
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Pop the oldest event
    pub fn pop(&self) -> Option<CarrierEvent> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos % N];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let raw = slot.event.load(Ordering::Relaxed);
                        slot.seq.store(pos.wrapping_add(N), Ordering::Release);
                        self.stats.popped.fetch_add(1, Ordering::Relaxed);
                        return Some(CarrierEvent::unpack(raw));
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                core::hint::spin_loop();
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Look at the oldest event without removing it
    pub fn peek(&self) -> Option<CarrierEvent> {
        let pos = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[pos % N];
        if slot.seq.load(Ordering::Acquire) != pos.wrapping_add(1) {
            return None;
        }
        Some(CarrierEvent::unpack(slot.event.load(Ordering::Relaxed)))
    }

    /// Claimed slots; may include a push still being published
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Drain all queued events in order
    pub fn drain(&self) -> QueueDrain<'_, N> {
        QueueDrain { queue: self }
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for EventQueue<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.len())
            .field("capacity", &N)
            .finish()
    }
}

/// Queue iterator for draining all events
pub struct QueueDrain<'a, const N: usize> {
    queue: &'a EventQueue<N>,
}

impl<const N: usize> Iterator for QueueDrain<'_, N> {
    type Item = CarrierEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn queue_basic() {
        let queue = EventQueue::<4>::new();
        let event = CarrierEvent::new(CarrierEdge::Rising, 1234);

        assert!(queue.push(event));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek(), Some(event));

        assert_eq!(queue.pop(), Some(event));
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn queue_full_counts_drops() {
        let queue = EventQueue::<4>::new();
        for i in 0..4 {
            assert!(queue.push(CarrierEvent::new(CarrierEdge::Falling, i)));
        }
        assert!(queue.is_full());

        assert!(!queue.push(CarrierEvent::new(CarrierEdge::Rising, 99)));
        let counters = queue.stats().counters();
        assert_eq!(counters.dropped, 1);
        assert_eq!(counters.max_depth, 4);
    }

    #[test]
    fn queue_preserves_order_across_wrap() {
        let queue = EventQueue::<3>::new();
        let mut expected = Vec::new();
        let mut seen = Vec::new();

        for i in 0..10u64 {
            let edge = if i % 2 == 0 { CarrierEdge::Rising } else { CarrierEdge::Falling };
            let event = CarrierEvent::new(edge, i * 100);
            assert!(queue.push(event));
            expected.push(event);
            if i % 2 == 1 {
                seen.extend(queue.drain());
            }
        }

        assert_eq!(seen, expected);
    }

    #[test]
    fn packing_keeps_timestamp() {
        let event = CarrierEvent::new(CarrierEdge::Falling, u64::MAX >> 1);
        assert_eq!(CarrierEvent::unpack(event.pack()), event);
    }

    #[test]
    fn producer_thread_never_loses_accepted_events() {
        let queue = Arc::new(EventQueue::<16>::new());
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut accepted = 0u32;
                for i in 0..1000u64 {
                    while !queue.push(CarrierEvent::new(CarrierEdge::Rising, i)) {
                        std::thread::yield_now();
                    }
                    accepted += 1;
                }
                accepted
            })
        };

        let mut received = Vec::new();
        while received.len() < 1000 {
            match queue.pop() {
                Some(event) => received.push(event.at),
                None => std::thread::yield_now(),
            }
        }

        assert_eq!(producer.join().unwrap(), 1000);
        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn concurrent_producers_never_share_a_slot() {
        for _ in 0..200 {
            let queue = Arc::new(EventQueue::<1024>::new());
            let barrier = Arc::new(std::sync::Barrier::new(2));
            let producers: Vec<_> = (0..2u64)
                .map(|id| {
                    let queue = Arc::clone(&queue);
                    let barrier = Arc::clone(&barrier);
                    let edge = if id == 0 {
                        CarrierEdge::Rising
                    } else {
                        CarrierEdge::Falling
                    };
                    std::thread::spawn(move || {
                        barrier.wait();
                        (0..200u64)
                            .filter(|i| queue.push(CarrierEvent::new(edge, id * 1_000 + i)))
                            .count()
                    })
                })
                .collect();

            let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();
            let drained: Vec<_> = queue.drain().collect();

            assert_eq!(accepted, 400);
            assert_eq!(drained.len(), accepted);
            assert_eq!(queue.stats().counters().pushed, 400);
            for id in 0..2u64 {
                let own: Vec<_> = drained
                    .iter()
                    .map(|e| e.at)
                    .filter(|at| at / 1_000 == id)
                    .collect();
                assert_eq!(own, (0..200).map(|i| id * 1_000 + i).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn full_queue_rejects_every_producer() {
        let queue = Arc::new(EventQueue::<8>::new());
        let producers: Vec<_> = (0..4u64)
            .map(|id| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    (0..8u64)
                        .filter(|i| queue.push(CarrierEvent::new(CarrierEdge::Rising, id * 8 + i)))
                        .count()
                })
            })
            .collect();

        let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();
        assert_eq!(accepted, 8);
        assert_eq!(queue.stats().counters().dropped, 24);
        assert_eq!(queue.drain().count(), 8);
    }
}
