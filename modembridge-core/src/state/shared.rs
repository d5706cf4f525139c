//! Shared state lock, condition variable and carrier entry point
//!
//! Lock order across the bridge is state → inner → buffer. The carrier
//! entry point never takes the state lock in a blocking way.

use core::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::{CarrierBridge, StateMachine, SystemState};
use crate::errors::BridgeResult;
use crate::queue::CarrierEdge;
use crate::time::Timestamp;

/// What happened to a posted carrier edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarrierPost {
    /// Edge went into the queue (otherwise kept as a flag)
    pub queued: bool,
    /// Waiting management thread was signalled
    pub woke: bool,
}

/// State machine behind a lock, paired with a condition variable signalled
/// on every transition and carrier edge
#[derive(Debug)]
pub struct SharedState {
    machine: Mutex<StateMachine>,
    changed: Condvar,
    carrier: CarrierBridge,
    skipped_wakeups: AtomicU32,
}

impl SharedState {
    pub fn new(machine: StateMachine) -> Self {
        Self {
            machine: Mutex::new(machine),
            changed: Condvar::new(),
            carrier: CarrierBridge::new(),
            skipped_wakeups: AtomicU32::new(0),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, StateMachine> {
        self.machine.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, StateMachine>> {
        self.machine.try_lock()
    }

    pub fn state(&self) -> SystemState {
        self.machine.lock().state()
    }

    /// Validated transition that wakes waiters on success
    ///
    /// Only the state changes; pipeline activation and disconnects are
    /// applied by the bridge's own transitions.
    pub fn set_state(
        &self,
        new_state: SystemState,
        timeout_s: Option<u32>,
        now: Timestamp,
    ) -> BridgeResult<()> {
        self.machine.lock().set_state(new_state, timeout_s, now)?;
        self.changed.notify_all();
        Ok(())
    }

    /// Wake everything waiting on the condition variable
    pub fn notify(&self) {
        self.changed.notify_all();
    }

    pub fn carrier(&self) -> &CarrierBridge {
        &self.carrier
    }

    /// Carrier-detect entry point; never blocks
    ///
    /// The edge is recorded first. The state lock is then only *tried*: if
    /// the management thread holds it, signalling is skipped and the edge is
    /// picked up by its next step, which checks for pending edges before
    /// sleeping.
    pub fn post_carrier(&self, edge: CarrierEdge, at: Timestamp) -> CarrierPost {
        let queued = self.carrier.post(edge, at);

        let woke = match self.machine.try_lock() {
            Some(guard) => {
                drop(guard);
                self.changed.notify_all();
                true
            }
            None => {
                self.skipped_wakeups.fetch_add(1, Ordering::Relaxed);
                false
            }
        };

        CarrierPost { queued, woke }
    }

    /// Sleep on the condition variable for at most `timeout`
    ///
    /// Returns immediately when carrier edges are already pending. Returns
    /// true if the full timeout elapsed.
    pub fn wait(&self, guard: &mut MutexGuard<'_, StateMachine>, timeout: Duration) -> bool {
        if self.carrier.has_pending() {
            return false;
        }
        self.changed.wait_for(guard, timeout).timed_out()
    }

    /// Block until the machine reaches `target` or `timeout` passes
    pub fn wait_for_state(&self, target: SystemState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.machine.lock();
        while guard.state() != target {
            if self.changed.wait_until(&mut guard, deadline).timed_out() {
                return guard.state() == target;
            }
        }
        true
    }

    /// Carrier posts that found the state lock busy
    pub fn skipped_wakeups(&self) -> u32 {
        self.skipped_wakeups.load(Ordering::Relaxed)
    }
}
