//! Connection State Machine
//!
//! ## Overview
//!
//! The lifecycle of the whole bridge is a small state machine driven once
//! per management tick. Transitions are validated against a fixed table;
//! anything not in the table, including a self-transition, is rejected
//! and the state is left unchanged.
//!
//! ```text
//! Uninitialized → Initializing → Ready → Connecting → Negotiating
//!                      ↑           ↑         │             │
//!                      │           │         └──────┬──────┘
//!                      │         Error              ↓
//!                      │                       DataTransfer
//!                      │                            ↓
//!                  Terminated ← ShuttingDown ← Flushing
//! ```
//!
//! ## Per-State Logic
//!
//! | State        | Waits for                           | Then          |
//! |--------------|-------------------------------------|---------------|
//! | Initializing | modem reports ready                 | Ready         |
//! | Ready        | carrier rising edge                 | Connecting    |
//! | Connecting   | network connected (retry every 2s)  | DataTransfer  |
//! | Negotiating  | option negotiation complete         | DataTransfer  |
//! | DataTransfer | carrier loss or remote hangup       | Flushing      |
//! | Flushing     | both pipelines empty                | ShuttingDown  |
//! | ShuttingDown | (pipelines off, disconnect)         | Terminated    |
//! | Terminated   | auto restart enabled                | Initializing  |
//! | Error        | (one recovery attempt)              | Ready         |
//!
//! States entered with a timeout apply a fixed remedy when it expires; see
//! [`timeout_remedy`].
//!
//! ## Connection Mode
//!
//! Alongside the lifecycle state the machine tracks whether the modem side
//! is online (data flows to the back-end) or in command mode after a `+++`
//! escape. Entering DataTransfer sets Online, leaving it sets Command.

pub mod carrier;
pub mod shared;

pub use carrier::{CarrierBridge, CarrierOverflow, CarrierStats};
pub use shared::SharedState;

use heapless::Vec as HVec;

use crate::config::StateTimeouts;
use crate::constants::time::MS_PER_SECOND;
use crate::errors::{BridgeError, BridgeResult};
use crate::queue::CarrierEdge;
use crate::time::{elapsed_ms, Timestamp};
use crate::traits::StateEnvironment;

/// Lifecycle state of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Connecting,
    Negotiating,
    DataTransfer,
    Flushing,
    ShuttingDown,
    Terminated,
    Error,
}

impl SystemState {
    pub const ALL: [SystemState; 10] = [
        SystemState::Uninitialized,
        SystemState::Initializing,
        SystemState::Ready,
        SystemState::Connecting,
        SystemState::Negotiating,
        SystemState::DataTransfer,
        SystemState::Flushing,
        SystemState::ShuttingDown,
        SystemState::Terminated,
        SystemState::Error,
    ];

    /// Whether pipelines process chunks in this state
    pub const fn pipelines_run(&self) -> bool {
        matches!(self, SystemState::DataTransfer | SystemState::Flushing)
    }

    /// Whether a network session may exist in this state
    pub const fn has_session(&self) -> bool {
        matches!(
            self,
            SystemState::Negotiating | SystemState::DataTransfer | SystemState::Flushing
        )
    }

    pub const fn name(&self) -> &'static str {
        match self {
            SystemState::Uninitialized => "UNINITIALIZED",
            SystemState::Initializing => "INITIALIZING",
            SystemState::Ready => "READY",
            SystemState::Connecting => "CONNECTING",
            SystemState::Negotiating => "NEGOTIATING",
            SystemState::DataTransfer => "DATA_TRANSFER",
            SystemState::Flushing => "FLUSHING",
            SystemState::ShuttingDown => "SHUTTING_DOWN",
            SystemState::Terminated => "TERMINATED",
            SystemState::Error => "ERROR",
        }
    }
}

impl core::fmt::Display for SystemState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Online/command mode of the modem side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionMode {
    #[default]
    Command,
    Online,
}

// ===== TRANSITION TABLE =====

/// The fixed transition validity table
pub fn is_valid_transition(from: SystemState, to: SystemState) -> bool {
    use SystemState::*;

    matches!(
        (from, to),
        (Uninitialized, Initializing)
            | (Initializing, Ready)
            | (Initializing, Error)
            | (Initializing, ShuttingDown)
            | (Ready, Connecting)
            | (Ready, ShuttingDown)
            | (Ready, Error)
            | (Connecting, Negotiating)
            | (Connecting, DataTransfer)
            | (Connecting, Ready)
            | (Connecting, ShuttingDown)
            | (Connecting, Error)
            | (Negotiating, DataTransfer)
            | (Negotiating, Flushing)
            | (Negotiating, ShuttingDown)
            | (Negotiating, Error)
            | (DataTransfer, Flushing)
            | (DataTransfer, ShuttingDown)
            | (DataTransfer, Error)
            | (Flushing, ShuttingDown)
            | (Flushing, Error)
            | (ShuttingDown, Terminated)
            | (ShuttingDown, Error)
            | (Terminated, Initializing)
            | (Error, Ready)
            | (Error, ShuttingDown)
            | (Error, Terminated)
    )
}

/// State entered when a timeout in `state` expires
pub fn timeout_remedy(state: SystemState) -> SystemState {
    match state {
        SystemState::Initializing => SystemState::Ready,
        SystemState::Connecting => SystemState::Ready,
        SystemState::Negotiating => SystemState::DataTransfer,
        SystemState::Flushing => SystemState::ShuttingDown,
        SystemState::ShuttingDown => SystemState::Terminated,
        _ => SystemState::Error,
    }
}

// ===== MACHINE =====

/// One accepted transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransitionRecord {
    pub from: SystemState,
    pub to: SystemState,
    pub at: Timestamp,
}

const HISTORY_LEN: usize = 8;

/// Bookkeeping that lives for the machine's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConnectionContext {
    /// Attempts in the current Connecting phase
    pub connect_attempts: u32,
    pub total_connect_attempts: u64,
    pub last_connect_attempt: Option<Timestamp>,
    /// Attempts that failed with a condition expected to clear
    pub transient_connect_failures: u64,
    pub connect_failures: u64,
    /// Negotiating timed out and was treated as complete
    pub negotiation_forced: bool,
    pub recoveries: u32,
    /// Completed DataTransfer sessions
    pub sessions: u64,
    pub restarts: u32,
    pub carrier_level: bool,
    pub rising_pending: bool,
    pub falling_pending: bool,
}

/// Lifecycle state machine
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SystemState,
    previous: SystemState,
    changed_at: Timestamp,
    timeout_s: Option<u32>,
    transitions: u64,
    rejected: u64,
    mode: ConnectionMode,
    timeouts: StateTimeouts,
    auto_restart: bool,
    context: ConnectionContext,
    history: HVec<TransitionRecord, HISTORY_LEN>,
}

impl StateMachine {
    pub fn new(timeouts: StateTimeouts, auto_restart: bool, now: Timestamp) -> Self {
        Self {
            state: SystemState::Uninitialized,
            previous: SystemState::Uninitialized,
            changed_at: now,
            timeout_s: None,
            transitions: 0,
            rejected: 0,
            mode: ConnectionMode::Command,
            timeouts,
            auto_restart,
            context: ConnectionContext::default(),
            history: HVec::new(),
        }
    }

    /// Validate and apply a transition
    ///
    /// `timeout_s` arms the state timeout; `None` disarms it. Invalid and
    /// self-transitions are rejected, logged and leave the state unchanged.
    pub fn set_state(
        &mut self,
        new_state: SystemState,
        timeout_s: Option<u32>,
        now: Timestamp,
    ) -> BridgeResult<()> {
        let from = self.state;
        if !is_valid_transition(from, new_state) {
            self.rejected += 1;
            log_warn!("rejected state transition {} -> {}", from, new_state);
            return Err(BridgeError::InvalidTransition { from, to: new_state });
        }

        self.previous = from;
        self.state = new_state;
        self.changed_at = now;
        self.timeout_s = timeout_s.filter(|s| *s > 0);
        self.transitions += 1;

        if new_state == SystemState::DataTransfer {
            self.mode = ConnectionMode::Online;
        } else if from == SystemState::DataTransfer {
            self.mode = ConnectionMode::Command;
        }

        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(TransitionRecord {
            from,
            to: new_state,
            at: now,
        });

        log_info!("state {} -> {}", from, new_state);
        Ok(())
    }

    /// Transition with the configured timeout for the target state
    pub fn enter(&mut self, new_state: SystemState, now: Timestamp) -> BridgeResult<()> {
        let timeout = self.timeouts.for_state(new_state);
        self.set_state(new_state, timeout, now)
    }

    /// Fold queued carrier edges into the context, in arrival order
    pub fn observe_carrier(&mut self, carrier: &CarrierBridge) {
        for event in carrier.events() {
            log_info!("carrier {:?} at {}", event.edge, event.at);
            self.apply_edge(event.edge);
        }

        let overflow = carrier.take_overflow();
        let level = carrier.level();
        // Order of overflowed edges is unknown; the current level decides
        // which one counts as last.
        if level {
            if overflow.falling {
                self.apply_edge(CarrierEdge::Falling);
            }
            if overflow.rising {
                self.apply_edge(CarrierEdge::Rising);
            }
        } else {
            if overflow.rising {
                self.apply_edge(CarrierEdge::Rising);
            }
            if overflow.falling {
                self.apply_edge(CarrierEdge::Falling);
            }
        }
        self.context.carrier_level = level;
    }

    fn apply_edge(&mut self, edge: CarrierEdge) {
        match edge {
            CarrierEdge::Rising => {
                self.context.rising_pending = true;
                self.context.carrier_level = true;
            }
            CarrierEdge::Falling => {
                self.context.falling_pending = true;
                self.context.rising_pending = false;
                self.context.carrier_level = false;
            }
        }
    }

    /// Run one step: carrier edges, timeout check, then per-state logic
    ///
    /// Returns the state entered, if any.
    pub fn process(
        &mut self,
        carrier: &CarrierBridge,
        env: &mut dyn StateEnvironment,
        now: Timestamp,
    ) -> Option<SystemState> {
        self.observe_carrier(carrier);

        let entered = if self.timed_out(now) {
            self.handle_timeout(env, now)
        } else {
            self.advance(env, now)
        };

        self.context.falling_pending = false;
        entered
    }

    fn timed_out(&self, now: Timestamp) -> bool {
        self.timeout_deadline().is_some_and(|deadline| now >= deadline)
    }

    fn handle_timeout(&mut self, env: &mut dyn StateEnvironment, now: Timestamp) -> Option<SystemState> {
        let state = self.state;
        let remedy = timeout_remedy(state);
        log_warn!("{} timed out after {}s", state, self.timeout_s.unwrap_or(0));

        if state == SystemState::Negotiating {
            self.context.negotiation_forced = true;
        }
        let entered = self.transition(remedy, env, now);
        if entered.is_none() {
            self.timeout_s = None;
        }
        entered
    }

    fn advance(&mut self, env: &mut dyn StateEnvironment, now: Timestamp) -> Option<SystemState> {
        match self.state {
            SystemState::Uninitialized => None,

            SystemState::Initializing => {
                if env.modem_ready() {
                    self.transition(SystemState::Ready, env, now)
                } else {
                    None
                }
            }

            SystemState::Ready => {
                if self.context.rising_pending {
                    self.context.rising_pending = false;
                    self.context.connect_attempts = 0;
                    self.context.last_connect_attempt = None;
                    self.context.negotiation_forced = false;
                    self.transition(SystemState::Connecting, env, now)
                } else {
                    None
                }
            }

            SystemState::Connecting => self.advance_connecting(env, now),

            SystemState::Negotiating => {
                if self.carrier_lost() || !env.network_connected() {
                    self.transition(SystemState::Flushing, env, now)
                } else if env.negotiation_complete() {
                    self.transition(SystemState::DataTransfer, env, now)
                } else {
                    None
                }
            }

            SystemState::DataTransfer => {
                if self.carrier_lost() {
                    log_info!("carrier lost, flushing");
                    self.transition(SystemState::Flushing, env, now)
                } else if !env.network_connected() {
                    log_info!("remote hangup, flushing");
                    self.transition(SystemState::Flushing, env, now)
                } else {
                    None
                }
            }

            SystemState::Flushing => {
                if env.pending_bytes() == 0 {
                    self.transition(SystemState::ShuttingDown, env, now)
                } else {
                    None
                }
            }

            SystemState::ShuttingDown => self.transition(SystemState::Terminated, env, now),

            SystemState::Terminated => {
                if self.auto_restart {
                    self.context.restarts += 1;
                    self.transition(SystemState::Initializing, env, now)
                } else {
                    None
                }
            }

            SystemState::Error => {
                self.context.recoveries += 1;
                self.transition(SystemState::Ready, env, now)
            }
        }
    }

    fn advance_connecting(&mut self, env: &mut dyn StateEnvironment, now: Timestamp) -> Option<SystemState> {
        if self.carrier_lost() {
            log_info!("carrier lost while connecting");
            return self.transition(SystemState::Ready, env, now);
        }

        if !env.network_connected() {
            let due = self
                .context
                .last_connect_attempt
                .map_or(true, |last| elapsed_ms(last, now) >= self.timeouts.connect_retry_ms);
            if !due {
                return None;
            }

            self.context.connect_attempts += 1;
            self.context.total_connect_attempts += 1;
            self.context.last_connect_attempt = Some(now);
            log_info!("connect attempt {}", self.context.connect_attempts);

            if let Err(err) = env.try_connect() {
                if err.is_transient() {
                    self.context.transient_connect_failures += 1;
                    log_debug!("connect attempt interrupted: {}", err);
                } else {
                    self.context.connect_failures += 1;
                    log_warn!("connect failed: {}", err);
                }
                return None;
            }
            if !env.network_connected() {
                return None;
            }
        }

        if env.negotiation_complete() {
            self.transition(SystemState::DataTransfer, env, now)
        } else {
            self.transition(SystemState::Negotiating, env, now)
        }
    }

    /// Enter `to` and apply its side effects on the environment
    fn transition(
        &mut self,
        to: SystemState,
        env: &mut dyn StateEnvironment,
        now: Timestamp,
    ) -> Option<SystemState> {
        self.transition_to(to, env, now).ok()?;
        Some(to)
    }

    /// Enter `to` from outside the per-state logic, with the same side
    /// effects `process` applies
    ///
    /// Entering DataTransfer or Flushing activates the pipelines. Entering
    /// ShuttingDown or Error deactivates them and disconnects. Abandoning
    /// Connecting disconnects.
    pub fn transition_to(
        &mut self,
        to: SystemState,
        env: &mut dyn StateEnvironment,
        now: Timestamp,
    ) -> BridgeResult<()> {
        let from = self.state;
        self.enter(to, now)?;

        match to {
            state if state.pipelines_run() => env.set_pipelines_active(true),
            SystemState::ShuttingDown | SystemState::Error => {
                env.set_pipelines_active(false);
                env.disconnect();
            }
            SystemState::Ready if from == SystemState::Connecting => env.disconnect(),
            _ => {}
        }
        if from == SystemState::DataTransfer {
            self.context.sessions += 1;
        }
        Ok(())
    }

    fn carrier_lost(&self) -> bool {
        self.context.falling_pending || !self.context.carrier_level
    }

    /// Switch online/command mode; returns true if it changed
    pub fn set_mode(&mut self, mode: ConnectionMode) -> bool {
        if self.mode == mode {
            return false;
        }
        log_debug!("connection mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        true
    }

    /// Time at which the armed state timeout expires
    pub fn timeout_deadline(&self) -> Option<Timestamp> {
        self.timeout_s
            .map(|s| self.changed_at + u64::from(s) * MS_PER_SECOND)
    }

    /// Time of the next connection attempt while Connecting
    pub fn retry_deadline(&self) -> Option<Timestamp> {
        if self.state != SystemState::Connecting {
            return None;
        }
        Some(
            self.context
                .last_connect_attempt
                .map_or(self.changed_at, |last| last + self.timeouts.connect_retry_ms),
        )
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn previous(&self) -> SystemState {
        self.previous
    }

    pub fn changed_at(&self) -> Timestamp {
        self.changed_at
    }

    pub fn timeout_s(&self) -> Option<u32> {
        self.timeout_s
    }

    pub fn time_in_state(&self, now: Timestamp) -> u64 {
        elapsed_ms(self.changed_at, now)
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn rejected_transitions(&self) -> u64 {
        self.rejected
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn is_online(&self) -> bool {
        self.mode == ConnectionMode::Online
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    pub fn set_auto_restart(&mut self, enabled: bool) {
        self.auto_restart = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeEnv {
        modem_ready: bool,
        connect_succeeds: bool,
        connect_error: Option<BridgeError>,
        connected: bool,
        negotiated: bool,
        pending: usize,
        pipelines_active: bool,
        connect_calls: u32,
        disconnects: u32,
    }

    impl StateEnvironment for FakeEnv {
        fn modem_ready(&self) -> bool {
            self.modem_ready
        }
        fn try_connect(&mut self) -> BridgeResult<()> {
            self.connect_calls += 1;
            if self.connect_succeeds {
                self.connected = true;
                Ok(())
            } else {
                Err(self
                    .connect_error
                    .unwrap_or(BridgeError::Io(std::io::ErrorKind::ConnectionRefused)))
            }
        }
        fn network_connected(&self) -> bool {
            self.connected
        }
        fn negotiation_complete(&self) -> bool {
            self.negotiated
        }
        fn pending_bytes(&self) -> usize {
            self.pending
        }
        fn set_pipelines_active(&mut self, active: bool) {
            self.pipelines_active = active;
        }
        fn disconnect(&mut self) {
            self.connected = false;
            self.disconnects += 1;
        }
    }

    fn machine() -> StateMachine {
        StateMachine::new(StateTimeouts::default(), false, 0)
    }

    fn ready_machine(env: &mut FakeEnv, carrier: &CarrierBridge) -> StateMachine {
        let mut sm = machine();
        sm.enter(SystemState::Initializing, 0).unwrap();
        env.modem_ready = true;
        assert_eq!(sm.process(carrier, env, 0), Some(SystemState::Ready));
        sm
    }

    #[test]
    fn table_rejects_self_transitions() {
        for state in SystemState::ALL {
            assert!(!is_valid_transition(state, state), "{state}");
        }
    }

    #[test]
    fn every_remedy_is_in_the_table_or_rejected() {
        assert!(is_valid_transition(SystemState::Negotiating, timeout_remedy(SystemState::Negotiating)));
        assert!(is_valid_transition(SystemState::Flushing, timeout_remedy(SystemState::Flushing)));
        assert!(is_valid_transition(SystemState::ShuttingDown, timeout_remedy(SystemState::ShuttingDown)));
        assert!(is_valid_transition(SystemState::DataTransfer, timeout_remedy(SystemState::DataTransfer)));
    }

    #[test]
    fn invalid_set_state_leaves_state_unchanged() {
        let mut sm = machine();
        let err = sm.set_state(SystemState::DataTransfer, None, 5).unwrap_err();
        assert_eq!(
            err,
            BridgeError::InvalidTransition {
                from: SystemState::Uninitialized,
                to: SystemState::DataTransfer
            }
        );
        assert_eq!(sm.state(), SystemState::Uninitialized);
        assert_eq!(sm.transitions(), 0);
        assert_eq!(sm.rejected_transitions(), 1);
    }

    #[test]
    fn full_session_lifecycle() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv {
            connect_succeeds: true,
            negotiated: true,
            ..FakeEnv::default()
        };
        let mut sm = ready_machine(&mut env, &carrier);

        assert_eq!(sm.process(&carrier, &mut env, 10), None);

        carrier.post(CarrierEdge::Rising, 20);
        assert_eq!(sm.process(&carrier, &mut env, 20), Some(SystemState::Connecting));
        assert_eq!(sm.process(&carrier, &mut env, 30), Some(SystemState::DataTransfer));
        assert!(env.pipelines_active);
        assert!(sm.is_online());

        carrier.post(CarrierEdge::Falling, 40);
        env.pending = 10;
        assert_eq!(sm.process(&carrier, &mut env, 40), Some(SystemState::Flushing));
        assert_eq!(sm.mode(), ConnectionMode::Command);
        assert_eq!(sm.process(&carrier, &mut env, 50), None);

        env.pending = 0;
        assert_eq!(sm.process(&carrier, &mut env, 60), Some(SystemState::ShuttingDown));
        assert_eq!(sm.process(&carrier, &mut env, 70), Some(SystemState::Terminated));
        assert!(!env.pipelines_active);
        assert_eq!(env.disconnects, 1);
        assert_eq!(sm.context().sessions, 1);

        // No auto restart
        assert_eq!(sm.process(&carrier, &mut env, 80), None);
    }

    #[test]
    fn connect_retries_every_interval() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv::default();
        let mut sm = ready_machine(&mut env, &carrier);

        carrier.post(CarrierEdge::Rising, 0);
        sm.process(&carrier, &mut env, 0);
        assert_eq!(sm.state(), SystemState::Connecting);

        sm.process(&carrier, &mut env, 0);
        sm.process(&carrier, &mut env, 1000);
        assert_eq!(env.connect_calls, 1);
        assert_eq!(sm.retry_deadline(), Some(2000));

        sm.process(&carrier, &mut env, 2000);
        assert_eq!(env.connect_calls, 2);

        env.connect_succeeds = true;
        env.negotiated = false;
        assert_eq!(sm.process(&carrier, &mut env, 4000), Some(SystemState::Negotiating));
        assert_eq!(sm.context().connect_attempts, 3);
    }

    #[test]
    fn connect_failures_are_classified() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv::default();
        let mut sm = ready_machine(&mut env, &carrier);
        carrier.post(CarrierEdge::Rising, 0);
        sm.process(&carrier, &mut env, 0);

        sm.process(&carrier, &mut env, 0);
        env.connect_error = Some(BridgeError::Io(std::io::ErrorKind::TimedOut));
        sm.process(&carrier, &mut env, 2000);
        env.connect_error = Some(BridgeError::ResourceBusy);
        sm.process(&carrier, &mut env, 4000);

        assert_eq!(env.connect_calls, 3);
        assert_eq!(sm.state(), SystemState::Connecting);
        assert_eq!(sm.context().connect_failures, 1);
        assert_eq!(sm.context().transient_connect_failures, 2);
        assert_eq!(sm.retry_deadline(), Some(6000));
    }

    #[test]
    fn negotiating_timeout_forces_data_transfer() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv {
            connect_succeeds: true,
            ..FakeEnv::default()
        };
        let mut sm = ready_machine(&mut env, &carrier);
        carrier.post(CarrierEdge::Rising, 0);
        sm.process(&carrier, &mut env, 0);
        assert_eq!(sm.process(&carrier, &mut env, 0), Some(SystemState::Negotiating));

        assert_eq!(sm.timeout_deadline(), Some(10_000));
        assert_eq!(sm.process(&carrier, &mut env, 9_999), None);
        assert_eq!(sm.process(&carrier, &mut env, 10_000), Some(SystemState::DataTransfer));
        assert!(sm.context().negotiation_forced);
    }

    #[test]
    fn connecting_timeout_returns_to_ready() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv::default();
        let mut sm = ready_machine(&mut env, &carrier);
        carrier.post(CarrierEdge::Rising, 0);
        sm.process(&carrier, &mut env, 0);

        assert_eq!(sm.process(&carrier, &mut env, 30_000), Some(SystemState::Ready));
        assert_eq!(sm.previous(), SystemState::Connecting);
    }

    #[test]
    fn custom_timeout_without_remedy_goes_to_error_then_recovers() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv::default();
        let mut sm = ready_machine(&mut env, &carrier);
        sm.set_state(SystemState::Connecting, None, 0).unwrap();
        sm.set_state(SystemState::DataTransfer, Some(1), 0).unwrap();
        carrier.post(CarrierEdge::Rising, 0);

        assert_eq!(sm.process(&carrier, &mut env, 1000), Some(SystemState::Error));
        assert_eq!(sm.process(&carrier, &mut env, 1001), Some(SystemState::Ready));
        assert_eq!(sm.context().recoveries, 1);
    }

    #[test]
    fn flushing_straight_from_negotiation_activates_pipelines() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv {
            connect_succeeds: true,
            ..FakeEnv::default()
        };
        let mut sm = ready_machine(&mut env, &carrier);
        carrier.post(CarrierEdge::Rising, 0);
        sm.process(&carrier, &mut env, 0);
        assert_eq!(sm.process(&carrier, &mut env, 0), Some(SystemState::Negotiating));
        assert!(!env.pipelines_active);

        carrier.post(CarrierEdge::Falling, 5);
        env.pending = 4;
        assert_eq!(sm.process(&carrier, &mut env, 5), Some(SystemState::Flushing));
        assert!(env.pipelines_active);

        env.pending = 0;
        assert_eq!(sm.process(&carrier, &mut env, 6), Some(SystemState::ShuttingDown));
        assert!(!env.pipelines_active);
    }

    #[test]
    fn remote_hangup_flushes() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv {
            connect_succeeds: true,
            negotiated: true,
            ..FakeEnv::default()
        };
        let mut sm = ready_machine(&mut env, &carrier);
        carrier.post(CarrierEdge::Rising, 0);
        sm.process(&carrier, &mut env, 0);
        sm.process(&carrier, &mut env, 0);
        assert_eq!(sm.state(), SystemState::DataTransfer);

        env.connected = false;
        assert_eq!(sm.process(&carrier, &mut env, 5), Some(SystemState::Flushing));
    }

    #[test]
    fn rising_then_falling_before_tick_does_not_connect() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv::default();
        let mut sm = ready_machine(&mut env, &carrier);

        carrier.post(CarrierEdge::Rising, 0);
        carrier.post(CarrierEdge::Falling, 1);
        assert_eq!(sm.process(&carrier, &mut env, 2), None);
        assert_eq!(sm.state(), SystemState::Ready);
    }

    #[test]
    fn auto_restart_reinitializes() {
        let carrier = CarrierBridge::new();
        let mut env = FakeEnv::default();
        let mut sm = StateMachine::new(StateTimeouts::default(), true, 0);
        sm.enter(SystemState::Initializing, 0).unwrap();
        sm.set_state(SystemState::ShuttingDown, None, 0).unwrap();
        sm.set_state(SystemState::Terminated, None, 0).unwrap();

        assert_eq!(sm.process(&carrier, &mut env, 1), Some(SystemState::Initializing));
        assert_eq!(sm.context().restarts, 1);
    }

    #[test]
    fn history_keeps_latest_transitions() {
        let mut sm = StateMachine::new(StateTimeouts::default(), true, 0);
        sm.set_state(SystemState::Initializing, None, 0).unwrap();
        for i in 0..5 {
            sm.set_state(SystemState::ShuttingDown, None, i).unwrap();
            sm.set_state(SystemState::Terminated, None, i).unwrap();
            sm.set_state(SystemState::Initializing, None, i).unwrap();
        }
        assert_eq!(sm.history().len(), HISTORY_LEN);
        assert_eq!(sm.history().last().map(|r| r.to), Some(SystemState::Initializing));
        assert_eq!(sm.transitions(), 16);
    }
}
