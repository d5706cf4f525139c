//! Bridge Context and Management Loop
//!
//! ## Overview
//!
//! [`BridgeCore`] owns everything the core runs: the state machine (behind
//! the state lock), the two pipelines, the fair scheduler and the
//! collaborators. One call to [`BridgeCore::tick`] is one iteration of the
//! management loop:
//!
//! ```text
//! tick()
//!  ├─ lock state, lock inner
//!  ├─ StateMachine::process      carrier edges, timeouts, per-state step
//!  ├─ sync Hayes filter mode     ← connection mode
//!  ├─ if DataTransfer/Flushing:
//!  │    ├─ buffer resize policy
//!  │    ├─ scheduler picks a direction
//!  │    ├─ pipeline processes one chunk
//!  │    └─ escape / CONNECT signals → connection mode
//!  └─ TickReport { next_wake }
//! ```
//!
//! ## Deadline-Driven Waiting
//!
//! `next_wake` is now while there is backlog or a state was just entered;
//! otherwise it is the earliest of the state-dependent idle interval, the
//! armed state timeout and the next connect retry. [`ManagementThread`]
//! sleeps on the state condition variable until then, and is woken early
//! by transitions, carrier edges and stop requests.
//!
//! ## Lock Order
//!
//! state → inner → buffer. Receive threads only ever take a buffer lock
//! (through an [`IngressHandle`]); the carrier entry point only tries the
//! state lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{BridgeConfig, NetworkTarget};
use crate::constants::time::{
    CONNECTING_SLEEP_MS, DATA_IDLE_SLEEP_MS, ERROR_SLEEP_MS, IDLE_SLEEP_MS, TERMINATED_SLEEP_MS,
};
use crate::errors::{BridgeError, BridgeResult};
use crate::pipeline::{ChunkOutcome, Direction, IngressHandle, NetworkSink, Pipeline, SerialSink};
use crate::queue::CarrierEdge;
use crate::scheduler::FairScheduler;
use crate::state::shared::CarrierPost;
use crate::state::{ConnectionMode, SharedState, StateMachine, SystemState};
use crate::stats::{DirectionStats, StatisticsSnapshot};
use crate::time::{Clock, MonotonicClock, Timestamp};
use crate::traits::{AlwaysReady, ModemStatus, NetworkLink, SerialPort, StateEnvironment};

/// Result of one management-loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub now: Timestamp,
    pub state: SystemState,
    /// State entered during this tick
    pub entered: Option<SystemState>,
    /// Direction given a chunk, if any
    pub serviced: Option<Direction>,
    pub chunk: Option<ChunkOutcome>,
    /// Buffered plus pending bytes per direction after the tick
    pub backlog: [usize; 2],
    /// When the loop should run again
    pub next_wake: Timestamp,
}

impl TickReport {
    /// Milliseconds until `next_wake`
    pub fn sleep_ms(&self) -> u64 {
        self.next_wake.saturating_sub(self.now)
    }
}

/// Everything guarded by the inner lock
struct BridgeInner {
    pipelines: [Pipeline; 2],
    scheduler: FairScheduler,
    serial: Box<dyn SerialPort>,
    network: Box<dyn NetworkLink>,
    modem: Box<dyn ModemStatus>,
    target: NetworkTarget,
    clock: Clock,
    ticks: u64,
}

impl BridgeInner {
    fn backlog(&self) -> [usize; 2] {
        [self.pipelines[0].backlog(), self.pipelines[1].backlog()]
    }

    /// Chunks are only processed between activation and deactivation
    fn pipelines_active(&self) -> bool {
        self.pipelines.iter().all(Pipeline::is_active)
    }

    fn process_chunk(&mut self, direction: Direction, quantum_ms: u64, clock: &Clock) -> ChunkOutcome {
        let pipeline = &mut self.pipelines[direction.index()];
        match direction {
            Direction::SerialToNetwork => {
                let mut sink = NetworkSink(self.network.as_mut());
                pipeline.process_chunk(&mut sink, clock.as_ref(), quantum_ms)
            }
            Direction::NetworkToSerial => {
                let mut sink = SerialSink(self.serial.as_mut());
                pipeline.process_chunk(&mut sink, clock.as_ref(), quantum_ms)
            }
        }
    }

    fn maintain(&mut self, now: Timestamp) {
        for pipeline in &mut self.pipelines {
            match pipeline.maintain(now) {
                Ok(Some(event)) => {
                    log_info!(
                        "{} buffer resized {} -> {}",
                        pipeline.direction(),
                        event.from,
                        event.to
                    );
                }
                Ok(None) => {}
                Err(err) => log_warn!("{} resize failed: {}", pipeline.direction(), err),
            }
        }
    }
}

impl StateEnvironment for BridgeInner {
    fn modem_ready(&self) -> bool {
        self.modem.is_ready()
    }

    fn try_connect(&mut self) -> BridgeResult<()> {
        self.network.connect(&self.target)
    }

    fn network_connected(&self) -> bool {
        self.network.is_connected()
    }

    fn negotiation_complete(&self) -> bool {
        self.network.negotiation_complete()
    }

    fn pending_bytes(&self) -> usize {
        self.backlog().iter().sum()
    }

    fn set_pipelines_active(&mut self, active: bool) {
        for pipeline in &mut self.pipelines {
            pipeline.set_active(active);
            if !active {
                // Whatever a cut-short flush left behind
                let discarded = pipeline.discard(self.clock.now());
                if discarded > 0 {
                    log_warn!("{} discarded {} undelivered bytes", pipeline.direction(), discarded);
                }
            }
        }
    }

    fn disconnect(&mut self) {
        self.network.disconnect();
    }
}

/// The pipeline-management core
pub struct BridgeCore {
    config: BridgeConfig,
    clock: Clock,
    state: Arc<SharedState>,
    inner: Mutex<BridgeInner>,
    stop_requested: AtomicBool,
}

impl BridgeCore {
    pub fn builder(config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder::new(config)
    }

    /// Leave Uninitialized and begin initialization
    pub fn start(&self) -> BridgeResult<()> {
        let now = self.clock.now();
        self.state.lock().enter(SystemState::Initializing, now)?;
        self.state.notify();
        Ok(())
    }

    /// Run one management-loop iteration
    pub fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut machine = self.state.lock();
        let mut inner = self.inner.lock();
        inner.ticks += 1;

        let entered = machine.process(self.state.carrier(), &mut *inner, now);
        let online = machine.mode() == ConnectionMode::Online;
        inner.pipelines[Direction::SerialToNetwork.index()]
            .filter_mut()
            .set_online(online);

        let mut serviced = None;
        let mut chunk = None;

        if inner.pipelines_active() {
            inner.maintain(now);

            let backlog = inner.backlog();
            let mut direction = inner.scheduler.next_direction(now, backlog);
            if direction.is_none() {
                // Nothing buffered; still let a held partial line expire
                let s2n = &inner.pipelines[Direction::SerialToNetwork.index()];
                if s2n.filter().held_bytes() > 0 {
                    direction = Some(Direction::SerialToNetwork);
                }
            }

            if let Some(direction) = direction {
                let quantum = inner.scheduler.quantum_for(direction);
                let outcome = inner.process_chunk(direction, quantum, &self.clock);
                inner
                    .scheduler
                    .complete(direction, outcome.read, outcome.latency_ms, outcome.finished_at);

                if outcome.signals.escape_detected {
                    machine.set_mode(ConnectionMode::Command);
                }
                if outcome.signals.returned_online {
                    machine.set_mode(ConnectionMode::Online);
                }
                serviced = Some(direction);
                chunk = Some(outcome);
            }
        }

        let state = machine.state();
        let backlog = inner.backlog();
        let has_work = inner.pipelines_active() && backlog.iter().any(|b| *b > 0);
        let next_wake = if entered.is_some() || has_work {
            now
        } else {
            [machine.timeout_deadline(), machine.retry_deadline()]
                .into_iter()
                .flatten()
                .fold(now + idle_interval_ms(state), Timestamp::min)
                .max(now)
        };

        drop(inner);
        drop(machine);
        if entered.is_some() {
            self.state.notify();
        }

        TickReport {
            now,
            state,
            entered,
            serviced,
            chunk,
            backlog,
            next_wake,
        }
    }

    /// Sleep until `deadline` or an earlier wake-up
    pub fn idle_until(&self, deadline: Timestamp) {
        let mut machine = self.state.lock();
        if self.stop_requested.load(Ordering::SeqCst) {
            return;
        }
        let remaining = deadline.saturating_sub(self.clock.now());
        if remaining > 0 {
            self.state.wait(&mut machine, Duration::from_millis(remaining));
        }
    }

    /// Ask for a graceful end of the current session
    ///
    /// A live session drains through Flushing; otherwise the bridge shuts
    /// down directly. Automatic restart is disabled.
    pub fn request_shutdown(&self) -> BridgeResult<()> {
        let now = self.clock.now();
        let mut machine = self.state.lock();
        let mut inner = self.inner.lock();
        machine.set_auto_restart(false);

        let target = match machine.state() {
            SystemState::Negotiating | SystemState::DataTransfer => SystemState::Flushing,
            SystemState::Uninitialized
            | SystemState::Flushing
            | SystemState::ShuttingDown
            | SystemState::Terminated => return Ok(()),
            _ => SystemState::ShuttingDown,
        };
        machine.transition_to(target, &mut *inner, now)?;

        drop(inner);
        drop(machine);
        self.state.notify();
        Ok(())
    }

    /// Ask a running management loop to exit
    pub fn request_stop(&self) {
        let guard = self.state.lock();
        self.stop_requested.store(true, Ordering::SeqCst);
        drop(guard);
        self.state.notify();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    // ===== Collaborator entry points =====

    /// Carrier-detect rising edge; never blocks
    pub fn carrier_rising(&self) -> CarrierPost {
        self.state.post_carrier(CarrierEdge::Rising, self.clock.now())
    }

    /// Carrier-detect falling edge; never blocks
    pub fn carrier_falling(&self) -> CarrierPost {
        self.state.post_carrier(CarrierEdge::Falling, self.clock.now())
    }

    /// Handle for a carrier-detect source running on another thread
    pub fn carrier_handle(&self) -> CarrierHandle {
        CarrierHandle {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Handle for the receive path feeding `direction`
    pub fn ingress(&self, direction: Direction) -> IngressHandle {
        self.inner.lock().pipelines[direction.index()].ingress(Arc::clone(&self.clock))
    }

    // ===== Introspection =====

    pub fn state(&self) -> SystemState {
        self.state.state()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.state.lock().mode()
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Buffered plus pending bytes per direction
    pub fn backlog(&self) -> [usize; 2] {
        self.inner.lock().backlog()
    }

    /// Consistent copy of all statistics
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let machine = self.state.lock();
        let inner = self.inner.lock();

        let pipelines = [inner.pipelines[0].snapshot(), inner.pipelines[1].snapshot()];
        let scheduler = inner.scheduler.snapshot();
        StatisticsSnapshot {
            taken_at: self.clock.now(),
            state: machine.state(),
            mode: machine.mode(),
            transitions: machine.transitions(),
            rejected_transitions: machine.rejected_transitions(),
            directions: [
                DirectionStats::from(&pipelines[0]),
                DirectionStats::from(&pipelines[1]),
            ],
            fairness_ratio: scheduler.fairness_ratio,
            scheduling_cycles: scheduler.stats.cycles,
            ticks: inner.ticks,
            scheduler,
            pipelines,
            carrier: self.state.carrier().stats(),
            connection: *machine.context(),
        }
    }
}

impl core::fmt::Debug for BridgeCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BridgeCore")
            .field("state", &self.state())
            .field("target", &self.config.network)
            .finish()
    }
}

fn idle_interval_ms(state: SystemState) -> u64 {
    match state {
        SystemState::Connecting | SystemState::Negotiating => CONNECTING_SLEEP_MS,
        SystemState::DataTransfer | SystemState::Flushing => DATA_IDLE_SLEEP_MS,
        SystemState::Error => ERROR_SLEEP_MS,
        SystemState::Terminated => TERMINATED_SLEEP_MS,
        _ => IDLE_SLEEP_MS,
    }
}

/// Cloneable carrier-detect entry point
#[derive(Clone)]
pub struct CarrierHandle {
    state: Arc<SharedState>,
    clock: Clock,
}

impl CarrierHandle {
    pub fn post(&self, edge: CarrierEdge) -> CarrierPost {
        self.state.post_carrier(edge, self.clock.now())
    }

    pub fn rising(&self) -> CarrierPost {
        self.post(CarrierEdge::Rising)
    }

    pub fn falling(&self) -> CarrierPost {
        self.post(CarrierEdge::Falling)
    }
}

impl core::fmt::Debug for CarrierHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CarrierHandle")
            .field("level", &self.state.carrier().level())
            .finish()
    }
}

// ===== BUILDER =====

/// Builder for [`BridgeCore`]
///
/// The serial port and network link are required; the modem status
/// defaults to [`AlwaysReady`] and the clock to a [`MonotonicClock`].
pub struct BridgeBuilder {
    config: BridgeConfig,
    clock: Option<Clock>,
    serial: Option<Box<dyn SerialPort>>,
    network: Option<Box<dyn NetworkLink>>,
    modem: Option<Box<dyn ModemStatus>>,
}

impl BridgeBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            clock: None,
            serial: None,
            network: None,
            modem: None,
        }
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn serial<S: SerialPort + 'static>(mut self, serial: S) -> Self {
        self.serial = Some(Box::new(serial));
        self
    }

    pub fn network<N: NetworkLink + 'static>(mut self, network: N) -> Self {
        self.network = Some(Box::new(network));
        self
    }

    pub fn modem<M: ModemStatus + 'static>(mut self, modem: M) -> Self {
        self.modem = Some(Box::new(modem));
        self
    }

    /// Validate the configuration and assemble the core
    pub fn build(self) -> BridgeResult<BridgeCore> {
        self.config.validate()?;
        let serial = self.serial.ok_or(BridgeError::InvalidParameter {
            reason: "serial port collaborator is required",
        })?;
        let network = self.network.ok_or(BridgeError::InvalidParameter {
            reason: "network link collaborator is required",
        })?;
        let modem = self.modem.unwrap_or_else(|| Box::new(AlwaysReady));
        let clock = self.clock.unwrap_or_else(MonotonicClock::shared);
        let now = clock.now();

        let config = self.config;
        let pipelines = [
            Pipeline::new(
                Direction::SerialToNetwork,
                &config.buffers,
                &config.filter,
                config.scheduling.burst_size,
                now,
            )?,
            Pipeline::new(
                Direction::NetworkToSerial,
                &config.buffers,
                &config.filter,
                config.scheduling.burst_size,
                now,
            )?,
        ];
        let scheduler = FairScheduler::new(config.scheduling, config.serial.baud_rate, now);
        let machine = StateMachine::new(config.timeouts, config.auto_restart, now);

        log_info!(
            "bridge core ready for {} at {} baud",
            config.network,
            config.serial.baud_rate
        );

        Ok(BridgeCore {
            clock: Arc::clone(&clock),
            state: Arc::new(SharedState::new(machine)),
            inner: Mutex::new(BridgeInner {
                pipelines,
                scheduler,
                serial,
                network,
                modem,
                target: config.network.clone(),
                clock,
                ticks: 0,
            }),
            stop_requested: AtomicBool::new(false),
            config,
        })
    }
}

// ===== MANAGEMENT THREAD =====

/// Dedicated thread running the management loop
///
/// ```text
/// loop {
///     if stop requested → exit
///     report = core.tick()
///     core.idle_until(report.next_wake)
/// }
/// ```
pub struct ManagementThread {
    core: Arc<BridgeCore>,
    handle: Option<JoinHandle<()>>,
}

impl ManagementThread {
    /// Start the loop on a new thread
    ///
    /// Fails with `SyncFailure` if the thread cannot be created.
    pub fn spawn(core: Arc<BridgeCore>) -> BridgeResult<Self> {
        let worker = Arc::clone(&core);
        let handle = std::thread::Builder::new()
            .name("modembridge-mgmt".into())
            .spawn(move || run_loop(&worker))
            .map_err(|_| BridgeError::SyncFailure {
                reason: "failed to spawn management thread",
            })?;

        Ok(Self {
            core,
            handle: Some(handle),
        })
    }

    pub fn core(&self) -> &Arc<BridgeCore> {
        &self.core
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Drain and terminate the session, then stop the loop
    ///
    /// Returns true if Terminated was reached within `timeout`.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        let terminated = match self.core.request_shutdown() {
            Ok(()) => self
                .core
                .shared_state()
                .wait_for_state(SystemState::Terminated, timeout),
            Err(err) => {
                log_error!("shutdown request failed: {}", err);
                false
            }
        };
        self.join();
        terminated
    }

    /// Stop the loop without draining
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.core.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log_error!("management thread panicked");
            }
        }
    }
}

impl Drop for ManagementThread {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_loop(core: &BridgeCore) {
    log_debug!("management loop started");
    while !core.stop_requested() {
        let report = core.tick();
        if report.next_wake > report.now {
            core.idle_until(report.next_wake);
        }
    }
    log_debug!("management loop stopped");
}
