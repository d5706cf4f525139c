//! Deterministic bridge harness
//!
//! Owns a [`BridgeCore`] built over a [`MockTimeSource`] and the scripted
//! collaborators, and drives the management loop one tick at a time.

use std::sync::Arc;

use modembridge_core::{
    BridgeConfig, BridgeCore, Direction, IngressHandle, MockTimeSource, SystemState, TickReport,
    TimeSource,
};

use super::{RecordingSerial, ScriptedLink, SwitchModem};

pub struct BridgeHarness {
    pub core: BridgeCore,
    pub clock: Arc<MockTimeSource>,
    pub serial: RecordingSerial,
    pub link: ScriptedLink,
    pub modem: SwitchModem,
}

impl BridgeHarness {
    pub fn new() -> Self {
        Self::with(BridgeConfig::default(), ScriptedLink::new())
    }

    pub fn with(config: BridgeConfig, link: ScriptedLink) -> Self {
        let clock = MockTimeSource::shared(10_000);
        let serial = RecordingSerial::new();
        let modem = SwitchModem::new(true);
        let core = BridgeCore::builder(config)
            .clock(clock.clone())
            .serial(serial.clone())
            .network(link.clone())
            .modem(modem.clone())
            .build()
            .expect("valid test configuration");

        Self {
            core,
            clock,
            serial,
            link,
            modem,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn tick(&self) -> TickReport {
        self.core.tick()
    }

    /// Move the clock forward, then tick
    pub fn advance(&self, ms: u64) -> TickReport {
        self.clock.advance(ms);
        self.core.tick()
    }

    /// Tick until `target` or `max_ticks` iterations, following `next_wake`
    pub fn run_until(&self, target: SystemState, max_ticks: usize) -> bool {
        for _ in 0..max_ticks {
            if self.core.state() == target {
                return true;
            }
            let report = self.core.tick();
            if report.state != target && report.next_wake > report.now {
                self.clock.set(report.next_wake);
            }
        }
        self.core.state() == target
    }

    /// Tick without advancing time until neither direction has backlog
    pub fn drain(&self, max_ticks: usize) -> usize {
        for i in 0..max_ticks {
            let report = self.core.tick();
            if report.backlog == [0, 0] {
                return i + 1;
            }
        }
        max_ticks
    }

    /// Start, reach Ready, ring in and reach DataTransfer
    pub fn establish(&self) {
        self.core.start().expect("start from Uninitialized");
        assert_eq!(self.tick().entered, Some(SystemState::Ready));
        self.core.carrier_rising();
        assert!(
            self.run_until(SystemState::DataTransfer, 16),
            "session not established, stuck in {}",
            self.core.state()
        );
    }

    pub fn serial_in(&self) -> IngressHandle {
        self.core.ingress(Direction::SerialToNetwork)
    }

    pub fn network_in(&self) -> IngressHandle {
        self.core.ingress(Direction::NetworkToSerial)
    }
}
