//! Telnet IAC/Option Filter (Network → Serial)
//!
//! Strips Telnet protocol traffic out of the byte stream heading for the
//! serial line so the terminal only sees application data.
//!
//! ```text
//!              IAC                 WILL/WONT/DO/DONT        any
//!   ┌──────┐ ─────→ ┌─────┐ ───────────────────────→ ┌────────┐ ──→ Data
//!   │ Data │        │ Iac │                          │ option │
//!   └──────┘ ←───── └─────┘                          └────────┘
//!       ↑    IAC (emit 0xFF)  │ SB
//!       │                     ↓
//!       │  SE  ┌───────────┐ IAC ┌────────┐ any  ┌────┐
//!       └───── │ SbDataIac │ ←── │ SbData │ ←─── │ Sb │
//!              └───────────┘     └────────┘      └────┘
//! ```
//!
//! The filter is a pure byte-at-a-time machine, so any fragmentation of the
//! input across calls produces the same output.

use heapless::Vec as HVec;

use crate::constants::protocol::{DO, DONT, IAC, SB, SE, WILL, WONT};

/// Sub-state of the Telnet filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TelnetState {
    /// Plain data, forwarded unchanged
    #[default]
    Data,
    /// Saw IAC
    Iac,
    /// Saw IAC WILL, option byte next
    Will,
    /// Saw IAC WONT, option byte next
    Wont,
    /// Saw IAC DO, option byte next
    Do,
    /// Saw IAC DONT, option byte next
    Dont,
    /// Saw IAC SB, option byte next
    Sb,
    /// Inside a suboption, discarding
    SbData,
    /// Saw IAC inside a suboption
    SbDataIac,
}

/// Telnet filter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TelnetStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// `IAC IAC` pairs unescaped to a single 0xFF
    pub escaped_iacs: u64,
    /// WILL/WONT/DO/DONT sequences discarded
    pub negotiations: u64,
    /// Complete `IAC SB … IAC SE` blocks discarded
    pub subnegotiations: u64,
    /// Other two-byte commands (NOP, GA, AYT, …) discarded
    pub commands: u64,
}

/// Most recent option negotiations seen, newest last
pub type NegotiationLog = HVec<(u8, u8), 8>;

/// Telnet IAC stripper
#[derive(Debug, Clone, Default)]
pub struct TelnetFilter {
    state: TelnetState,
    stats: TelnetStats,
    recent: NegotiationLog,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `input`, appending forwarded bytes to `out`
    pub fn process(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let before = out.len();
        for &byte in input {
            self.step(byte, out);
        }
        self.stats.bytes_in += input.len() as u64;
        self.stats.bytes_out += (out.len() - before) as u64;
    }

    fn step(&mut self, byte: u8, out: &mut Vec<u8>) {
        self.state = match self.state {
            TelnetState::Data => {
                if byte == IAC {
                    TelnetState::Iac
                } else {
                    out.push(byte);
                    TelnetState::Data
                }
            }
            TelnetState::Iac => match byte {
                IAC => {
                    out.push(IAC);
                    self.stats.escaped_iacs += 1;
                    TelnetState::Data
                }
                WILL => TelnetState::Will,
                WONT => TelnetState::Wont,
                DO => TelnetState::Do,
                DONT => TelnetState::Dont,
                SB => TelnetState::Sb,
                _ => {
                    self.stats.commands += 1;
                    TelnetState::Data
                }
            },
            TelnetState::Will | TelnetState::Wont | TelnetState::Do | TelnetState::Dont => {
                let verb = match self.state {
                    TelnetState::Will => WILL,
                    TelnetState::Wont => WONT,
                    TelnetState::Do => DO,
                    _ => DONT,
                };
                self.record_negotiation(verb, byte);
                TelnetState::Data
            }
            TelnetState::Sb => TelnetState::SbData,
            TelnetState::SbData => {
                if byte == IAC {
                    TelnetState::SbDataIac
                } else {
                    TelnetState::SbData
                }
            }
            TelnetState::SbDataIac => {
                if byte == SE {
                    self.stats.subnegotiations += 1;
                    TelnetState::Data
                } else {
                    // IAC IAC (escaped data) or a stray command: still inside
                    TelnetState::SbData
                }
            }
        };
    }

    fn record_negotiation(&mut self, verb: u8, option: u8) {
        self.stats.negotiations += 1;
        if self.recent.is_full() {
            self.recent.remove(0);
        }
        let _ = self.recent.push((verb, option));
        log_debug!("Telnet negotiation {} {} discarded", verb, option);
    }

    pub fn state(&self) -> TelnetState {
        self.state
    }

    pub fn stats(&self) -> &TelnetStats {
        &self.stats
    }

    /// Recently discarded `(verb, option)` pairs
    pub fn recent_negotiations(&self) -> &[(u8, u8)] {
        &self.recent
    }

    /// Return to the Data state, dropping any partial sequence
    pub fn reset(&mut self) {
        self.state = TelnetState::Data;
    }
}
