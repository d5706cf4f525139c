//! Hayes AT-Command Filter (Serial → Network)
//!
//! ## Overview
//!
//! Keeps modem control traffic typed by the terminal user from leaking onto
//! the network session. The filter runs in one of two modes:
//!
//! ```text
//!                       +++ (guarded)
//!   ┌──────────┐ ─────────────────────────→ ┌──────────┐
//!   │  Online  │                            │ Command  │
//!   └──────────┘ ←───────────────────────── └──────────┘
//!                 CONNECT result / set_online
//! ```
//!
//! ### Online mode
//!
//! - Guarded `+++` escape detection ([`escape`]); escape characters are held
//!   while a sequence may complete and never forwarded once it does
//! - Line classification from the first three bytes: `AT`/`at` followed by
//!   a command character marks an embedded command line, which is
//!   suppressed through its terminator. Any other line is forwarded as its
//!   bytes arrive, which yields exactly the bytes of the complete line
//! - CR followed by LF is one terminator
//!
//! ### Command mode
//!
//! Lines are assembled completely and checked against the [`dictionary`].
//! A known command opens a result wait so the synchronous response can be
//! intercepted; a result that ends command mode (CONNECT) switches back to
//! online. ANSI escape sequences are forwarded without line analysis and
//! unknown text passes through unchanged.
//!
//! ## Fragmentation
//!
//! All decisions are made per byte from persistent state, so feeding input
//! one byte at a time yields the same output as a single call with the
//! same timestamp.

pub mod dictionary;
pub mod escape;

use heapless::Vec as HVec;

use crate::config::FilterConfig;
use crate::constants::buffers::{LINE_BUFFER_SIZE, RESULT_BUFFER_SIZE};
use crate::constants::protocol::{CR, ESC, ESCAPE_COUNT, LF, MAX_ANSI_SEQUENCE};
use crate::filter::FilterSignals;
use crate::time::{elapsed_ms, Timestamp};

use escape::{EscapeAction, EscapeDetector};

/// Modem data mode as seen by the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterMode {
    /// Offline: the terminal talks to the modem
    #[default]
    Command,
    /// Online: the terminal talks to the remote end
    Online,
}

/// Sub-state of the Hayes filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum HayesState {
    /// Between or inside ordinary lines
    #[default]
    Normal,
    /// Forwarding an ANSI escape sequence (command mode)
    Escape,
    /// Holding candidate `+` characters (online mode)
    PlusEscape,
    /// Assembling an AT command line (command mode)
    Command,
    /// Waiting for the result of a recognized command
    Result,
    /// Saw CR; a following LF belongs to the same terminator
    CrWait,
    /// Saw LF; a following CR belongs to the same terminator (command mode)
    LfWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineClass {
    Undecided,
    Data,
    Command,
}

/// Hayes filter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HayesStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Lines forwarded to the network
    pub lines_forwarded: u64,
    /// Embedded AT lines suppressed in online mode
    pub lines_suppressed: u64,
    /// AT lines suppressed in command mode
    pub commands_suppressed: u64,
    /// Result codes intercepted after a command
    pub results_intercepted: u64,
    /// Completed `+++` escapes
    pub escapes_detected: u64,
    /// Returns to online mode through a result code
    pub returned_online: u64,
    /// Held `+` characters released as data
    pub pluses_released: u64,
    /// Partial lines discarded after the line timeout
    pub lines_expired: u64,
    /// ANSI sequences forwarded in command mode
    pub ansi_sequences: u64,
}

/// AT-command detector and suppressor
#[derive(Debug, Clone)]
pub struct HayesFilter {
    mode: FilterMode,
    state: HayesState,
    line: HVec<u8, LINE_BUFFER_SIZE>,
    line_class: LineClass,
    line_started_at: Option<Timestamp>,
    result: HVec<u8, RESULT_BUFFER_SIZE>,
    result_since: Option<Timestamp>,
    terminator_forwarded: bool,
    ansi_len: usize,
    escape: EscapeDetector,
    line_timeout_ms: u64,
    result_timeout_ms: u64,
    stats: HayesStats,
}

impl HayesFilter {
    /// Create a filter in command mode
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            mode: FilterMode::Command,
            state: HayesState::Normal,
            line: HVec::new(),
            line_class: LineClass::Undecided,
            line_started_at: None,
            result: HVec::new(),
            result_since: None,
            terminator_forwarded: false,
            ansi_len: 0,
            escape: EscapeDetector::new(
                config.escape_char,
                ESCAPE_COUNT as u8,
                config.escape_guard_ms,
                config.escape_window_ms,
            ),
            line_timeout_ms: config.line_timeout_ms,
            result_timeout_ms: config.result_timeout_ms,
            stats: HayesStats::default(),
        }
    }

    /// Filter `input` received at `now`, appending forwarded bytes to `out`
    pub fn process(&mut self, input: &[u8], now: Timestamp, out: &mut Vec<u8>) -> FilterSignals {
        let before = out.len();
        let mut signals = FilterSignals::default();

        self.expire(now, out);
        for &byte in input {
            match self.mode {
                FilterMode::Online => self.online_byte(byte, now, out, &mut signals),
                FilterMode::Command => self.command_byte(byte, now, out, &mut signals),
            }
        }

        self.stats.bytes_in += input.len() as u64;
        self.stats.bytes_out += (out.len() - before) as u64;
        signals
    }

    /// Apply timeouts without new input
    ///
    /// Releases held escape characters whose window has passed, discards
    /// stale partial lines and ends an expired result wait.
    pub fn poll(&mut self, now: Timestamp, out: &mut Vec<u8>) {
        let before = out.len();
        self.expire(now, out);
        self.stats.bytes_out += (out.len() - before) as u64;
    }

    /// Switch between online and command mode
    pub fn set_online(&mut self, online: bool) {
        let mode = if online {
            FilterMode::Online
        } else {
            FilterMode::Command
        };
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        self.state = HayesState::Normal;
        self.escape.reset();
        self.result.clear();
        self.result_since = None;
        self.reset_line();
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn is_online(&self) -> bool {
        self.mode == FilterMode::Online
    }

    pub fn state(&self) -> HayesState {
        self.state
    }

    pub fn stats(&self) -> &HayesStats {
        &self.stats
    }

    /// Bytes held back (partial line, result text, escape characters)
    pub fn held_bytes(&self) -> usize {
        self.line.len() + self.result.len() + self.escape.held() as usize
    }

    // ========================================================================
    // Online mode
    // ========================================================================

    fn online_byte(&mut self, byte: u8, now: Timestamp, out: &mut Vec<u8>, signals: &mut FilterSignals) {
        let outcome = self.escape.observe(byte, now);
        if outcome.released > 0 {
            self.release_pluses(outcome.released, now, out);
        }

        match outcome.action {
            EscapeAction::Forward => {
                if self.state == HayesState::PlusEscape {
                    self.state = HayesState::Normal;
                }
                self.line_byte(byte, now, out);
            }
            EscapeAction::Hold => self.state = HayesState::PlusEscape,
            EscapeAction::Complete => self.enter_command_mode(out, signals),
        }
    }

    fn line_byte(&mut self, byte: u8, now: Timestamp, out: &mut Vec<u8>) {
        if self.state == HayesState::CrWait {
            self.state = HayesState::Normal;
            if byte == LF {
                if self.terminator_forwarded {
                    out.push(LF);
                }
                return;
            }
        }

        if byte == CR || byte == LF {
            self.end_online_line(byte, out);
            return;
        }

        if self.line_started_at.is_none() {
            self.line_started_at = Some(now);
        }

        match self.line_class {
            LineClass::Data => out.push(byte),
            LineClass::Command => {
                if self.line.push(byte).is_err() {
                    // Full line buffer ends the line
                    self.stats.lines_suppressed += 1;
                    self.reset_line();
                }
            }
            LineClass::Undecided => {
                let _ = self.line.push(byte);
                match classify_prefix(&self.line) {
                    Some(LineClass::Data) => {
                        out.extend_from_slice(&self.line);
                        self.line.clear();
                        self.line_class = LineClass::Data;
                    }
                    Some(class) => self.line_class = class,
                    None => {}
                }
            }
        }
    }

    fn end_online_line(&mut self, terminator: u8, out: &mut Vec<u8>) {
        let forwarded = match self.line_class {
            LineClass::Undecided if dictionary::is_command_line(&self.line) => false,
            LineClass::Undecided => {
                out.extend_from_slice(&self.line);
                out.push(terminator);
                true
            }
            LineClass::Data => {
                out.push(terminator);
                true
            }
            LineClass::Command => false,
        };

        if forwarded {
            self.stats.lines_forwarded += 1;
        } else {
            self.stats.lines_suppressed += 1;
            log_debug!("Suppressed embedded AT command ({} bytes)", self.line.len());
        }

        self.reset_line();
        if terminator == CR {
            self.state = HayesState::CrWait;
            self.terminator_forwarded = forwarded;
        }
    }

    fn release_pluses(&mut self, count: u8, now: Timestamp, out: &mut Vec<u8>) {
        self.state = HayesState::Normal;
        self.stats.pluses_released += count as u64;
        let plus = self.escape.escape_char();
        for _ in 0..count {
            self.line_byte(plus, now, out);
        }
    }

    fn enter_command_mode(&mut self, out: &mut Vec<u8>, signals: &mut FilterSignals) {
        if self.line_class == LineClass::Undecided && !dictionary::is_command_line(&self.line) {
            out.extend_from_slice(&self.line);
        }
        self.reset_line();
        self.mode = FilterMode::Command;
        self.state = HayesState::Normal;
        self.result.clear();
        self.result_since = None;
        self.stats.escapes_detected += 1;
        signals.escape_detected = true;
        log_debug!("+++ escape detected, entering command mode");
    }

    // ========================================================================
    // Command mode
    // ========================================================================

    fn command_byte(&mut self, byte: u8, now: Timestamp, out: &mut Vec<u8>, signals: &mut FilterSignals) {
        self.escape.touch(now);

        match self.state {
            HayesState::Escape => {
                out.push(byte);
                self.ansi_len += 1;
                let finished = if self.ansi_len == 1 {
                    byte != b'['
                } else {
                    (0x40..=0x7E).contains(&byte) || self.ansi_len >= MAX_ANSI_SEQUENCE
                };
                if finished {
                    self.state = self.resting_state();
                }
                return;
            }
            HayesState::CrWait | HayesState::LfWait => {
                let pair = if self.state == HayesState::CrWait { LF } else { CR };
                self.state = self.resting_state();
                if byte == pair {
                    if self.terminator_forwarded {
                        out.push(byte);
                    }
                    return;
                }
            }
            _ => {}
        }

        if byte == ESC && self.line.is_empty() && self.result.is_empty() {
            out.push(byte);
            self.ansi_len = 0;
            self.state = HayesState::Escape;
            self.stats.ansi_sequences += 1;
            return;
        }

        if byte == CR || byte == LF {
            self.end_command_line(byte, now, out, signals);
            return;
        }

        if self.line_started_at.is_none() {
            self.line_started_at = Some(now);
        }

        if self.state == HayesState::Result {
            if self.result.push(byte).is_ok() {
                return;
            }
            // Too long for a result code: ordinary text after all
            self.abandon_result_wait();
        }

        if self.line.push(byte).is_err() {
            self.flush_full_line(out);
            let _ = self.line.push(byte);
        }
        if self.line_class == LineClass::Undecided {
            if let Some(class) = classify_prefix(&self.line) {
                self.line_class = class;
                if class == LineClass::Command {
                    self.state = HayesState::Command;
                }
            }
        }
    }

    fn end_command_line(&mut self, terminator: u8, now: Timestamp, out: &mut Vec<u8>, signals: &mut FilterSignals) {
        let forwarded = if self.state == HayesState::Result {
            let text = core::mem::take(&mut self.result);
            if let Some(entry) = dictionary::lookup_result(&text) {
                self.result_since = None;
                self.stats.results_intercepted += 1;
                if entry.ends_command_mode {
                    self.mode = FilterMode::Online;
                    self.escape.reset();
                    self.stats.returned_online += 1;
                    signals.returned_online = true;
                    log_debug!("{} result, returning online", entry.verbose);
                }
                false
            } else if text.is_empty() {
                // Blank framing line around a result
                false
            } else {
                out.extend_from_slice(&text);
                out.push(terminator);
                true
            }
        } else if dictionary::is_command_line(&self.line) {
            self.stats.commands_suppressed += 1;
            if let Some(entry) = dictionary::lookup_command(&self.line) {
                self.result_since = Some(now);
                log_debug!("AT{} ({}) suppressed, awaiting result", entry.name, entry.description);
            }
            false
        } else {
            out.extend_from_slice(&self.line);
            out.push(terminator);
            self.stats.lines_forwarded += 1;
            true
        };

        self.reset_line();
        self.terminator_forwarded = forwarded;
        self.state = match (self.mode, terminator) {
            (_, CR) => HayesState::CrWait,
            (FilterMode::Command, _) => HayesState::LfWait,
            (FilterMode::Online, _) => HayesState::Normal,
        };
    }

    fn flush_full_line(&mut self, out: &mut Vec<u8>) {
        if self.line_class == LineClass::Command {
            self.stats.commands_suppressed += 1;
        } else {
            out.extend_from_slice(&self.line);
            self.stats.lines_forwarded += 1;
        }
        self.reset_line();
        self.state = self.resting_state();
    }

    fn abandon_result_wait(&mut self) {
        self.result_since = None;
        let text = core::mem::take(&mut self.result);
        self.line.clear();
        let _ = self.line.extend_from_slice(&text);
        self.line_class = classify_prefix(&self.line).unwrap_or(LineClass::Undecided);
        self.state = if self.line_class == LineClass::Command {
            HayesState::Command
        } else {
            HayesState::Normal
        };
    }

    fn resting_state(&self) -> HayesState {
        if self.mode == FilterMode::Command && self.result_since.is_some() {
            HayesState::Result
        } else {
            HayesState::Normal
        }
    }

    // ========================================================================
    // Timeouts
    // ========================================================================

    fn expire(&mut self, now: Timestamp, out: &mut Vec<u8>) {
        if self.mode == FilterMode::Online {
            let released = self.escape.expire(now);
            if released > 0 {
                self.release_pluses(released, now, out);
            }
        }

        if let Some(started) = self.line_started_at {
            if elapsed_ms(started, now) > self.line_timeout_ms {
                if !self.line.is_empty() || !self.result.is_empty() {
                    self.stats.lines_expired += 1;
                    log_debug!("Discarded stale partial line after {}ms", elapsed_ms(started, now));
                }
                self.result.clear();
                self.reset_line();
                if matches!(self.state, HayesState::Command) {
                    self.state = self.resting_state();
                }
            }
        }

        if let Some(since) = self.result_since {
            if elapsed_ms(since, now) > self.result_timeout_ms {
                log_debug!("No result code within {}ms", self.result_timeout_ms);
                if self.state == HayesState::Result {
                    self.abandon_result_wait();
                } else {
                    self.result_since = None;
                }
            }
        }
    }

    fn reset_line(&mut self) {
        self.line.clear();
        self.line_class = LineClass::Undecided;
        self.line_started_at = None;
    }
}

/// Decide a line's class from its first bytes, if already possible
fn classify_prefix(line: &[u8]) -> Option<LineClass> {
    match line {
        [] => None,
        [first, ..] if !matches!(*first, b'A' | b'a') => Some(LineClass::Data),
        [_] => None,
        [_, _, ..] if !dictionary::has_at_prefix(line) => Some(LineClass::Data),
        [_, _] => None,
        [_, _, third, ..] => {
            if dictionary::is_command_char(*third) {
                Some(LineClass::Command)
            } else {
                Some(LineClass::Data)
            }
        }
    }
}
