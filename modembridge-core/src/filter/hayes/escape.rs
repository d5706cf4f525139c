//! `+++` escape detection with guard time
//!
//! ```text
//!   ≥ guard of silence      ≤ window       ≤ window
//!  ──────────────────── + ─────────── + ─────────── +   → escape
//! ```
//!
//! Candidate `+` characters are held back while a sequence may still
//! complete. If it does not (another byte arrives, or the window passes)
//! the held characters are handed back to the caller to be forwarded.

use crate::time::{elapsed_ms, Timestamp};

/// What to do with the observed byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeAction {
    /// Not part of an escape; process as data
    Forward,
    /// Candidate escape character; hold it
    Hold,
    /// Final escape character; the whole sequence is consumed
    Complete,
}

/// Result of observing one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeOutcome {
    /// Previously held escape characters to release before this byte
    pub released: u8,
    pub action: EscapeAction,
}

/// Guard-timed escape sequence detector
#[derive(Debug, Clone)]
pub struct EscapeDetector {
    escape_char: u8,
    count: u8,
    guard_ms: u64,
    window_ms: u64,
    held: u8,
    last_plus_at: Timestamp,
    last_byte_at: Option<Timestamp>,
}

impl EscapeDetector {
    pub fn new(escape_char: u8, count: u8, guard_ms: u64, window_ms: u64) -> Self {
        Self {
            escape_char,
            count: count.max(1),
            guard_ms,
            window_ms,
            held: 0,
            last_plus_at: 0,
            last_byte_at: None,
        }
    }

    /// Feed one byte received in online mode
    pub fn observe(&mut self, byte: u8, now: Timestamp) -> EscapeOutcome {
        let silent = self
            .last_byte_at
            .map_or(true, |last| elapsed_ms(last, now) >= self.guard_ms);
        self.last_byte_at = Some(now);

        if byte != self.escape_char {
            return EscapeOutcome {
                released: self.take_held(),
                action: EscapeAction::Forward,
            };
        }

        let mut released = 0;
        if self.held > 0 {
            if elapsed_ms(self.last_plus_at, now) <= self.window_ms {
                self.held += 1;
                self.last_plus_at = now;
                if self.held >= self.count {
                    self.held = 0;
                    return EscapeOutcome {
                        released: 0,
                        action: EscapeAction::Complete,
                    };
                }
                return EscapeOutcome {
                    released: 0,
                    action: EscapeAction::Hold,
                };
            }
            // Window passed: the held run is data, this one may start anew
            released = self.take_held();
        }

        if !silent {
            return EscapeOutcome {
                released,
                action: EscapeAction::Forward,
            };
        }

        self.last_plus_at = now;
        if self.count == 1 {
            return EscapeOutcome {
                released,
                action: EscapeAction::Complete,
            };
        }
        self.held = 1;
        EscapeOutcome {
            released,
            action: EscapeAction::Hold,
        }
    }

    /// Release held characters once the window has passed
    pub fn expire(&mut self, now: Timestamp) -> u8 {
        if self.held > 0 && elapsed_ms(self.last_plus_at, now) > self.window_ms {
            self.take_held()
        } else {
            0
        }
    }

    /// Record activity without escape detection (command mode)
    pub fn touch(&mut self, now: Timestamp) {
        self.last_byte_at = Some(now);
    }

    /// Number of escape characters currently held
    pub fn held(&self) -> u8 {
        self.held
    }

    pub fn escape_char(&self) -> u8 {
        self.escape_char
    }

    /// Drop held characters without releasing them
    pub fn reset(&mut self) {
        self.held = 0;
    }

    fn take_held(&mut self) -> u8 {
        core::mem::take(&mut self.held)
    }
}
