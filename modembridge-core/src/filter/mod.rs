//! Protocol Stream Filters
//!
//! Each pipeline owns exactly one filter, chosen by its direction:
//!
//! | Direction        | Filter                         | Removes                 |
//! |------------------|--------------------------------|-------------------------|
//! | Serial → Network | [`HayesFilter`](hayes)         | AT lines, `+++` escapes |
//! | Network → Serial | [`TelnetFilter`](telnet)       | IAC commands/options    |
//!
//! Filter state persists for the lifetime of the pipeline, so sequences
//! split across chunk boundaries are handled exactly like contiguous ones.

pub mod hayes;
pub mod telnet;

use crate::config::FilterConfig;
use crate::pipeline::Direction;
use crate::time::Timestamp;

pub use hayes::{FilterMode, HayesFilter, HayesState, HayesStats};
pub use telnet::{TelnetFilter, TelnetState, TelnetStats};

/// Mode changes observed while filtering, for the state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterSignals {
    /// A `+++` escape switched the filter to command mode
    pub escape_detected: bool,
    /// A CONNECT result switched the filter back online
    pub returned_online: bool,
}

impl FilterSignals {
    pub fn is_empty(&self) -> bool {
        !self.escape_detected && !self.returned_online
    }

    /// Accumulate signals from another call
    pub fn merge(&mut self, other: FilterSignals) {
        self.escape_detected |= other.escape_detected;
        self.returned_online |= other.returned_online;
    }
}

/// Per-direction filter state
#[derive(Debug, Clone)]
pub enum StreamFilter {
    Hayes(HayesFilter),
    Telnet(TelnetFilter),
}

/// Filter counters, tagged by filter kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "filter", rename_all = "snake_case"))]
pub enum FilterStats {
    Hayes(HayesStats),
    Telnet(TelnetStats),
}

impl StreamFilter {
    /// The filter that belongs to `direction`
    pub fn for_direction(direction: Direction, config: &FilterConfig) -> Self {
        match direction {
            Direction::SerialToNetwork => StreamFilter::Hayes(HayesFilter::new(config)),
            Direction::NetworkToSerial => StreamFilter::Telnet(TelnetFilter::new()),
        }
    }

    /// Filter one chunk
    pub fn process(&mut self, input: &[u8], now: Timestamp, out: &mut Vec<u8>) -> FilterSignals {
        match self {
            StreamFilter::Hayes(filter) => filter.process(input, now, out),
            StreamFilter::Telnet(filter) => {
                filter.process(input, out);
                FilterSignals::default()
            }
        }
    }

    /// Apply time-based expiry with no new input
    pub fn poll(&mut self, now: Timestamp, out: &mut Vec<u8>) {
        if let StreamFilter::Hayes(filter) = self {
            filter.poll(now, out);
        }
    }

    /// Switch online/command mode (no-op for Telnet)
    pub fn set_online(&mut self, online: bool) {
        if let StreamFilter::Hayes(filter) = self {
            filter.set_online(online);
        }
    }

    /// Bytes held back waiting for a line decision or escape window
    pub fn held_bytes(&self) -> usize {
        match self {
            StreamFilter::Hayes(filter) => filter.held_bytes(),
            StreamFilter::Telnet(_) => 0,
        }
    }

    pub fn hayes(&self) -> Option<&HayesFilter> {
        match self {
            StreamFilter::Hayes(filter) => Some(filter),
            StreamFilter::Telnet(_) => None,
        }
    }

    pub fn telnet(&self) -> Option<&TelnetFilter> {
        match self {
            StreamFilter::Telnet(filter) => Some(filter),
            StreamFilter::Hayes(_) => None,
        }
    }

    pub fn stats(&self) -> FilterStats {
        match self {
            StreamFilter::Hayes(filter) => FilterStats::Hayes(*filter.stats()),
            StreamFilter::Telnet(filter) => FilterStats::Telnet(*filter.stats()),
        }
    }
}
