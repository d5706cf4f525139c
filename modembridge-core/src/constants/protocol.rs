//! Telnet Command Bytes and Hayes Command-Set Timing
//!
//! Byte values follow RFC 854 (Telnet) and RFC 855 (option negotiation).
//! Hayes timing follows the classic S2/S12 escape guard convention.

// ===== TELNET COMMANDS (RFC 854) =====

/// Interpret As Command.
pub const IAC: u8 = 255;
/// Refuse to perform / demand the peer stop performing an option.
pub const DONT: u8 = 254;
/// Request the peer perform an option.
pub const DO: u8 = 253;
/// Refuse to perform an option.
pub const WONT: u8 = 252;
/// Offer to perform an option.
pub const WILL: u8 = 251;
/// Begin option subnegotiation.
pub const SB: u8 = 250;
/// Go ahead.
pub const GA: u8 = 249;
/// Erase line.
pub const EL: u8 = 248;
/// Erase character.
pub const EC: u8 = 247;
/// Are you there.
pub const AYT: u8 = 246;
/// Abort output.
pub const AO: u8 = 245;
/// Interrupt process.
pub const IP: u8 = 244;
/// Break.
pub const BRK: u8 = 243;
/// Data mark.
pub const DM: u8 = 242;
/// No operation.
pub const NOP: u8 = 241;
/// End of subnegotiation.
pub const SE: u8 = 240;

// ===== TELNET OPTIONS =====

/// Binary transmission (RFC 856).
pub const OPT_BINARY: u8 = 0;
/// Echo (RFC 857).
pub const OPT_ECHO: u8 = 1;
/// Suppress go-ahead (RFC 858).
pub const OPT_SGA: u8 = 3;
/// Terminal type (RFC 1091).
pub const OPT_TTYPE: u8 = 24;
/// Negotiate about window size (RFC 1073).
pub const OPT_NAWS: u8 = 31;

// ===== HAYES ESCAPE SEQUENCE =====

/// Escape character (S2 register default).
pub const ESCAPE_CHAR: u8 = b'+';

/// Number of escape characters forming the sequence.
pub const ESCAPE_COUNT: usize = 3;

/// Silence required before the first escape character (milliseconds).
///
/// S12 default is 50 × 20ms = 1 second.
pub const ESCAPE_GUARD_MS: u64 = 1000;

/// Maximum gap between consecutive escape characters (milliseconds).
pub const ESCAPE_WINDOW_MS: u64 = 2000;

// ===== LINE HANDLING =====

/// Carriage return.
pub const CR: u8 = b'\r';

/// Line feed.
pub const LF: u8 = b'\n';

/// ANSI escape introducer.
pub const ESC: u8 = 0x1B;

/// Age after which a partial line is discarded (milliseconds).
pub const LINE_TIMEOUT_MS: u64 = 30_000;

/// Time to wait for a result code after a recognized command (milliseconds).
pub const RESULT_TIMEOUT_MS: u64 = 5_000;

/// Longest ANSI escape sequence tracked before giving up (bytes).
pub const MAX_ANSI_SEQUENCE: usize = 16;
