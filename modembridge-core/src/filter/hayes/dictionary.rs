//! Static Hayes command and result-code dictionary
//!
//! Commands are matched on the text following the `AT` prefix, longest
//! entry first so `&C` wins over `&`. Result codes are matched on the whole
//! (trimmed) line, in verbose or numeric form.

/// A recognized command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    /// Text after `AT` (empty for bare `AT`)
    pub name: &'static str,
    pub description: &'static str,
}

/// A recognized result code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultEntry {
    pub verbose: &'static str,
    pub numeric: &'static str,
    /// Receiving this result switches to online mode
    pub ends_command_mode: bool,
}

/// Recognized commands, longest names first
pub const COMMANDS: &[CommandEntry] = &[
    CommandEntry { name: "&F", description: "factory defaults" },
    CommandEntry { name: "&C", description: "DCD behaviour" },
    CommandEntry { name: "&D", description: "DTR behaviour" },
    CommandEntry { name: "A", description: "answer" },
    CommandEntry { name: "D", description: "dial" },
    CommandEntry { name: "H", description: "hang up" },
    CommandEntry { name: "O", description: "return online" },
    CommandEntry { name: "Z", description: "reset" },
    CommandEntry { name: "E", description: "command echo" },
    CommandEntry { name: "V", description: "verbose results" },
    CommandEntry { name: "Q", description: "quiet results" },
    CommandEntry { name: "S", description: "S-register" },
    CommandEntry { name: "I", description: "identification" },
    CommandEntry { name: "X", description: "extended results" },
    CommandEntry { name: "+", description: "extended command" },
    CommandEntry { name: "", description: "attention" },
];

/// Recognized result codes
pub const RESULTS: &[ResultEntry] = &[
    ResultEntry { verbose: "OK", numeric: "0", ends_command_mode: false },
    ResultEntry { verbose: "CONNECT", numeric: "1", ends_command_mode: true },
    ResultEntry { verbose: "RING", numeric: "2", ends_command_mode: false },
    ResultEntry { verbose: "NO CARRIER", numeric: "3", ends_command_mode: false },
    ResultEntry { verbose: "ERROR", numeric: "4", ends_command_mode: false },
    ResultEntry { verbose: "NO DIALTONE", numeric: "6", ends_command_mode: false },
    ResultEntry { verbose: "BUSY", numeric: "7", ends_command_mode: false },
    ResultEntry { verbose: "NO ANSWER", numeric: "8", ends_command_mode: false },
];

/// `AT` or `at` (mixed case is not a command prefix)
pub fn has_at_prefix(line: &[u8]) -> bool {
    line.starts_with(b"AT") || line.starts_with(b"at")
}

/// Characters that may follow `AT` in a command
pub fn is_command_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'&' | b'%' | b'\\' | b'*' | b'#')
}

/// Whether a complete line (terminator excluded) is an AT command
pub fn is_command_line(line: &[u8]) -> bool {
    has_at_prefix(line) && line.get(2).map_or(true, |&b| is_command_char(b))
}

/// Look up the command in an AT line
pub fn lookup_command(line: &[u8]) -> Option<&'static CommandEntry> {
    if !is_command_line(line) {
        return None;
    }
    let rest = &line[2..];
    COMMANDS.iter().find(|entry| {
        if entry.name.is_empty() {
            rest.is_empty()
        } else {
            starts_with_ignore_case(rest, entry.name.as_bytes())
        }
    })
}

/// Look up a result code line
pub fn lookup_result(line: &[u8]) -> Option<&'static ResultEntry> {
    let line = trim(line);
    if line.is_empty() {
        return None;
    }
    RESULTS.iter().find(|entry| {
        line == entry.numeric.as_bytes()
            || line.eq_ignore_ascii_case(entry.verbose.as_bytes())
            || (entry.ends_command_mode
                && starts_with_ignore_case(line, entry.verbose.as_bytes())
                && line[entry.verbose.len()] == b' ')
    })
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &line[start..end]
}
