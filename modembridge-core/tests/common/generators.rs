//! Proptest strategies for serial and Telnet traffic

use proptest::prelude::*;

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;

/// Printable text lines that never start with `AT`
pub fn arb_data_line() -> impl Strategy<Value = Vec<u8>> {
    "[B-Zb-z0-9 ,.!?-][ -~]{0,40}".prop_map(|s| {
        let mut line = s.into_bytes();
        line.extend_from_slice(b"\r\n");
        line
    })
}

/// A few recognizable AT command lines
pub fn arb_command_line() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(b"ATZ\r\n".to_vec()),
        Just(b"ATH0\r\n".to_vec()),
        Just(b"AT&F\r\n".to_vec()),
        Just(b"atdt5551234\r\n".to_vec()),
        Just(b"ATS0=1\r\n".to_vec()),
    ]
}

/// Mixed terminal input: data lines with embedded command lines
pub fn arb_terminal_session() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(
        prop_oneof![3 => arb_data_line(), 1 => arb_command_line()],
        1..12,
    )
}

/// One piece of a Telnet stream, with the data bytes it should yield
#[derive(Debug, Clone)]
pub struct TelnetPiece {
    pub wire: Vec<u8>,
    pub data: Vec<u8>,
}

fn arb_plain() -> impl Strategy<Value = TelnetPiece> {
    prop::collection::vec(0u8..IAC, 1..24).prop_map(|bytes| TelnetPiece {
        wire: bytes.clone(),
        data: bytes,
    })
}

fn arb_negotiation() -> impl Strategy<Value = TelnetPiece> {
    (251u8..=254, any::<u8>()).prop_map(|(verb, option)| TelnetPiece {
        wire: vec![IAC, verb, option],
        data: Vec::new(),
    })
}

fn arb_subnegotiation() -> impl Strategy<Value = TelnetPiece> {
    (any::<u8>(), prop::collection::vec(0u8..IAC, 0..8)).prop_map(|(option, payload)| {
        let mut wire = vec![IAC, SB, option];
        wire.extend_from_slice(&payload);
        wire.extend_from_slice(&[IAC, SE]);
        TelnetPiece {
            wire,
            data: Vec::new(),
        }
    })
}

fn arb_escaped_iac() -> impl Strategy<Value = TelnetPiece> {
    Just(TelnetPiece {
        wire: vec![IAC, IAC],
        data: vec![IAC],
    })
}

fn arb_simple_command() -> impl Strategy<Value = TelnetPiece> {
    (241u8..=249).prop_map(|cmd| TelnetPiece {
        wire: vec![IAC, cmd],
        data: Vec::new(),
    })
}

/// Telnet stream pieces
pub fn arb_telnet_stream() -> impl Strategy<Value = Vec<TelnetPiece>> {
    prop::collection::vec(
        prop_oneof![
            4 => arb_plain(),
            2 => arb_negotiation(),
            1 => arb_subnegotiation(),
            1 => arb_escaped_iac(),
            1 => arb_simple_command(),
        ],
        0..16,
    )
}

/// Split points for re-chunking a byte stream
pub fn arb_chunk_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..17, 1..32)
}

/// Cut `data` into chunks of the given sizes, cycling through them
pub fn rechunk<'a>(data: &'a [u8], sizes: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    let mut i = 0;
    while offset < data.len() {
        let n = sizes[i % sizes.len()].min(data.len() - offset);
        chunks.push(&data[offset..offset + n]);
        offset += n;
        i += 1;
    }
    chunks
}
