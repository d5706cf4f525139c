//! Property tests for the adaptive double buffer and its watermarks

use proptest::prelude::*;

use modembridge_core::buffer::watermark::WatermarkThresholds;
use modembridge_core::{AdaptiveBuffer, WatermarkLevel};

#[derive(Debug, Clone)]
enum Op {
    Write(usize),
    Read(usize),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            (1usize..900).prop_map(Op::Write),
            (1usize..900).prop_map(Op::Read),
        ],
        1..64,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    /// Property: classification never drops when more bytes are used
    #[test]
    fn watermark_is_monotonic(capacity in 64usize..40_000, a in 0usize..40_000, b in 0usize..40_000) {
        let thresholds = WatermarkThresholds::for_capacity(capacity);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(thresholds.classify(lo) <= thresholds.classify(hi));
    }

    /// Property: bytes come out in write order and none are lost silently
    ///
    /// Everything written is either read back in order, still buffered, or
    /// counted as dropped.
    #[test]
    fn buffer_preserves_order(ops in arb_ops(), size in 1024usize..4096) {
        let mut buffer = AdaptiveBuffer::with_size(size).unwrap();
        let mut next = 0u32;
        let mut accepted = Vec::new();
        let mut read_back = Vec::new();
        let mut offered = 0u64;

        for (t, op) in ops.iter().enumerate() {
            let now = t as u64;
            match *op {
                Op::Write(n) => {
                    let data: Vec<u8> = (0..n).map(|i| ((next as usize + i) % 251) as u8).collect();
                    next = next.wrapping_add(n as u32);
                    offered += n as u64;
                    let written = buffer.write(&data, now);
                    prop_assert!(written <= n);
                    accepted.extend_from_slice(&data[..written]);
                }
                Op::Read(n) => {
                    let mut out = vec![0u8; n];
                    let got = buffer.read(&mut out, now);
                    read_back.extend_from_slice(&out[..got]);
                }
            }
            prop_assert!(buffer.available() <= buffer.capacity());
        }

        prop_assert_eq!(&accepted[..read_back.len()], &read_back[..]);
        prop_assert_eq!(accepted.len() - read_back.len(), buffer.available());

        let stats = buffer.stats();
        prop_assert_eq!(stats.bytes_written + stats.bytes_dropped, offered);
    }

    /// Property: backpressure engages at High and only releases at Low or below
    #[test]
    fn backpressure_hysteresis(ops in arb_ops()) {
        let mut buffer = AdaptiveBuffer::with_size(1024).unwrap();
        let mut was_active = false;

        for (t, op) in ops.iter().enumerate() {
            let now = t as u64;
            match *op {
                Op::Write(n) => {
                    let written = buffer.write(&vec![0x55; n], now);
                    if was_active {
                        prop_assert_eq!(written, 0);
                    }
                }
                Op::Read(n) => {
                    let mut out = vec![0u8; n];
                    buffer.read(&mut out, now);
                }
            }

            let level = buffer.level();
            let active = buffer.is_backpressure_active();
            if level >= WatermarkLevel::High {
                prop_assert!(active, "not engaged at {:?}", level);
            }
            if was_active && !active {
                prop_assert!(level <= WatermarkLevel::Low, "released at {:?}", level);
            }
            was_active = active;
        }
    }
}

#[test]
fn test_high_watermark_blocks_writes() {
    // 2048-byte regions hold 4096 bytes in total
    let mut buffer = AdaptiveBuffer::with_size(2048).unwrap();
    assert_eq!(buffer.capacity(), 4096);

    assert_eq!(buffer.write(&vec![7u8; 3900], 0), 3900);
    assert!(buffer.level() >= WatermarkLevel::High);
    assert!(buffer.is_backpressure_active());

    let overflows = buffer.stats().overflow_events;
    assert_eq!(buffer.write(&[8u8; 50], 1), 0);
    assert_eq!(buffer.stats().overflow_events, overflows + 1);
}

#[test]
fn test_read_from_empty_counts_underflow() {
    let mut buffer = AdaptiveBuffer::with_size(1024).unwrap();
    let mut out = [0u8; 16];

    assert_eq!(buffer.read(&mut out, 0), 0);
    assert_eq!(buffer.stats().underflow_events, 1);
    assert_eq!(buffer.level(), WatermarkLevel::Empty);
}
