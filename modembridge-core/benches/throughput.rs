//! Throughput benchmarks for the per-byte hot paths
//!
//! Measures the two stream filters and the adaptive buffer, the parts that
//! touch every byte crossing the bridge.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use modembridge_core::filter::{HayesFilter, TelnetFilter};
use modembridge_core::{AdaptiveBuffer, FilterConfig};

/// Terminal traffic with an embedded command line every few lines
fn terminal_traffic(len: usize) -> Vec<u8> {
    let pattern: &[u8] = b"The quick brown fox jumps over the lazy dog\r\nATH0\r\nline two\r\n";
    pattern.iter().copied().cycle().take(len).collect()
}

/// Telnet traffic with a negotiation every 64 bytes
fn telnet_traffic(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        data.extend(std::iter::repeat(b'x').take(61));
        data.extend_from_slice(&[0xFF, 0xFB, 0x01]);
    }
    data.truncate(len);
    data
}

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");

    for size in [64usize, 512, 4096] {
        group.throughput(Throughput::Bytes(size as u64));

        let terminal = terminal_traffic(size);
        group.bench_with_input(BenchmarkId::new("hayes_online", size), &terminal, |b, input| {
            let mut filter = HayesFilter::new(&FilterConfig::default());
            filter.set_online(true);
            let mut out = Vec::with_capacity(size);
            b.iter(|| {
                out.clear();
                filter.process(black_box(input), 0, &mut out);
                black_box(out.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("hayes_command", size), &terminal, |b, input| {
            let mut filter = HayesFilter::new(&FilterConfig::default());
            let mut out = Vec::with_capacity(size);
            b.iter(|| {
                out.clear();
                filter.process(black_box(input), 0, &mut out);
                black_box(out.len())
            });
        });

        let telnet = telnet_traffic(size);
        group.bench_with_input(BenchmarkId::new("telnet", size), &telnet, |b, input| {
            let mut filter = TelnetFilter::new();
            let mut out = Vec::with_capacity(size);
            b.iter(|| {
                out.clear();
                filter.process(black_box(input), &mut out);
                black_box(out.len())
            });
        });
    }

    group.finish();
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_buffer");

    for chunk in [16usize, 256, 1024] {
        group.throughput(Throughput::Bytes(chunk as u64));
        let data = vec![0x42u8; chunk];

        group.bench_with_input(BenchmarkId::new("write_read", chunk), &data, |b, data| {
            let mut buffer = AdaptiveBuffer::with_size(4096).unwrap();
            let mut out = vec![0u8; chunk];
            b.iter(|| {
                let written = buffer.write(black_box(data), 0);
                let read = buffer.read(&mut out, 0);
                black_box((written, read))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_filters, bench_buffer);
criterion_main!(benches);
