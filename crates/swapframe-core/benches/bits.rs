//! Compares the hardware bit-scan path against the portable fallback.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use swapframe_core::bits::{bit_ffs32, bit_fls32, portable};

fn words() -> Vec<u32> {
    let mut state = 0x2545_f491_u32;
    (0..4096)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        })
        .collect()
}

fn bench_scans(c: &mut Criterion) {
    let words = words();

    let mut group = c.benchmark_group("bit_scan");
    group.bench_function("ffs32/hardware", |b| {
        b.iter(|| words.iter().map(|&w| bit_ffs32(black_box(w))).fold(0, u32::wrapping_add));
    });
    group.bench_function("ffs32/portable", |b| {
        b.iter(|| words.iter().map(|&w| portable::ffs32(black_box(w))).fold(0, u32::wrapping_add));
    });
    group.bench_function("fls32/hardware", |b| {
        b.iter(|| words.iter().map(|&w| bit_fls32(black_box(w))).fold(0, u32::wrapping_add));
    });
    group.bench_function("fls32/portable", |b| {
        b.iter(|| words.iter().map(|&w| portable::fls32(black_box(w))).fold(0, u32::wrapping_add));
    });
    group.finish();
}

criterion_group!(benches, bench_scans);
criterion_main!(benches);
