//! Benchmarks for delta creation and application.

extern crate classweave;

use classweave::delta::{apply_delta, create_delta};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

/// Deterministic pseudo-random bytes, so runs compare.
fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (state >> 56) as u8
        })
        .collect()
}

/// `original` with a few spliced edits, similar to a hook added to one routine.
fn edited(original: &[u8]) -> Vec<u8> {
    let mut modified = original.to_vec();
    let middle = modified.len() / 2;
    modified.splice(middle..middle, noise(48, 7));
    let quarter = modified.len() / 4;
    modified[quarter..quarter + 16].copy_from_slice(&noise(16, 11));
    modified.extend_from_slice(&noise(96, 13));
    modified
}

fn bench_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta");
    for size in [4 * 1024, 64 * 1024, 512 * 1024] {
        let original = noise(size, 3);
        let modified = edited(&original);
        let delta = create_delta(&original, &modified);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("create", size), &size, |b, _| {
            b.iter(|| black_box(create_delta(black_box(&original), black_box(&modified))));
        });
        group.bench_with_input(BenchmarkId::new("apply", size), &size, |b, _| {
            b.iter(|| black_box(apply_delta(black_box(&original), black_box(&delta)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_delta);
criterion_main!(benches);
