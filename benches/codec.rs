//! Benchmarks for the class-file codec.
//!
//! Measures both decode modes on a synthetic unit with many routines, and the full
//! decode-encode cycle that a touched unit goes through.

extern crate classweave;

use classweave::unit::{
    decode, encode, opcodes::*, AccessFlags, ClassHierarchy, DecodeMode, EncodeOptions,
    SymbolPool, UnitBuilder,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

/// A unit with `routines` counting loops, each with its own frame layout.
fn synthetic_unit(routines: usize) -> Vec<u8> {
    let mut builder = UnitBuilder::new("bench/Synthetic");
    for index in 0..routines {
        builder = builder.routine(
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            &format!("loop{index}"),
            "(I)I",
            |code| {
                let head = code.label();
                let done = code.label();
                code.int(0)
                    .var(ISTORE, 1)
                    .place(head)
                    .var(ILOAD, 0)
                    .jump(IFLE, done)
                    .var(ILOAD, 1)
                    .var(ILOAD, 0)
                    .op(IADD)
                    .var(ISTORE, 1)
                    .iinc(0, -1)
                    .jump(GOTO, head)
                    .place(done)
                    .var(ILOAD, 1)
                    .op(IRETURN);
            },
        );
    }
    builder.bytes().unwrap()
}

fn bench_decode(c: &mut Criterion) {
    let bytes = synthetic_unit(200);
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    for (label, mode) in [("minimal", DecodeMode::Minimal), ("full", DecodeMode::Full)] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let symbols = SymbolPool::new();
                let unit = decode(black_box(&bytes), mode, &symbols).unwrap();
                black_box(unit)
            });
        });
    }
    group.finish();
}

fn bench_reencode(c: &mut Criterion) {
    let bytes = synthetic_unit(200);
    let hierarchy = ClassHierarchy::default();
    let options = EncodeOptions::default();
    let mut group = c.benchmark_group("reencode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    for (label, mode) in [("minimal", DecodeMode::Minimal), ("full", DecodeMode::Full)] {
        let symbols = SymbolPool::new();
        let unit = decode(&bytes, mode, &symbols).unwrap();
        group.bench_function(label, |b| {
            b.iter(|| black_box(encode(black_box(&unit), &options, &hierarchy).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_reencode);
criterion_main!(benches);
