// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hot-path benchmarks: the per-frame coding work the scheduler does
//! on every TDMA tick (4.615 ms budget for all eight timeslots).

use btrx::coding::{tch, ubit_to_sbit, xcch};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_xcch(c: &mut Criterion) {
    let l2 = [0x2bu8; 23];
    let mut bursts = [0u8; 4 * 116];
    c.bench_function("xcch_encode", |b| {
        b.iter(|| xcch::encode(black_box(&mut bursts), black_box(&l2)));
    });

    xcch::encode(&mut bursts, &l2);
    let soft: Vec<i8> = bursts.iter().map(|&b| ubit_to_sbit(b)).collect();
    c.bench_function("xcch_decode", |b| {
        b.iter(|| xcch::decode(black_box(&soft)));
    });
}

fn bench_tch_fr(c: &mut Criterion) {
    let mut frame = vec![0u8; tch::GSM_FR_BYTES];
    frame[0] = 0xd0;
    let mut bursts = [0u8; 8 * 116];
    c.bench_function("tch_fr_encode", |b| {
        b.iter(|| tch::tch_fr_encode(black_box(&mut bursts), black_box(&frame), true));
    });

    tch::tch_fr_encode(&mut bursts, &frame, true).unwrap();
    let soft: Vec<i8> = bursts.iter().map(|&b| ubit_to_sbit(b)).collect();
    c.bench_function("tch_fr_decode", |b| {
        b.iter(|| tch::tch_fr_decode(black_box(&soft), true, false));
    });
}

criterion_group!(benches, bench_xcch, bench_tch_fr);
criterion_main!(benches);
