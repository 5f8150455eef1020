// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Packet codec benchmarks.
//
// Run with:
//   cargo bench --bench codec
//
// Groups:
//   encode — Packet::encode, CRC included
//   decode — Packet::decode, CRC verify + parse

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rdt_link::packet::{Packet, ServiceCode};

fn bench_encode(c: &mut Criterion) {
    let packet = Packet::with_payload(2, 3, ServiceCode::Data, &[0xABu8; 64]);
    c.bench_function("encode", |b| {
        b.iter(|| black_box(packet.encode()));
    });
}

fn bench_decode(c: &mut Criterion) {
    let packet = Packet::with_payload(2, 3, ServiceCode::Data, &[0xABu8; 64]);
    let bytes = packet.encode();
    c.bench_function("decode", |b| {
        b.iter(|| black_box(Packet::decode(&bytes)));
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
