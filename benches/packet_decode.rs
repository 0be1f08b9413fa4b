//! Benchmarks for packet decoding and frame assembly
//!
//! The sensor emits ~754 packets per second; decoding must stay far below the
//! 1.33ms inter-packet gap so the ingest queue never backs up.

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use lidarcast::sensor::layout::POINTS_PER_PACKET;
use lidarcast::test_utils::{PacketBuilder, sweep};
use lidarcast::types::PACKET_SIZE;
use lidarcast::{FrameAssembler, PacketDecoder};
use std::hint::black_box;

fn bench_decode(c: &mut Criterion) {
    let packet = PacketBuilder::new()
        .block_azimuths(|block| 90.0 + block as f32 * 0.2)
        .channel_distances(|block, channel| 2.0 + (block * 32 + channel) as f32 * 0.05)
        .build();

    let mut group = c.benchmark_group("packet_decode");
    group.throughput(Throughput::Bytes(PACKET_SIZE as u64));

    for radius in [0.0f32, 0.5, 5.0] {
        let decoder = PacketDecoder::new(radius);
        group.bench_function(format!("decode_into_radius_{radius}"), |b| {
            let mut points = Vec::with_capacity(POINTS_PER_PACKET);
            b.iter(|| {
                points.clear();
                black_box(decoder.decode_into(black_box(&packet), &mut points))
            })
        });
    }

    group.finish();
}

fn bench_assembly(c: &mut Criterion) {
    // ~754 packets make up one rotation at 600 RPM
    let azimuths: Vec<f32> = (0..754).map(|i| i as f32 * 360.0 / 754.0).chain([0.1]).collect();
    let packets = sweep(azimuths, 12.0);

    let mut group = c.benchmark_group("frame_assembly");
    group.throughput(Throughput::Elements(packets.len() as u64));

    group.bench_function("one_rotation", |b| {
        b.iter_batched(
            || FrameAssembler::new(PacketDecoder::new(0.5)),
            |mut assembler| {
                let mut sealed = None;
                for packet in &packets {
                    if let Some(frame) = assembler.push(packet) {
                        sealed = Some(frame);
                    }
                }
                black_box(sealed)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_assembly);
criterion_main!(benches);
