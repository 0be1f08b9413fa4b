//! Shared fixtures for integration tests

#![allow(dead_code)]

use lidarcast::types::{PACKET_SIZE, RawPacket};

const BLOCKS: usize = 12;
const BLOCK_SIZE: usize = 100;
const CHANNELS: usize = 32;

/// Encode a sensor packet with every block at `azimuth` degrees and every
/// channel at `distance` metres.
pub fn packet(azimuth: f32, distance: f32) -> RawPacket {
    let mut data = vec![0u8; PACKET_SIZE];
    let azimuth = (azimuth * 100.0).round() as u16;
    let distance = (distance / 0.002).round() as u16;

    for block in data[..BLOCKS * BLOCK_SIZE].chunks_exact_mut(BLOCK_SIZE) {
        block[0..2].copy_from_slice(&0xEEFFu16.to_le_bytes());
        block[2..4].copy_from_slice(&azimuth.to_le_bytes());
        for channel in block[4..].chunks_exact_mut(3).take(CHANNELS) {
            channel[0..2].copy_from_slice(&distance.to_le_bytes());
            channel[2] = 100;
        }
    }
    RawPacket::new(data).unwrap()
}

/// One rotation of 12 packets at 0°, 30°, … 330°, offset by `start` degrees.
pub fn rotation(start: f32, distance: f32) -> Vec<RawPacket> {
    (0..12).map(|step| packet(start + step as f32 * 30.0, distance)).collect()
}

/// Two complete rotations followed by the first packet of a third.
///
/// The third packet's wraparound seals the second frame; its own points are
/// never completed.
pub fn two_rotations(distance: f32) -> Vec<RawPacket> {
    let mut packets = rotation(0.0, distance);
    packets.extend(rotation(5.0, distance));
    packets.push(packet(10.0, distance));
    packets
}

/// Points per packet when nothing is filtered
pub const POINTS_PER_PACKET: usize = BLOCKS * CHANNELS;

/// Initialise test logging once; honours RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
