//! Test utilities for building synthetic sensor data
//!
//! Shared by unit tests, integration tests and benchmarks so every suite encodes
//! packets exactly the way the sensor does.

#![cfg(any(test, feature = "benchmark"))]

use crate::sensor::layout::{BLOCK_SIZE, BLOCKS_PER_PACKET, CHANNEL_SIZE, CHANNELS_PER_BLOCK, DISTANCE_RESOLUTION_M};
use crate::types::{PACKET_SIZE, RawPacket};

/// Block flag the sensor writes at the start of every block.
const BLOCK_FLAG: u16 = 0xEEFF;

/// Builds a sensor packet from per-block azimuths and per-channel distances.
///
/// ```rust,ignore
/// let packet = PacketBuilder::new().azimuth(90.0).distance(10.0).build();
/// ```
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    azimuths: [f32; BLOCKS_PER_PACKET],
    distances: [[f32; CHANNELS_PER_BLOCK]; BLOCKS_PER_PACKET],
    timestamp_us: u32,
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self {
            azimuths: [0.0; BLOCKS_PER_PACKET],
            distances: [[0.0; CHANNELS_PER_BLOCK]; BLOCKS_PER_PACKET],
            timestamp_us: 0,
        }
    }
}

impl PacketBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same azimuth (degrees) on every block
    pub fn azimuth(mut self, degrees: f32) -> Self {
        self.azimuths = [degrees; BLOCKS_PER_PACKET];
        self
    }

    /// Per-block azimuth in degrees
    pub fn block_azimuths(mut self, f: impl Fn(usize) -> f32) -> Self {
        for (block, azimuth) in self.azimuths.iter_mut().enumerate() {
            *azimuth = f(block);
        }
        self
    }

    /// Same distance (metres) on every channel
    pub fn distance(mut self, metres: f32) -> Self {
        self.distances = [[metres; CHANNELS_PER_BLOCK]; BLOCKS_PER_PACKET];
        self
    }

    /// Per-channel distance in metres, given `(block, channel)`
    pub fn channel_distances(mut self, f: impl Fn(usize, usize) -> f32) -> Self {
        for (block, channels) in self.distances.iter_mut().enumerate() {
            for (channel, distance) in channels.iter_mut().enumerate() {
                *distance = f(block, channel);
            }
        }
        self
    }

    /// Trailer timestamp in microseconds
    pub fn timestamp(mut self, timestamp_us: u32) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Encode the packet
    pub fn build(&self) -> RawPacket {
        let mut data = vec![0u8; PACKET_SIZE];
        for block in 0..BLOCKS_PER_PACKET {
            let base = block * BLOCK_SIZE;
            data[base..base + 2].copy_from_slice(&BLOCK_FLAG.to_le_bytes());
            let azimuth = (self.azimuths[block] * 100.0).round() as u16;
            data[base + 2..base + 4].copy_from_slice(&azimuth.to_le_bytes());

            for channel in 0..CHANNELS_PER_BLOCK {
                let offset = base + 4 + channel * CHANNEL_SIZE;
                let raw = (self.distances[block][channel] / DISTANCE_RESOLUTION_M).round() as u16;
                data[offset..offset + 2].copy_from_slice(&raw.to_le_bytes());
                data[offset + 2] = 100;
            }
        }
        let trailer = BLOCKS_PER_PACKET * BLOCK_SIZE;
        data[trailer..trailer + 4].copy_from_slice(&self.timestamp_us.to_le_bytes());
        data[trailer + 4] = 0x37;
        data[trailer + 5] = 0x22;

        match RawPacket::new(data) {
            Ok(packet) => packet,
            Err(e) => unreachable!("builder always produces {PACKET_SIZE} bytes: {e}"),
        }
    }
}

/// One packet per azimuth, every channel at `distance` metres.
pub fn sweep(azimuths: impl IntoIterator<Item = f32>, distance: f32) -> Vec<RawPacket> {
    azimuths.into_iter().map(|azimuth| PacketBuilder::new().azimuth(azimuth).distance(distance).build()).collect()
}

/// Concatenate packets into a capture file image.
pub fn capture(packets: &[RawPacket]) -> Vec<u8> {
    packets.iter().flat_map(|p| p.as_bytes().iter().copied()).collect()
}
