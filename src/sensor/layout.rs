//! Sensor packet layout
//!
//! A 16-channel spinning lidar sends one 1206-byte UDP payload per firing cycle:
//!
//! ```text
//! offset  size  field
//! 0       100   block 0
//! 100     100   block 1
//! ...
//! 1100    100   block 11
//! 1200    4     timestamp (u32 LE, microseconds past the hour)
//! 1204    2     factory bytes (return mode, product id)
//! ```
//!
//! Each 100-byte block:
//!
//! ```text
//! offset  size  field
//! 0       2     flag (0xFFEE, ignored)
//! 2       2     azimuth (u16 LE, hundredths of a degree)
//! 4       96    32 channel readings of 3 bytes each
//! ```
//!
//! Each channel reading is a `u16` LE distance in 2 mm units followed by one
//! reflectivity byte (ignored). The 16 physical emitters fire twice per block, so
//! channel `n` uses the vertical angle of emitter `n % 16`.

/// Number of firing blocks in a packet.
pub const BLOCKS_PER_PACKET: usize = 12;

/// Size of one firing block in bytes.
pub const BLOCK_SIZE: usize = 100;

/// Channel readings per block (two firing sequences of 16 emitters).
pub const CHANNELS_PER_BLOCK: usize = 32;

/// Bytes per channel reading.
pub const CHANNEL_SIZE: usize = 3;

/// Offset of the azimuth within a block.
const AZIMUTH_OFFSET: usize = 2;

/// Offset of the first channel reading within a block.
const CHANNELS_OFFSET: usize = 4;

/// Metres per distance unit.
pub const DISTANCE_RESOLUTION_M: f32 = 0.002;

/// Vertical firing angle of each emitter in degrees, in firing order.
pub const VERTICAL_ANGLES_DEG: [f32; 16] =
    [-15.0, 1.0, -13.0, 3.0, -11.0, 5.0, -9.0, 7.0, -7.0, 9.0, -5.0, 11.0, -3.0, 13.0, -1.0, 15.0];

/// Maximum number of points one packet can produce.
pub const POINTS_PER_PACKET: usize = BLOCKS_PER_PACKET * CHANNELS_PER_BLOCK;

/// Vertical angle for a channel index within a block.
pub fn vertical_angle_deg(channel: usize) -> f32 {
    VERTICAL_ANGLES_DEG[channel % VERTICAL_ANGLES_DEG.len()]
}

/// Borrowed view of one firing block.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    bytes: &'a [u8],
}

impl<'a> Block<'a> {
    /// View block `index` of a full-size packet.
    ///
    /// Callers guarantee `packet` is at least `BLOCKS_PER_PACKET * BLOCK_SIZE` bytes.
    pub fn at(packet: &'a [u8], index: usize) -> Self {
        let start = index * BLOCK_SIZE;
        Self { bytes: &packet[start..start + BLOCK_SIZE] }
    }

    /// Azimuth in degrees.
    pub fn azimuth_deg(&self) -> f32 {
        let raw = u16::from_le_bytes([self.bytes[AZIMUTH_OFFSET], self.bytes[AZIMUTH_OFFSET + 1]]);
        raw as f32 / 100.0
    }

    /// Distance reading of a channel in metres.
    pub fn distance_m(&self, channel: usize) -> f32 {
        let offset = CHANNELS_OFFSET + channel * CHANNEL_SIZE;
        let raw = u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]]);
        raw as f32 * DISTANCE_RESOLUTION_M
    }
}
