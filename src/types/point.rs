//! Cartesian point type

use serde::{Deserialize, Serialize};

/// A point in sensor-centred Cartesian space, in metres.
///
/// Serializes as a `[x, y, z]` triple so fan-out layers can emit compact JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    /// Create a new point
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Encode as a 12-byte little-endian record
    pub fn to_le_bytes(self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.y.to_le_bytes());
        out[8..12].copy_from_slice(&self.z.to_le_bytes());
        out
    }

    /// Decode from a 12-byte little-endian record
    pub fn from_le_bytes(record: [u8; 12]) -> Self {
        Self {
            x: f32::from_le_bytes([record[0], record[1], record[2], record[3]]),
            y: f32::from_le_bytes([record[4], record[5], record[6], record[7]]),
            z: f32::from_le_bytes([record[8], record[9], record[10], record[11]]),
        }
    }
}

impl From<[f32; 3]> for Point3D {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Point3D> for [f32; 3] {
    fn from(p: Point3D) -> Self {
        [p.x, p.y, p.z]
    }
}
