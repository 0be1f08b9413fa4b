//! Frame type and point-record serialization

use super::Point3D;
use crate::{DispatchError, Result};

/// Size of one serialized point: three little-endian `f32`.
pub const POINT_RECORD_SIZE: usize = 12;

/// Points reconstructed from one full sensor rotation.
///
/// Point order is append order only; consumers treat a frame as an unordered set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Local frame counter, not transmitted on the wire
    pub sequence: u64,

    /// Points in append order
    pub points: Vec<Point3D>,
}

impl Frame {
    /// Create a new frame
    pub fn new(sequence: u64, points: Vec<Point3D>) -> Self {
        Self { sequence, points }
    }

    /// Number of points in the frame
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the frame holds no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Encode the points as back-to-back 12-byte records
    pub fn serialize(&self) -> Vec<u8> {
        serialize_points(&self.points)
    }

    /// Decode a frame from a serialized point buffer
    pub fn deserialize(sequence: u64, data: &[u8]) -> Result<Self> {
        Ok(Self { sequence, points: deserialize_points(data)? })
    }
}

/// Serialize points into `12 * points.len()` bytes.
pub fn serialize_points(points: &[Point3D]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(points.len() * POINT_RECORD_SIZE);
    for point in points {
        buf.extend_from_slice(&point.to_le_bytes());
    }
    buf
}

/// Deserialize a point buffer; the length must be a multiple of 12.
pub fn deserialize_points(data: &[u8]) -> Result<Vec<Point3D>> {
    if data.len() % POINT_RECORD_SIZE != 0 {
        return Err(DispatchError::FrameLength { len: data.len() });
    }
    Ok(point_records(data).collect())
}

/// Iterate whole records, ignoring any trailing partial record.
pub(crate) fn point_records(data: &[u8]) -> impl Iterator<Item = Point3D> + '_ {
    data.chunks_exact(POINT_RECORD_SIZE).map(|chunk| {
        let mut record = [0u8; POINT_RECORD_SIZE];
        record.copy_from_slice(chunk);
        Point3D::from_le_bytes(record)
    })
}
