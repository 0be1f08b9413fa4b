//! Packet decoder: spherical readings to Cartesian points

use tracing::trace;

use super::layout::{BLOCKS_PER_PACKET, Block, CHANNELS_PER_BLOCK, POINTS_PER_PACKET, vertical_angle_deg};
use crate::types::{Point3D, RawPacket};

/// Points and boundary azimuth decoded from one packet.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    /// Azimuth of the last block in degrees, used for rotation detection
    pub azimuth_deg: f32,

    /// Points that survived the near-origin filter, in block/channel order
    pub points: Vec<Point3D>,
}

/// Converts raw packets into Cartesian points.
///
/// Azimuth is measured clockwise from the sensor's +Y axis and elevation from the
/// horizontal plane:
///
/// ```text
/// x = d · cos(ω) · sin(α)
/// y = d · cos(ω) · cos(α)
/// z = d · sin(ω)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketDecoder {
    filter_radius: f32,
}

impl PacketDecoder {
    /// Create a decoder; a `filter_radius` of 0 keeps every point.
    pub fn new(filter_radius: f32) -> Self {
        Self { filter_radius }
    }

    /// Near-origin filter radius in metres
    pub fn filter_radius(&self) -> f32 {
        self.filter_radius
    }

    /// Decode a packet into a fresh point buffer.
    pub fn decode(&self, packet: &RawPacket) -> DecodedPacket {
        let mut points = Vec::with_capacity(POINTS_PER_PACKET);
        let azimuth_deg = self.decode_into(packet, &mut points);
        DecodedPacket { azimuth_deg, points }
    }

    /// Append a packet's points to `out` and return the last block's azimuth.
    pub fn decode_into(&self, packet: &RawPacket, out: &mut Vec<Point3D>) -> f32 {
        let bytes = packet.as_bytes();
        let before = out.len();
        let mut azimuth_deg = 0.0;

        for index in 0..BLOCKS_PER_PACKET {
            let block = Block::at(bytes, index);
            azimuth_deg = block.azimuth_deg();
            let (sin_az, cos_az) = azimuth_deg.to_radians().sin_cos();

            for channel in 0..CHANNELS_PER_BLOCK {
                let distance = block.distance_m(channel);
                let (sin_el, cos_el) = vertical_angle_deg(channel).to_radians().sin_cos();

                let horizontal = distance * cos_el;
                let point = Point3D::new(horizontal * sin_az, horizontal * cos_az, distance * sin_el);
                if self.keeps(&point) {
                    out.push(point);
                }
            }
        }

        trace!(azimuth = azimuth_deg, points = out.len() - before, "Decoded packet");
        azimuth_deg
    }

    /// A point is kept unless it lies within the radius on every axis.
    fn keeps(&self, point: &Point3D) -> bool {
        let r = self.filter_radius;
        r == 0.0 || point.x.abs() > r || point.y.abs() > r || point.z.abs() > r
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new(0.0)
    }
}
