//! Frame assembly from decoded packets
//!
//! The sensor does not mark rotation boundaries. A rotation is considered complete
//! when a packet's azimuth is strictly less than the previous packet's, i.e. the
//! azimuth wrapped from ~360° back to ~0°. A corrupt azimuth can therefore split a
//! rotation early or merge two rotations; no sanity check is applied.

use tracing::{debug, trace};

use crate::sensor::PacketDecoder;
use crate::types::{Frame, Point3D, RawPacket};

/// Initial accumulator capacity, roughly one rotation at the sensor's native rate.
pub const FRAME_CAPACITY: usize = 40_000;

/// Accumulates decoded points and seals a [`Frame`] on every azimuth wraparound.
#[derive(Debug)]
pub struct FrameAssembler {
    decoder: PacketDecoder,
    points: Vec<Point3D>,
    previous_azimuth: Option<f32>,
    next_sequence: u64,
}

impl FrameAssembler {
    /// Create an assembler around a configured decoder
    pub fn new(decoder: PacketDecoder) -> Self {
        Self {
            decoder,
            points: Vec::with_capacity(FRAME_CAPACITY),
            previous_azimuth: None,
            next_sequence: 0,
        }
    }

    /// Feed one packet; returns the sealed frame if this packet started a new rotation.
    ///
    /// The packet's own points always land in the fresh accumulator after sealing.
    pub fn push(&mut self, packet: &RawPacket) -> Option<Frame> {
        let mut sealed = None;

        // Decode into a scratch buffer first: the azimuth decides where the points go.
        let decoded = self.decoder.decode(packet);
        let azimuth = decoded.azimuth_deg;

        if self.previous_azimuth.is_some_and(|previous| azimuth < previous) {
            trace!(previous = self.previous_azimuth, azimuth, "Azimuth wrapped");
            sealed = self.seal();
        }

        self.points.extend_from_slice(&decoded.points);
        self.previous_azimuth = Some(azimuth);
        sealed
    }

    /// Points accumulated for the frame in progress
    pub fn pending_points(&self) -> usize {
        self.points.len()
    }

    /// Number of frames sealed so far
    pub fn frames_sealed(&self) -> u64 {
        self.next_sequence
    }

    fn seal(&mut self) -> Option<Frame> {
        if self.points.is_empty() {
            return None;
        }

        let points = std::mem::replace(&mut self.points, Vec::with_capacity(FRAME_CAPACITY));
        let frame = Frame::new(self.next_sequence, points);
        self.next_sequence += 1;
        debug!(sequence = frame.sequence, points = frame.len(), "Frame sealed");
        Some(frame)
    }
}
