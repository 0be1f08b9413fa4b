//! Core types for point-cloud data representation.
//!
//! - [`RawPacket`] is one fixed-size sensor datagram, validated on construction
//! - [`Point3D`] is a sensor-centred Cartesian point
//! - [`Frame`] is the ordered set of points from one full sensor rotation
//! - [`UpdateRate`] controls how fast a fan-out subscriber receives frames
//!
//! ## Serialized frames
//!
//! Frames travel through the codec chain as flat buffers of 12-byte records, three
//! little-endian `f32` per point, with no header. The point count is implied by
//! the buffer length:
//!
//! ```rust
//! use lidarcast::types::{Frame, Point3D};
//!
//! let frame = Frame::new(0, vec![Point3D::new(1.0, 2.0, 3.0), Point3D::new(-1.0, 0.5, 0.0)]);
//! let bytes = frame.serialize();
//! assert_eq!(bytes.len(), 24);
//!
//! let decoded = Frame::deserialize(0, &bytes).unwrap();
//! assert_eq!(decoded.points, frame.points);
//! assert!(Frame::deserialize(0, &bytes[..23]).is_err());
//! ```

mod frame;
mod packet;
mod point;
mod update_rate;

pub use frame::{Frame, POINT_RECORD_SIZE, deserialize_points, serialize_points};
pub(crate) use frame::point_records;
pub use packet::{PACKET_SIZE, RawPacket};
pub use point::Point3D;
pub use update_rate::UpdateRate;
