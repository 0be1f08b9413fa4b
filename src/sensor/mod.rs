//! Sensor wire format decoding.
//!
//! Only the fixed 16-emitter, 12-block, 1206-byte packet geometry is supported.

mod decoder;
pub mod layout;

pub use decoder::{DecodedPacket, PacketDecoder};
