//! Packet source implementations

mod memory;
mod replay;
mod udp;

pub use memory::MemoryPacketSource;
pub use replay::{ReplayPacketSource, SENSOR_PACKET_INTERVAL};
pub use udp::UdpPacketSource;
