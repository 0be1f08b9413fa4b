//! Point-cloud streaming from a spinning lidar.
//!
//! lidarcast turns the raw UDP datagrams of a 16-channel spinning lidar into
//! complete rotations ("frames"), shrinks each frame through a configurable codec
//! chain, and ships it over an encrypted QUIC connection to a receiver that
//! reconstructs the points and fans them out to subscribers.
//!
//! # Architecture
//!
//! ```text
//! sender:   PacketSource → [packets] → FrameAssembler → Pipeline::compress → [payloads] → TransportSender
//!                                                                                              │ QUIC
//! receiver: TransportReceiver → [payloads] → Pipeline::decompress → [frames] → FrameHub → subscribers
//! ```
//!
//! Every `[queue]` is a bounded [stage queue](queue) that drops the newest item
//! when full, so a slow stage never stalls packet capture. Each stage runs in its
//! own task, spawned by the [`Driver`](driver::Driver) and wired together by a
//! [`SenderNode`](node::SenderNode) or [`ReceiverNode`](node::ReceiverNode).
//!
//! # Example (in-process pipeline)
//!
//! ```rust
//! use lidarcast::{FrameAssembler, PacketDecoder, Pipeline};
//! use lidarcast::codec::CodecSpec;
//! # use lidarcast::types::RawPacket;
//! # fn packets() -> Vec<RawPacket> { Vec::new() }
//!
//! # fn main() -> lidarcast::Result<()> {
//! let pipeline = Pipeline::from_specs(&[
//!     CodecSpec::Voxel { voxel_size: 0.05 },
//!     CodecSpec::Gzip { level: 6 },
//! ])?;
//! let mut assembler = FrameAssembler::new(PacketDecoder::new(0.5));
//!
//! for packet in packets() {
//!     if let Some(frame) = assembler.push(&packet) {
//!         let payload = pipeline.compress(&frame.serialize())?;
//!         println!("frame {} -> {} bytes", frame.sequence, payload.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Sensor side
pub mod assembler;
pub mod sensor;
pub mod source;
pub mod sources;

// Compression and transport
pub mod codec;
pub mod pool;
pub mod transport;

// Stage plumbing
pub mod config;
pub mod driver;
pub mod hub;
pub mod node;
pub mod queue;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

pub use assembler::FrameAssembler;
pub use codec::{Codec, CodecSpec, Pipeline};
pub use config::{ReceiverConfig, SenderConfig};
pub use hub::FrameHub;
pub use node::{ReceiverNode, SenderNode};
pub use sensor::PacketDecoder;
pub use source::PacketSource;
