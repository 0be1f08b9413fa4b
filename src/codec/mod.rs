//! Compression codecs and the ordered codec pipeline.
//!
//! Every stage implements [`Codec`]. Stages are built from a closed set of
//! [`CodecSpec`] variants so the chain can be read from configuration and
//! validated once before any frame flows:
//!
//! ```rust
//! use lidarcast::codec::{CodecSpec, Pipeline};
//!
//! let pipeline = Pipeline::from_specs(&[
//!     CodecSpec::Voxel { voxel_size: 0.05 },
//!     CodecSpec::Gzip { level: 6 },
//! ])?;
//! assert_eq!(pipeline.stage_names(), vec!["voxel", "gzip"]);
//! # Ok::<(), lidarcast::DispatchError>(())
//! ```
//!
//! The chain is not described on the wire. Both ends must configure the same
//! stages in the same order; a mismatch shows up as a codec error (or silently
//! wrong points) on every frame.

mod gzip;
mod pipeline;
mod voxel;

pub use gzip::GzipCodec;
pub use pipeline::Pipeline;
pub use voxel::VoxelCodec;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// A single reversible (or deliberately lossy) byte transformation.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs and errors
    fn name(&self) -> &'static str;

    /// Transform a buffer on the send path
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Undo [`Codec::compress`] on the receive path
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Configuration form of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodecSpec {
    /// Lossy spatial downsampling to one centroid per grid cell
    Voxel {
        /// Cell edge length in metres
        voxel_size: f32,
    },

    /// Lossless gzip stream compression
    Gzip {
        /// Compression level, 0 (store) to 9 (best)
        #[serde(default = "default_gzip_level")]
        level: u32,
    },
}

fn default_gzip_level() -> u32 {
    6
}

impl CodecSpec {
    /// Validate parameters and build the codec.
    pub fn build(&self) -> Result<Box<dyn Codec>, CodecError> {
        match *self {
            CodecSpec::Voxel { voxel_size } => Ok(Box::new(VoxelCodec::new(voxel_size)?)),
            CodecSpec::Gzip { level } => Ok(Box::new(GzipCodec::new(level)?)),
        }
    }

    /// Codec name, matching [`Codec::name`] of the built stage
    pub fn name(&self) -> &'static str {
        match self {
            CodecSpec::Voxel { .. } => voxel::NAME,
            CodecSpec::Gzip { .. } => gzip::NAME,
        }
    }
}
