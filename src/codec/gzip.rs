//! Gzip stream codec

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::CodecError;

use super::Codec;

pub(super) const NAME: &str = "gzip";

/// Default cap on the output of one decompression.
pub const DEFAULT_MAX_OUTPUT: usize = 64 * 1024 * 1024;

/// Lossless deflate compression in a gzip container.
///
/// Decompression stops with [`CodecError::OutputLimit`] once the inflated output
/// would exceed the configured cap, so a small payload cannot expand without bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipCodec {
    level: u32,
    max_output: usize,
}

impl GzipCodec {
    /// Create a codec at the given level (0..=9).
    pub fn new(level: u32) -> Result<Self, CodecError> {
        if level > 9 {
            return Err(CodecError::InvalidParameter {
                details: format!("gzip level must be 0..=9, got {level}"),
            });
        }
        Ok(Self { level, max_output: DEFAULT_MAX_OUTPUT })
    }

    /// Cap decompressed output at `max_output` bytes
    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    /// Compression level
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Largest output a single decompression may produce
    pub fn max_output(&self) -> usize {
        self.max_output
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: Compression::default().level(), max_output: DEFAULT_MAX_OUTPUT }
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(input.len() / 2), Compression::new(self.level));
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let limit = self.max_output;
        let mut decoder = GzDecoder::new(input).take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1));
        let mut out = Vec::with_capacity((input.len() * 4).min(limit));
        decoder.read_to_end(&mut out)?;
        if out.len() > limit {
            return Err(CodecError::OutputLimit { limit });
        }
        Ok(out)
    }
}
