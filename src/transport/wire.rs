//! Length-prefixed message framing
//!
//! ```text
//! +----------------+---------------------+
//! | length (u32 BE)| payload (length B)  |
//! +----------------+---------------------+
//! ```
//!
//! No header, tag or checksum follows the prefix. A stream may carry one message
//! (what [`TransportSender`](super::TransportSender) does) or several back to back.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::pool::BufferPool;
use crate::{DispatchError, Result};

/// Size of the length prefix in bytes.
pub const PREFIX_SIZE: usize = 4;

/// Default receive-side cap on a single message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Default size of each write on the send path.
pub const DEFAULT_WRITE_CHUNK: usize = 16 * 1024;

/// Default size of each read on the receive path.
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// Default capacity of staging and accumulation buffers.
pub const DEFAULT_STAGING_CAPACITY: usize = 256 * 1024;

/// Encode a payload as one message (`payload.len() + 4` bytes).
pub fn encode_message(payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(PREFIX_SIZE + payload.len());
    out.extend_from_slice(&prefix(payload.len())?);
    out.extend_from_slice(payload);
    Ok(out)
}

fn prefix(len: usize) -> Result<[u8; PREFIX_SIZE]> {
    let len32 = u32::try_from(len)
        .map_err(|_| DispatchError::Oversized { len, max: u32::MAX as usize })?;
    Ok(len32.to_be_bytes())
}

/// Writes messages in bounded chunks through a staging pool.
#[derive(Debug, Clone)]
pub struct MessageWriter {
    staging: BufferPool,
    chunk_size: usize,
}

impl MessageWriter {
    /// Create a writer; `chunk_size` must be non-zero.
    pub fn new(staging: BufferPool, chunk_size: usize) -> Self {
        Self { staging, chunk_size: chunk_size.max(1) }
    }

    /// Staging pool, exposed for statistics
    pub fn pool(&self) -> &BufferPool {
        &self.staging
    }

    /// Write one message and flush.
    ///
    /// The staging buffer returns to the pool whether or not the write succeeds.
    pub async fn write<W>(&self, writer: &mut W, payload: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut staged = self.staging.acquire();
        staged.extend_from_slice(&prefix(payload.len())?);
        staged.extend_from_slice(payload);

        for chunk in staged.chunks(self.chunk_size) {
            let mut written = 0;
            while written < chunk.len() {
                let n = writer.write(&chunk[written..]).await?;
                if n == 0 {
                    return Err(DispatchError::stream_error(format!(
                        "Stream accepted no bytes with {} of {} remaining",
                        chunk.len() - written,
                        staged.len()
                    )));
                }
                written += n;
            }
            trace!(bytes = chunk.len(), "Wrote chunk");
        }

        writer.flush().await?;
        Ok(())
    }
}

/// Reads messages through pooled read and accumulation buffers.
#[derive(Debug, Clone)]
pub struct MessageReader {
    chunks: BufferPool,
    accumulators: BufferPool,
    max_message_size: usize,
}

impl MessageReader {
    /// Create a reader that rejects messages larger than `max_message_size`
    pub fn new(chunks: BufferPool, accumulators: BufferPool, max_message_size: usize) -> Self {
        Self { chunks, accumulators, max_message_size }
    }

    /// Read pool, exposed for statistics
    pub fn chunk_pool(&self) -> &BufferPool {
        &self.chunks
    }

    /// Accumulation pool, exposed for statistics
    pub fn accumulator_pool(&self) -> &BufferPool {
        &self.accumulators
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before a new prefix. A stream
    /// that ends inside a prefix or payload yields [`DispatchError::Truncated`]; the
    /// partial message is discarded. Memory held for a message grows with the bytes
    /// received, so a stalled stream costs no more than what it actually sent. The returned bytes are a fresh copy, never a
    /// pooled buffer.
    pub async fn read<R>(&self, reader: &mut R) -> Result<Option<Bytes>>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = [0u8; PREFIX_SIZE];
        let mut filled = 0;
        while filled < PREFIX_SIZE {
            let n = reader.read(&mut prefix[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(DispatchError::Truncated { expected: PREFIX_SIZE, received: filled });
            }
            filled += n;
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_message_size {
            return Err(DispatchError::Oversized { len, max: self.max_message_size });
        }

        // Capacity follows the bytes that arrive, not the untrusted prefix
        let mut chunk = self.chunks.acquire();
        let mut payload = self.accumulators.acquire();

        while payload.len() < len {
            let want = chunk.len().min(len - payload.len());
            let n = reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(DispatchError::Truncated { expected: len, received: payload.len() });
            }
            payload.extend_from_slice(&chunk[..n]);
        }

        trace!(bytes = len, "Read message");
        Ok(Some(Bytes::copy_from_slice(&payload)))
    }
}
