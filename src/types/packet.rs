//! Raw sensor datagram

use bytes::Bytes;

use crate::{DispatchError, Result};

/// Size of one sensor datagram payload (UDP header excluded).
pub const PACKET_SIZE: usize = 1206;

/// Offset of the 4-byte timestamp in the trailer after the twelve firing blocks.
const TIMESTAMP_OFFSET: usize = 1200;

/// One fixed-size sensor datagram.
///
/// The length is checked on construction, so every `RawPacket` the decoder sees
/// is exactly [`PACKET_SIZE`] bytes. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    data: Bytes,
}

impl RawPacket {
    /// Wrap a datagram, rejecting any other size.
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() != PACKET_SIZE {
            return Err(DispatchError::PacketSize { expected: PACKET_SIZE, actual: data.len() });
        }
        Ok(Self { data })
    }

    /// Copy a received datagram out of a reusable socket buffer.
    pub fn copy_from_slice(data: &[u8]) -> Result<Self> {
        if data.len() != PACKET_SIZE {
            return Err(DispatchError::PacketSize { expected: PACKET_SIZE, actual: data.len() });
        }
        Ok(Self { data: Bytes::copy_from_slice(data) })
    }

    /// Raw bytes of the datagram
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Sensor timestamp from the packet trailer, microseconds past the hour.
    pub fn timestamp_us(&self) -> u32 {
        let t = &self.data[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4];
        u32::from_le_bytes([t[0], t[1], t[2], t[3]])
    }
}

impl AsRef<[u8]> for RawPacket {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl TryFrom<Vec<u8>> for RawPacket {
    type Error = DispatchError;

    fn try_from(data: Vec<u8>) -> Result<Self> {
        Self::new(data)
    }
}
