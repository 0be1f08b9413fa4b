//! Packet source trait for sensor ingestion

use crate::Result;
use crate::types::RawPacket;

/// Trait for sensor packet sources
///
/// Sources abstract over where datagrams come from (a live UDP socket, a capture
/// file, a test fixture) and handle their own timing internally. Every packet a
/// source yields is already size-checked.
#[async_trait::async_trait]
pub trait PacketSource: Send + 'static {
    /// Get the next sensor packet
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - New packet available
    /// - `Ok(None)` - Source exhausted (normal termination)
    /// - `Err(e)` - Error occurred; the caller decides whether to keep polling
    async fn next_packet(&mut self) -> Result<Option<RawPacket>>;

    /// Short label for logs
    fn describe(&self) -> String;
}

#[async_trait::async_trait]
impl PacketSource for Box<dyn PacketSource> {
    async fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        (**self).next_packet().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
