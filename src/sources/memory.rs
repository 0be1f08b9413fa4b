//! In-memory packet source

use std::collections::VecDeque;

use crate::Result;
use crate::source::PacketSource;
use crate::types::RawPacket;

/// Yields a fixed list of packets without pacing, then ends.
#[derive(Debug, Default)]
pub struct MemoryPacketSource {
    packets: VecDeque<RawPacket>,
}

impl MemoryPacketSource {
    pub fn new(packets: impl IntoIterator<Item = RawPacket>) -> Self {
        Self { packets: packets.into_iter().collect() }
    }

    /// Packets not yet yielded
    pub fn remaining(&self) -> usize {
        self.packets.len()
    }
}

#[async_trait::async_trait]
impl PacketSource for MemoryPacketSource {
    async fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        Ok(self.packets.pop_front())
    }

    fn describe(&self) -> String {
        format!("memory ({} packets)", self.packets.len())
    }
}
