//! Live sensor ingestion over UDP

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::source::PacketSource;
use crate::types::{PACKET_SIZE, RawPacket};
use crate::{DispatchError, Result};

/// Receive buffer size; anything larger than a sensor packet is rejected anyway.
const RECV_BUFFER_SIZE: usize = 2048;

/// Reads sensor datagrams from a bound UDP socket.
///
/// Datagrams of any size other than [`PACKET_SIZE`] are counted and skipped.
#[derive(Debug)]
pub struct UdpPacketSource {
    socket: UdpSocket,
    buf: Vec<u8>,
    received: u64,
    rejected: u64,
}

impl UdpPacketSource {
    /// Bind the ingestion socket. Failure is fatal.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| DispatchError::Bind { addr: addr.to_string(), source })?;
        info!(listen = %addr, "Listening for sensor packets");
        Ok(Self { socket, buf: vec![0; RECV_BUFFER_SIZE], received: 0, rejected: 0 })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Datagrams skipped for having the wrong size
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[async_trait::async_trait]
impl PacketSource for UdpPacketSource {
    async fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        loop {
            let (len, from) = self.socket.recv_from(&mut self.buf).await?;
            self.received += 1;

            if len != PACKET_SIZE {
                self.rejected += 1;
                debug!(%from, len, received = self.received, rejected = self.rejected, "Skipping datagram with unexpected size");
                continue;
            }
            return RawPacket::copy_from_slice(&self.buf[..len]).map(Some);
        }
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) => format!("udp://{addr}"),
            Err(_) => "udp".to_string(),
        }
    }
}
