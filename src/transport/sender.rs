//! QUIC transport sender

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use quinn::{Connection, Endpoint};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::tls::{ClientTrust, client_config, transport_config};
use super::wire::{DEFAULT_STAGING_CAPACITY, DEFAULT_WRITE_CHUNK, MessageWriter};
use crate::pool::BufferPool;
use crate::queue::StageReceiver;
use crate::{DispatchError, Result};

/// Upper bound on waiting for in-flight streams to be acknowledged at close.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Sender connection settings
#[derive(Debug, Clone)]
pub struct SenderOptions {
    /// TLS server name to verify against
    pub server_name: String,
    pub trust: ClientTrust,
    pub connect_timeout: Duration,
    pub open_timeout: Duration,
    pub keep_alive: Option<Duration>,
    pub idle_timeout: Duration,
    pub write_chunk: usize,
    pub staging_capacity: usize,
}

impl SenderOptions {
    /// Defaults around the given trust mode
    pub fn new(trust: ClientTrust) -> Self {
        Self {
            server_name: "localhost".to_string(),
            trust,
            connect_timeout: Duration::from_secs(5),
            open_timeout: Duration::from_secs(5),
            keep_alive: Some(Duration::from_secs(1)),
            idle_timeout: Duration::from_secs(600),
            write_chunk: DEFAULT_WRITE_CHUNK,
            staging_capacity: DEFAULT_STAGING_CAPACITY,
        }
    }
}

/// Counters reported when the send loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSummary {
    pub sent: u64,
    pub failed: u64,
}

/// One long-lived connection carrying one unidirectional stream per message.
///
/// There is no reconnection: losing the connection ends [`TransportSender::run`]
/// with a fatal error and the process is expected to be restarted.
#[derive(Debug)]
pub struct TransportSender {
    endpoint: Endpoint,
    connection: Connection,
    writer: MessageWriter,
    open_timeout: Duration,
    server: String,
    /// One task per finished stream, resolving once the peer has acknowledged it
    in_flight: TaskTracker,
}

impl TransportSender {
    /// Resolve `server` (`host:port`) and connect, bounded by the connect timeout.
    pub async fn connect(server: &str, options: SenderOptions) -> Result<Self> {
        let addr = resolve(server).await?;
        let transport = transport_config(options.keep_alive, options.idle_timeout)?;
        let config = client_config(&options.trust, transport)?;

        let local: SocketAddr = if addr.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let endpoint = Endpoint::client(local)
            .map_err(|source| DispatchError::Bind { addr: local.to_string(), source })?;

        let connecting = endpoint
            .connect_with(config, addr, &options.server_name)
            .map_err(|e| DispatchError::connect_failed_with_source(server, "Invalid connection parameters", e))?;

        let connection = match timeout(options.connect_timeout, connecting).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(DispatchError::connect_failed_with_source(server, "Handshake failed", e)),
            Err(_) => {
                return Err(DispatchError::connect_failed(
                    server,
                    format!("Timed out after {:?}", options.connect_timeout),
                ));
            }
        };

        info!(server, remote = %connection.remote_address(), "Connected");
        let writer = MessageWriter::new(BufferPool::staging(options.staging_capacity), options.write_chunk);
        Ok(Self {
            endpoint,
            connection,
            writer,
            open_timeout: options.open_timeout,
            server: server.to_string(),
            in_flight: TaskTracker::new(),
        })
    }

    /// Remote address of the connection
    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Message writer, exposed for pool statistics
    pub fn writer(&self) -> &MessageWriter {
        &self.writer
    }

    /// Send one payload on a fresh stream.
    ///
    /// A failure here costs only this payload; the connection stays up unless
    /// [`TransportSender::connection_lost`] reports otherwise.
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        let mut stream = timeout(self.open_timeout, self.connection.open_uni())
            .await
            .map_err(|_| DispatchError::Timeout { operation: "open stream", duration: self.open_timeout })?
            .map_err(|e| DispatchError::stream_error_with_source("Failed to open stream", e))?;

        self.writer.write(&mut stream, payload).await?;
        stream.finish().map_err(|e| DispatchError::stream_error_with_source("Failed to finish stream", e))?;
        self.in_flight.spawn(async move {
            let mut stream = stream;
            let _ = stream.stopped().await;
        });
        Ok(())
    }

    /// Connection-level failure, if the connection has closed.
    pub fn connection_lost(&self) -> Option<DispatchError> {
        self.connection.close_reason().map(|reason| {
            DispatchError::connect_failed_with_source(self.server.as_str(), "Connection lost", reason)
        })
    }

    /// Drain `payloads` until the queue closes or `cancel` fires.
    ///
    /// Per-message failures are logged and skipped. Returns an error only when the
    /// connection itself is gone.
    pub async fn run(&self, mut payloads: StageReceiver<Bytes>, cancel: CancellationToken) -> Result<SendSummary> {
        let mut summary = SendSummary::default();
        info!(server = %self.server, "Send loop started");

        loop {
            let payload = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Send loop cancelled");
                    break;
                }
                payload = payloads.recv() => match payload {
                    Some(payload) => payload,
                    None => {
                        debug!("Outbound queue closed");
                        break;
                    }
                },
            };

            match self.send(&payload).await {
                Ok(()) => {
                    summary.sent += 1;
                    debug!(bytes = payload.len(), sent = summary.sent, "Frame sent");
                }
                Err(e) => {
                    if let Some(fatal) = self.connection_lost() {
                        error!(error = %fatal, "Connection lost, stopping sender");
                        return Err(fatal);
                    }
                    summary.failed += 1;
                    warn!(error = %e, failed = summary.failed, "Dropping frame after send failure");
                }
            }
        }

        info!(sent = summary.sent, failed = summary.failed, "Send loop ended");
        Ok(summary)
    }

    /// Close the connection once in-flight streams are delivered (or after a short
    /// grace period) and wait for the peer to acknowledge.
    pub async fn close(&self) {
        self.in_flight.close();
        if timeout(CLOSE_DRAIN_TIMEOUT, self.in_flight.wait()).await.is_err() {
            warn!(pending = self.in_flight.len(), "Closing with unacknowledged streams");
        }
        self.connection.close(0u32.into(), b"shutdown");
        self.endpoint.wait_idle().await;
    }
}

async fn resolve(server: &str) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(server)
        .await
        .map_err(|e| DispatchError::connect_failed_with_source(server, "Address resolution failed", e))?;
    addrs.next().ok_or_else(|| DispatchError::connect_failed(server, "Address resolved to nothing"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::stage_queue;
    use crate::transport::tls::{ServerIdentity, server_config};
    use crate::transport::wire::encode_message;
    use crate::transport::{ReceiverOptions, TransportReceiver};

    fn identity_and_trust() -> (ServerIdentity, ClientTrust) {
        let identity = ServerIdentity::self_signed(vec!["localhost".to_string()]).unwrap();
        let trust = ClientTrust::Roots(vec![identity.leaf().unwrap()]);
        (identity, trust)
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn unresolvable_server_is_fatal() {
        let err = TransportSender::connect("not an address", SenderOptions::new(ClientTrust::Insecure)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Connect { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Bound UDP socket that never answers the handshake
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let server = silent.local_addr().unwrap().to_string();
        let options =
            SenderOptions { connect_timeout: Duration::from_millis(200), ..SenderOptions::new(ClientTrust::Insecure) };

        let err = TransportSender::connect(&server, options).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains(&server), "{err}");
    }

    #[tokio::test]
    async fn broken_streams_leave_the_connection_usable() {
        let (identity, trust) = identity_and_trust();
        let receiver = TransportReceiver::bind(loopback(), ReceiverOptions::new(identity)).unwrap();
        let server = receiver.local_addr().unwrap().to_string();
        let (tx, mut rx) = stage_queue("payloads", 8);
        let cancel = CancellationToken::new();
        let accept = tokio::spawn({
            let cancel = cancel.clone();
            async move { receiver.run(tx, cancel).await }
        });

        let sender = TransportSender::connect(&server, SenderOptions::new(trust)).await.unwrap();

        // Announces 100 bytes, delivers 99
        let mut truncated = sender.connection.open_uni().await.unwrap();
        truncated.write_all(&100u32.to_be_bytes()).await.unwrap();
        truncated.write_all(&[1u8; 99]).await.unwrap();
        truncated.finish().unwrap();

        // Reset partway through the payload
        let mut reset = sender.connection.open_uni().await.unwrap();
        reset.write_all(&encode_message(&[2u8; 64]).unwrap()[..20]).await.unwrap();
        reset.reset(0u32.into()).unwrap();

        for expected in [&b"intact"[..], &b"after"[..]] {
            sender.send(expected).await.unwrap();
            let message = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            assert_eq!(&message[..], expected);
        }
        assert!(sender.connection_lost().is_none());

        sender.close().await;
        cancel.cancel();
        accept.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stopped_stream_is_counted_and_skipped() {
        let (identity, trust) = identity_and_trust();
        let transport = transport_config(None, Duration::from_secs(10)).unwrap();
        let endpoint = Endpoint::server(server_config(identity, transport).unwrap(), loopback()).unwrap();
        let server = endpoint.local_addr().unwrap().to_string();

        // Peer that stops every stream it sees
        let peer = tokio::spawn(async move {
            let connection = endpoint.accept().await.unwrap().await.unwrap();
            while let Ok(mut stream) = connection.accept_uni().await {
                let _ = stream.stop(0u32.into());
            }
        });

        let sender = TransportSender::connect(&server, SenderOptions::new(trust)).await.unwrap();
        let (tx, rx) = stage_queue("payloads", 4);
        // Larger than the peer's stream window, so the write is still blocked when the stop arrives
        tx.offer(Bytes::from(vec![0u8; 8 * 1024 * 1024]));
        tx.offer(Bytes::from_static(b"small"));
        drop(tx);

        let summary = timeout(Duration::from_secs(10), sender.run(rx, CancellationToken::new())).await.unwrap().unwrap();
        assert_eq!(summary, SendSummary { sent: 1, failed: 1 });
        assert!(sender.connection_lost().is_none());

        sender.close().await;
        peer.await.unwrap();
    }
}
