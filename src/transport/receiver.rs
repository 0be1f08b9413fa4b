//! QUIC transport receiver

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use quinn::{Connection, Endpoint, Incoming, RecvStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::tls::{ServerIdentity, server_config, transport_config};
use super::wire::{
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_CHUNK, DEFAULT_STAGING_CAPACITY, MessageReader,
};
use crate::pool::BufferPool;
use crate::queue::{Offer, StageSender};
use crate::{DispatchError, Result};

/// Listener settings
#[derive(Debug)]
pub struct ReceiverOptions {
    pub identity: ServerIdentity,
    /// Bound on waiting for a new connection's first stream
    pub accept_timeout: Duration,
    pub keep_alive: Option<Duration>,
    pub idle_timeout: Duration,
    pub read_chunk: usize,
    pub accumulation_capacity: usize,
    pub max_message_size: usize,
}

impl ReceiverOptions {
    /// Defaults around the given identity
    pub fn new(identity: ServerIdentity) -> Self {
        Self {
            identity,
            accept_timeout: Duration::from_secs(5),
            keep_alive: Some(Duration::from_secs(1)),
            idle_timeout: Duration::from_secs(600),
            read_chunk: DEFAULT_READ_CHUNK,
            accumulation_capacity: DEFAULT_STAGING_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Accepts connections and forwards every received message to a stage queue.
///
/// Each connection and each stream within it gets its own task. A failing stream
/// is abandoned without affecting its connection; a connection that never opens a
/// stream within the accept timeout is closed.
#[derive(Debug)]
pub struct TransportReceiver {
    endpoint: Endpoint,
    reader: MessageReader,
    accept_timeout: Duration,
}

impl TransportReceiver {
    /// Bind the listener. Failure is fatal.
    pub fn bind(addr: SocketAddr, options: ReceiverOptions) -> Result<Self> {
        let transport = transport_config(options.keep_alive, options.idle_timeout)?;
        let config = server_config(options.identity, transport)?;
        let endpoint = Endpoint::server(config, addr)
            .map_err(|source| DispatchError::Bind { addr: addr.to_string(), source })?;

        let reader = MessageReader::new(
            BufferPool::chunks(options.read_chunk),
            BufferPool::staging(options.accumulation_capacity),
            options.max_message_size,
        );
        info!(listen = %addr, "Receiver bound");
        Ok(Self { endpoint, reader, accept_timeout: options.accept_timeout })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Message reader, exposed for pool statistics
    pub fn reader(&self) -> &MessageReader {
        &self.reader
    }

    /// Accept connections until `cancel` fires, then wait for in-flight tasks.
    pub async fn run(&self, out: StageSender<Bytes>, cancel: CancellationToken) -> Result<()> {
        let tracker = TaskTracker::new();
        info!("Accept loop started");

        loop {
            let incoming = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Accept loop cancelled");
                    break;
                }
                incoming = self.endpoint.accept() => match incoming {
                    Some(incoming) => incoming,
                    None => {
                        info!("Endpoint closed");
                        break;
                    }
                },
            };

            let handler = ConnectionHandler {
                reader: self.reader.clone(),
                out: out.clone(),
                accept_timeout: self.accept_timeout,
                tracker: tracker.clone(),
                cancel: cancel.clone(),
            };
            tracker.spawn(handler.run(incoming));
        }

        self.endpoint.close(0u32.into(), b"shutdown");
        tracker.close();
        tracker.wait().await;
        info!("Accept loop ended");
        Ok(())
    }
}

struct ConnectionHandler {
    reader: MessageReader,
    out: StageSender<Bytes>,
    accept_timeout: Duration,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl ConnectionHandler {
    async fn run(self, incoming: Incoming) {
        let remote = incoming.remote_address();
        let connecting = match incoming.accept() {
            Ok(connecting) => connecting,
            Err(e) => {
                warn!(%remote, error = %e, "Refused incoming connection");
                return;
            }
        };
        let connection = tokio::select! {
            _ = self.cancel.cancelled() => return,
            connection = connecting => match connection {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(%remote, error = %e, "Handshake failed");
                    return;
                }
            },
        };
        info!(%remote, "Connection accepted");

        let first = match timeout(self.accept_timeout, connection.accept_uni()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                info!(%remote, reason = %e, "Connection closed before first stream");
                return;
            }
            Err(_) => {
                warn!(%remote, timeout = ?self.accept_timeout, "No stream opened, closing connection");
                connection.close(0u32.into(), b"no stream");
                return;
            }
        };
        self.spawn_stream(first, remote);

        loop {
            let stream = tokio::select! {
                _ = self.cancel.cancelled() => {
                    connection.close(0u32.into(), b"shutdown");
                    break;
                }
                stream = connection.accept_uni() => stream,
            };
            match stream {
                Ok(stream) => self.spawn_stream(stream, remote),
                Err(e) => {
                    info!(%remote, reason = %e, "Connection closed");
                    break;
                }
            }
        }

        log_connection_end(&connection);
    }

    fn spawn_stream(&self, mut stream: RecvStream, remote: SocketAddr) {
        let reader = self.reader.clone();
        let out = self.out.clone();
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = read_stream(&reader, &mut stream, &out, remote) => {}
            }
        });
    }
}

/// Read messages until the stream ends, fails or the consumer goes away.
async fn read_stream(reader: &MessageReader, stream: &mut RecvStream, out: &StageSender<Bytes>, remote: SocketAddr) {
    let id = stream.id();
    loop {
        match reader.read(stream).await {
            Ok(Some(message)) => {
                trace!(%remote, %id, bytes = message.len(), "Message received");
                if out.offer(message) == Offer::Closed {
                    debug!(%remote, "Inbound queue closed, abandoning stream");
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(%remote, %id, error = %e, "Abandoning stream");
                return;
            }
        }
    }
}

fn log_connection_end(connection: &Connection) {
    let stats = connection.stats();
    debug!(
        remote = %connection.remote_address(),
        rtt = ?connection.rtt(),
        lost_packets = stats.path.lost_packets,
        "Connection ended"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::stage_queue;
    use crate::transport::{ClientTrust, SenderOptions, TransportSender};

    fn options(accept_timeout: Duration) -> (ReceiverOptions, ClientTrust) {
        let identity = ServerIdentity::self_signed(vec!["localhost".to_string()]).unwrap();
        let trust = ClientTrust::Roots(vec![identity.leaf().unwrap()]);
        (ReceiverOptions { accept_timeout, ..ReceiverOptions::new(identity) }, trust)
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn messages_reach_the_queue() {
        let (options, trust) = options(Duration::from_secs(5));
        let receiver = TransportReceiver::bind(loopback(), options).unwrap();
        let server = receiver.local_addr().unwrap().to_string();
        let (tx, mut rx) = stage_queue("payloads", 8);
        let cancel = CancellationToken::new();
        let accept = tokio::spawn({
            let cancel = cancel.clone();
            async move { receiver.run(tx, cancel).await }
        });

        let sender = TransportSender::connect(&server, SenderOptions::new(trust)).await.unwrap();
        sender.send(b"first").await.unwrap();
        sender.send(&[7u8; 100_000]).await.unwrap();

        let mut received = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        received.sort_by_key(|message| message.len());
        assert_eq!(&received[0][..], b"first");
        assert_eq!(received[1].len(), 100_000);

        sender.close().await;
        cancel.cancel();
        accept.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn idle_connection_is_closed_after_accept_timeout() {
        let (options, trust) = options(Duration::from_millis(100));
        let receiver = TransportReceiver::bind(loopback(), options).unwrap();
        let server = receiver.local_addr().unwrap().to_string();
        let (tx, _rx) = stage_queue("payloads", 1);
        let cancel = CancellationToken::new();
        let accept = tokio::spawn({
            let cancel = cancel.clone();
            async move { receiver.run(tx, cancel).await }
        });

        let sender = TransportSender::connect(&server, SenderOptions::new(trust)).await.unwrap();
        let mut closed = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if sender.connection_lost().is_some() {
                closed = true;
                break;
            }
        }
        assert!(closed, "receiver kept an idle connection open");

        cancel.cancel();
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_fatal() {
        let (first_options, _) = options(Duration::from_secs(1));
        let first = TransportReceiver::bind(loopback(), first_options).unwrap();
        let (second_options, _) = options(Duration::from_secs(1));
        let err = TransportReceiver::bind(first.local_addr().unwrap(), second_options).unwrap_err();
        assert!(matches!(err, DispatchError::Bind { .. }));
        assert!(err.is_fatal());
    }
}
