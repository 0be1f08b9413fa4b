//! Sender and receiver nodes talking over QUIC on the loopback interface

mod common;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lidarcast::codec::CodecSpec;
use lidarcast::config::SenderTransport;
use lidarcast::sources::MemoryPacketSource;
use lidarcast::types::Frame;
use lidarcast::{DispatchError, ReceiverConfig, ReceiverNode, SenderConfig, SenderNode, UpdateRate};
use tempfile::TempDir;

use common::{POINTS_PER_PACKET, two_rotations};

const LOOPBACK: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 0);

struct Credentials {
    _dir: TempDir,
    cert: PathBuf,
    key: PathBuf,
}

fn credentials() -> Credentials {
    let dir = tempfile::tempdir().unwrap();
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = dir.path().join("cert.pem");
    let key = dir.path().join("key.pem");
    std::fs::write(&cert, certified.cert.pem()).unwrap();
    std::fs::write(&key, certified.key_pair.serialize_pem()).unwrap();
    Credentials { _dir: dir, cert, key }
}

fn receiver_config(credentials: Option<&Credentials>, codecs: Vec<CodecSpec>) -> ReceiverConfig {
    ReceiverConfig {
        listen: LOOPBACK,
        codecs,
        insecure: credentials.is_none(),
        cert: credentials.map(|c| c.cert.clone()),
        key: credentials.map(|c| c.key.clone()),
        ..Default::default()
    }
}

fn sender_config(server: SocketAddr, ca_cert: Option<PathBuf>, codecs: Vec<CodecSpec>) -> SenderConfig {
    SenderConfig {
        server: server.to_string(),
        server_name: "localhost".to_string(),
        filter_radius: 0.0,
        codecs,
        insecure: ca_cert.is_none(),
        ca_cert,
        transport: SenderTransport { connect_timeout_ms: 2_000, ..Default::default() },
        ..Default::default()
    }
}

async fn next_frames(frames: &mut (impl StreamExt<Item = Arc<Frame>> + Unpin), count: usize) -> Vec<Arc<Frame>> {
    let mut received = Vec::with_capacity(count);
    for _ in 0..count {
        let frame = tokio::time::timeout(Duration::from_secs(10), frames.next())
            .await
            .expect("frame arrives before timeout")
            .expect("hub stays open");
        received.push(frame);
    }
    received
}

#[tokio::test]
async fn frames_cross_a_verified_connection() {
    common::init_tracing();
    let credentials = credentials();
    let codecs = vec![CodecSpec::Gzip { level: 6 }];

    let receiver = ReceiverNode::start(&receiver_config(Some(&credentials), codecs.clone())).await.unwrap();
    let mut frames = receiver.subscribe(UpdateRate::Native);

    let config = sender_config(receiver.local_addr(), Some(credentials.cert.clone()), codecs);
    let sender = SenderNode::with_source(MemoryPacketSource::new(two_rotations(10.0)), &config).await.unwrap();
    assert_eq!(sender.remote_address(), receiver.local_addr());

    let received = next_frames(&mut frames, 2).await;
    let mut sequences: Vec<_> = received.iter().map(|f| f.sequence).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![0, 1]);
    assert!(received.iter().all(|f| f.len() == 12 * POINTS_PER_PACKET));

    let report = sender.wait().await.unwrap();
    assert_eq!(report.ingest.packets, 25);
    assert_eq!(report.assembly.forwarded, 2);
    assert_eq!(report.send.sent, 2);
    assert_eq!(report.send.failed, 0);

    receiver.shutdown();
    let report = receiver.wait().await.unwrap();
    assert_eq!(report.reverse.received, 2);
    assert_eq!(report.reverse.failed, 0);
    assert_eq!(report.published, 2);
}

#[tokio::test]
async fn insecure_mode_uses_ephemeral_certificate() {
    common::init_tracing();
    let codecs = vec![CodecSpec::Voxel { voxel_size: 0.05 }, CodecSpec::Gzip { level: 6 }];

    let receiver = ReceiverNode::start(&receiver_config(None, codecs.clone())).await.unwrap();
    let mut frames = receiver.subscribe(UpdateRate::Native);

    let config = sender_config(receiver.local_addr(), None, codecs);
    let sender = SenderNode::with_source(MemoryPacketSource::new(two_rotations(10.0)), &config).await.unwrap();
    for frame in next_frames(&mut frames, 2).await {
        assert_eq!(frame.len(), 12 * 16);
    }
    assert_eq!(sender.wait().await.unwrap().send.sent, 2);
}

#[tokio::test]
async fn mismatched_codec_chains_drop_every_frame() {
    common::init_tracing();
    let receiver = ReceiverNode::start(&receiver_config(None, vec![CodecSpec::Gzip { level: 6 }])).await.unwrap();

    let config = sender_config(receiver.local_addr(), None, Vec::new());
    let sender = SenderNode::with_source(MemoryPacketSource::new(two_rotations(10.0)), &config).await.unwrap();
    // Streams are handled asynchronously; wait until the receiver has read both
    let [payloads, _] = receiver.queues();
    tokio::time::timeout(Duration::from_secs(10), async {
        while payloads.stats().accepted < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(sender.wait().await.unwrap().send.sent, 2);

    receiver.shutdown();
    let report = receiver.wait().await.unwrap();
    assert!(report.reverse.received <= 2);
    assert_eq!(report.reverse.failed, report.reverse.received);
    assert_eq!(report.published, 0);
    assert_eq!(report.frames.offered, 0);
}

#[tokio::test]
async fn untrusted_certificate_fails_to_connect() {
    common::init_tracing();
    let served = credentials();
    let other = credentials();

    let receiver = ReceiverNode::start(&receiver_config(Some(&served), Vec::new())).await.unwrap();
    let config = sender_config(receiver.local_addr(), Some(other.cert.clone()), Vec::new());

    let err = SenderNode::with_source(MemoryPacketSource::new(Vec::new()), &config).await.err().unwrap();
    assert!(matches!(err, DispatchError::Connect { .. }), "{err}");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn unreachable_receiver_fails_within_timeout() {
    common::init_tracing();
    // Bind then drop a socket to get a port with nothing behind it
    let port = std::net::UdpSocket::bind(LOOPBACK).unwrap().local_addr().unwrap().port();
    let server = SocketAddr::new(LOOPBACK.ip(), port);

    let mut config = sender_config(server, None, Vec::new());
    config.transport.connect_timeout_ms = 300;

    let started = std::time::Instant::now();
    let err = SenderNode::with_source(MemoryPacketSource::new(Vec::new()), &config).await.err().unwrap();
    assert!(matches!(err, DispatchError::Connect { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn sender_without_ca_refuses_to_start() {
    common::init_tracing();
    let config = SenderConfig { ca_cert: None, insecure: false, ..sender_config(LOOPBACK, None, Vec::new()) };

    let err = SenderNode::with_source(MemoryPacketSource::new(Vec::new()), &config).await.err().unwrap();
    assert!(matches!(err, DispatchError::Config { .. }), "{err}");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn receiver_without_certificate_refuses_to_start() {
    let config = ReceiverConfig { insecure: false, ..receiver_config(None, Vec::new()) };
    let err = ReceiverNode::start(&config).await.err().unwrap();
    assert!(matches!(err, DispatchError::Config { .. }), "{err}");
}
