//! lidarcast sender
//!
//! Captures sensor packets, assembles rotations, compresses them and streams them
//! to a receiver over QUIC.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults, with a CA to verify the receiver
//! LIDARCAST_CA_CERT=./ca.pem lidarcast-sender
//!
//! # From a config file (or LIDARCAST_CONFIG=./sender.yaml)
//! lidarcast-sender ./sender.yaml
//!
//! # Bench testing against a self-signed receiver
//! LIDARCAST_INSECURE=true LIDARCAST_SERVER=10.0.0.2:8081 lidarcast-sender
//!
//! # Verbose logging
//! RUST_LOG=lidarcast=debug lidarcast-sender
//! ```
//!
//! Exits non-zero if the receiver cannot be reached or the connection is lost, so
//! that a supervisor can restart it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use lidarcast::queue::QueueMonitor;
use lidarcast::{SenderConfig, SenderNode};
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lidarcast=info".parse()?))
        .init();

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = SenderConfig::load(path.as_deref()).context("Invalid sender configuration")?;

    info!("lidarcast sender starting");
    info!("  Server: {} ({})", config.server, config.server_name);
    match &config.replay {
        Some(replay) => info!("  Replay: {} (loop: {})", replay.path.display(), replay.looping),
        None => info!("  Listen: {}", config.listen),
    }

    let node = match SenderNode::start(&config).await {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to start sender: {e}");
            for suggestion in e.recovery_suggestions() {
                error!("  - {suggestion}");
            }
            return Err(e.into());
        }
    };
    let cancel = node.cancellation();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
            }
            cancel.cancel();
        }
    });
    tokio::spawn(log_queue_stats(node.queues(), cancel));

    match node.wait().await {
        Ok(report) => {
            info!(
                "Sent {} frames from {} packets ({} failed, {:.1}% packets dropped)",
                report.send.sent,
                report.ingest.packets,
                report.send.failed,
                report.packets.drop_rate()
            );
            Ok(())
        }
        Err(e) => {
            error!("Sender stopped: {e}");
            for suggestion in e.recovery_suggestions() {
                error!("  - {suggestion}");
            }
            Err(e.into())
        }
    }
}

async fn log_queue_stats(queues: [QueueMonitor; 2], cancel: CancellationToken) {
    let mut stats_interval = interval(Duration::from_secs(30));
    stats_interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = stats_interval.tick() => {}
        }
        for queue in &queues {
            let stats = queue.stats();
            info!(
                "Queue {}: {} accepted, {} dropped ({:.2}%)",
                queue.name(),
                stats.accepted,
                stats.dropped,
                stats.drop_rate()
            );
        }
    }
}
