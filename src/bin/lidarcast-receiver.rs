//! lidarcast receiver
//!
//! Accepts sender connections, reconstructs frames and publishes them to the
//! frame hub. Without any other subscriber attached, each frame's size is logged.
//!
//! ## Usage
//!
//! ```bash
//! # With a certificate
//! LIDARCAST_CERT=./server.pem LIDARCAST_KEY=./server.key lidarcast-receiver
//!
//! # From a config file (or LIDARCAST_CONFIG=./receiver.yaml)
//! lidarcast-receiver ./receiver.yaml
//!
//! # Bench testing with an ephemeral self-signed certificate
//! LIDARCAST_INSECURE=true lidarcast-receiver
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use futures::StreamExt;
use lidarcast::queue::QueueMonitor;
use lidarcast::{ReceiverConfig, ReceiverNode, UpdateRate};
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
    let config = ReceiverConfig::load(path.as_deref()).context("Invalid receiver configuration")?;

    info!("lidarcast receiver starting");
    info!("  Listen: {}", config.listen);
    info!("  Codecs: {:?}", config.codecs.iter().map(|c| c.name()).collect::<Vec<_>>());

    let node = match ReceiverNode::start(&config).await {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to start receiver: {e}");
            for suggestion in e.recovery_suggestions() {
                error!("  - {suggestion}");
            }
            return Err(e.into());
        }
    };
    let cancel = node.cancellation();
    info!("Waiting for connections on {}", node.local_addr());

    let mut frames = node.subscribe(UpdateRate::Native);
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = frames.next() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                info!("Frame {}: {} points", frame.sequence, frame.len());
            }
        }
    });
    tokio::spawn(log_queue_stats(node.queues(), cancel.clone()));

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Interrupted, shutting down");
    }
    node.shutdown();

    let report = node.wait().await?;
    info!(
        "Received {} payloads, {} failed, {} frames published",
        report.reverse.received, report.reverse.failed, report.published
    );
    Ok(())
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
