//! Receiver node: QUIC → decompression → frame hub

use std::net::SocketAddr;
use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::joined;
use crate::codec::Pipeline;
use crate::config::ReceiverConfig;
use crate::driver::{Driver, StageSummary};
use crate::hub::FrameHub;
use crate::queue::{QueueMonitor, QueueStats, stage_queue};
use crate::transport::TransportReceiver;
use crate::types::{Frame, UpdateRate};
use crate::Result;

/// Final counters of a receiver run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverReport {
    pub reverse: StageSummary,
    pub published: u64,
    /// Payload queue between the transport and decompression
    pub payloads: QueueStats,
    /// Frame queue between decompression and the hub
    pub frames: QueueStats,
}

/// Running receiver pipeline
pub struct ReceiverNode {
    hub: FrameHub,
    local_addr: SocketAddr,
    accept: JoinHandle<Result<()>>,
    reverse: JoinHandle<StageSummary>,
    publish: JoinHandle<u64>,
    payloads: QueueMonitor,
    frames: QueueMonitor,
    cancel: CancellationToken,
}

impl ReceiverNode {
    /// Validate the configuration, bind the listener and start every stage.
    /// Bind failure is fatal.
    pub async fn start(config: &ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let pipeline = Arc::new(Pipeline::from_specs(&config.codecs)?);
        let receiver = TransportReceiver::bind(config.listen, config.receiver_options()?)?;
        let local_addr = receiver.local_addr()?;
        let hub = FrameHub::new(config.hub_capacity, config.source_hz);

        let cancel = CancellationToken::new();
        let (payload_tx, payload_rx) = stage_queue("payloads", config.queue_capacity);
        let (frame_tx, frame_rx) = stage_queue("frames", config.queue_capacity);
        let payloads = payload_tx.monitor();
        let frames = frame_tx.monitor();

        info!(listen = %local_addr, codecs = ?pipeline.stage_names(), "Receiver starting");

        let accept = tokio::spawn({
            let cancel = cancel.clone();
            async move { receiver.run(payload_tx, cancel).await }
        });
        let reverse = Driver::spawn_reverse(pipeline, payload_rx, frame_tx, cancel.clone());
        let publish = tokio::spawn({
            let hub = hub.clone();
            let cancel = cancel.clone();
            async move { hub.run(frame_rx, cancel).await }
        });

        Ok(Self { hub, local_addr, accept, reverse, publish, payloads, frames, cancel })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Fan-out point for reconstructed frames
    pub fn hub(&self) -> &FrameHub {
        &self.hub
    }

    /// Subscribe to reconstructed frames
    pub fn subscribe(&self, rate: UpdateRate) -> BoxStream<'static, Arc<Frame>> {
        self.hub.subscribe(rate)
    }

    /// Token that stops every stage when cancelled
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask every stage to stop
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Counter views of every stage queue, usable after [`wait`](Self::wait) consumes the node
    pub fn queues(&self) -> [QueueMonitor; 2] {
        [self.payloads.clone(), self.frames.clone()]
    }

    /// Wait for every stage to finish after [`shutdown`](Self::shutdown).
    pub async fn wait(mut self) -> Result<ReceiverReport> {
        joined("accept", (&mut self.accept).await)??;
        let reverse = joined("reverse", (&mut self.reverse).await)?;
        let published = joined("publish", (&mut self.publish).await)?;

        let report = ReceiverReport {
            reverse,
            published,
            payloads: self.payloads.stats(),
            frames: self.frames.stats(),
        };
        info!(
            received = report.reverse.received,
            failed = report.reverse.failed,
            published = report.published,
            "Receiver finished"
        );
        Ok(report)
    }
}

impl Drop for ReceiverNode {
    fn drop(&mut self) {
        debug!("Dropping receiver node");
        self.cancel.cancel();
    }
}
