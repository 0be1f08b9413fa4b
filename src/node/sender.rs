//! Sender node: sensor source → assembly → compression → QUIC

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::joined;
use crate::assembler::FrameAssembler;
use crate::codec::Pipeline;
use crate::config::SenderConfig;
use crate::driver::{Driver, IngestSummary, StageSummary};
use crate::queue::{QueueMonitor, QueueStats, stage_queue};
use crate::sensor::PacketDecoder;
use crate::source::PacketSource;
use crate::sources::{ReplayPacketSource, UdpPacketSource};
use crate::transport::{SendSummary, TransportSender};
use crate::Result;

/// Final counters of a sender run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderReport {
    pub ingest: IngestSummary,
    pub assembly: StageSummary,
    pub send: SendSummary,
    /// Packet queue between ingest and assembly
    pub packets: QueueStats,
    /// Payload queue between assembly and the transport
    pub payloads: QueueStats,
}

/// Running sender pipeline
pub struct SenderNode {
    transport: Arc<TransportSender>,
    ingest: JoinHandle<IngestSummary>,
    assembly: JoinHandle<StageSummary>,
    send: JoinHandle<Result<SendSummary>>,
    packets: QueueMonitor,
    payloads: QueueMonitor,
    cancel: CancellationToken,
}

impl SenderNode {
    /// Open the configured source, connect to the receiver and start every stage.
    pub async fn start(config: &SenderConfig) -> Result<Self> {
        let source = Self::open_source(config).await?;
        Self::with_source(source, config).await
    }

    /// Replay file when one is configured, otherwise the UDP listener.
    pub async fn open_source(config: &SenderConfig) -> Result<Box<dyn PacketSource>> {
        match &config.replay {
            Some(replay) => {
                let source = ReplayPacketSource::open(&replay.path)?.looping(replay.looping);
                Ok(Box::new(source))
            }
            None => Ok(Box::new(UdpPacketSource::bind(config.listen).await?)),
        }
    }

    /// Start the pipeline around an already-open source.
    ///
    /// The configuration is validated and the connection established before any
    /// task is spawned, so either failure leaves nothing running.
    pub async fn with_source<S: PacketSource>(source: S, config: &SenderConfig) -> Result<Self> {
        config.validate()?;
        let pipeline = Arc::new(Pipeline::from_specs(&config.codecs)?);
        let transport = Arc::new(TransportSender::connect(&config.server, config.sender_options()?).await?);

        let cancel = CancellationToken::new();
        let (packet_tx, packet_rx) = stage_queue("packets", config.queue_capacity);
        let (payload_tx, payload_rx) = stage_queue("payloads", config.queue_capacity);
        let packets = packet_tx.monitor();
        let payloads = payload_tx.monitor();

        info!(
            source = %source.describe(),
            server = %transport.remote_address(),
            codecs = ?pipeline.stage_names(),
            filter_radius = config.filter_radius,
            "Sender starting"
        );

        let ingest = Driver::spawn_ingest(source, packet_tx, cancel.clone());
        let assembler = FrameAssembler::new(PacketDecoder::new(config.filter_radius));
        let assembly = Driver::spawn_assembly(assembler, pipeline, packet_rx, payload_tx, cancel.clone());

        let send = tokio::spawn({
            let transport = transport.clone();
            let cancel = cancel.clone();
            async move {
                let result = transport.run(payload_rx, cancel.clone()).await;
                if result.is_err() {
                    // Without a connection there is nowhere for frames to go
                    cancel.cancel();
                }
                result
            }
        });

        Ok(Self { transport, ingest, assembly, send, packets, payloads, cancel })
    }

    /// Receiver address the connection was made to
    pub fn remote_address(&self) -> SocketAddr {
        self.transport.remote_address()
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
        [self.packets.clone(), self.payloads.clone()]
    }

    /// Wait for every stage to finish, then close the connection.
    ///
    /// Stages finish when the source is exhausted, when [`shutdown`](Self::shutdown)
    /// is called, or when the connection is lost; the latter is returned as an error.
    pub async fn wait(mut self) -> Result<SenderReport> {
        let ingest = joined("ingest", (&mut self.ingest).await)?;
        let assembly = joined("assembly", (&mut self.assembly).await)?;
        let send = joined("send", (&mut self.send).await)?;

        self.transport.close().await;

        let send = send?;
        let report = SenderReport {
            ingest,
            assembly,
            send,
            packets: self.packets.stats(),
            payloads: self.payloads.stats(),
        };
        if report.packets.dropped > 0 || report.payloads.dropped > 0 {
            warn!(
                packet_drop_rate = report.packets.drop_rate(),
                payload_drop_rate = report.payloads.drop_rate(),
                "Backpressure dropped data during the run"
            );
        }
        info!(
            packets = report.ingest.packets,
            frames = report.assembly.forwarded,
            sent = report.send.sent,
            "Sender finished"
        );
        Ok(report)
    }
}

impl Drop for SenderNode {
    fn drop(&mut self) {
        debug!("Dropping sender node");
        self.cancel.cancel();
    }
}
