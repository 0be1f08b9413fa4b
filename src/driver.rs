//! Driver spawns and manages the pipeline stage tasks
//!
//! Each stage runs in its own task and talks to its neighbours only through
//! bounded [stage queues](crate::queue). Every task stops when its input queue
//! closes or the shared cancellation token fires; dropping a task's output
//! sender then closes the next stage's input, so shutdown ripples downstream.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::assembler::FrameAssembler;
use crate::codec::Pipeline;
use crate::queue::{Offer, StageReceiver, StageSender};
use crate::source::PacketSource;
use crate::types::{Frame, RawPacket};
use crate::{DispatchError, Result};

/// Consecutive source errors tolerated before ingestion gives up.
const MAX_SOURCE_ERRORS: u32 = 10;

/// Counters from a finished ingest task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub packets: u64,
    pub errors: u64,
}

/// Counters from a finished assembly or reverse task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    /// Units taken from the input queue
    pub received: u64,
    /// Units handed to the output queue
    pub forwarded: u64,
    /// Units discarded because processing failed
    pub failed: u64,
}

/// Run a CPU-bound codec pass on the blocking pool.
async fn off_executor<T, F>(task: &'static str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DispatchError::TaskFailed { task, reason: e.to_string() })?
}

/// Driver spawns the processing tasks for each stage boundary
pub struct Driver;

impl Driver {
    /// Spawn the ingest task: source → packet queue.
    ///
    /// Transient source errors are retried with exponential backoff; after
    /// `MAX_SOURCE_ERRORS` consecutive failures the task ends.
    pub fn spawn_ingest<S>(source: S, out: StageSender<RawPacket>, cancel: CancellationToken) -> JoinHandle<IngestSummary>
    where
        S: PacketSource,
    {
        tokio::spawn(Self::ingest_task(source, out, cancel))
    }

    async fn ingest_task<S>(mut source: S, out: StageSender<RawPacket>, cancel: CancellationToken) -> IngestSummary
    where
        S: PacketSource,
    {
        let mut summary = IngestSummary::default();
        let mut consecutive_errors = 0u32;
        info!(source = %source.describe(), "Ingest task started");

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Ingest cancelled");
                    break;
                }
                result = source.next_packet() => result,
            };

            match result {
                Ok(Some(packet)) => {
                    consecutive_errors = 0;
                    summary.packets += 1;
                    trace!(packet = summary.packets, timestamp_us = packet.timestamp_us(), "Packet received");
                    if out.offer(packet) == Offer::Closed {
                        debug!("Packet queue closed, stopping ingest");
                        break;
                    }
                }
                Ok(None) => {
                    info!(packets = summary.packets, "Source exhausted");
                    break;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    summary.errors += 1;
                    error!(error = %e, attempt = consecutive_errors, max = MAX_SOURCE_ERRORS, "Source error");

                    if e.is_fatal() || consecutive_errors >= MAX_SOURCE_ERRORS {
                        error!("Giving up on packet source");
                        break;
                    }

                    // Exponential backoff: 50ms, 100ms, 200ms, ...
                    let backoff = Duration::from_millis(50 * (1 << consecutive_errors.min(5)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        info!(packets = summary.packets, errors = summary.errors, "Ingest task ended");
        summary
    }

    /// Spawn the assembly task: packet queue → frames → compressed payload queue.
    pub fn spawn_assembly(
        assembler: FrameAssembler,
        pipeline: Arc<Pipeline>,
        input: StageReceiver<RawPacket>,
        out: StageSender<Bytes>,
        cancel: CancellationToken,
    ) -> JoinHandle<StageSummary> {
        tokio::spawn(Self::assembly_task(assembler, pipeline, input, out, cancel))
    }

    async fn assembly_task(
        mut assembler: FrameAssembler,
        pipeline: Arc<Pipeline>,
        mut input: StageReceiver<RawPacket>,
        out: StageSender<Bytes>,
        cancel: CancellationToken,
    ) -> StageSummary {
        let mut summary = StageSummary::default();
        info!(stages = ?pipeline.stage_names(), "Assembly task started");

        loop {
            let packet = tokio::select! {
                _ = cancel.cancelled() => break,
                packet = input.recv() => match packet {
                    Some(packet) => packet,
                    None => break,
                },
            };
            summary.received += 1;

            let Some(frame) = assembler.push(&packet) else {
                continue;
            };

            let (sequence, points) = (frame.sequence, frame.len());
            let serialized = frame.serialize();
            let raw_bytes = serialized.len();
            let compressed = {
                let pipeline = pipeline.clone();
                off_executor("compress", move || pipeline.compress(&serialized)).await
            };
            match compressed {
                Ok(payload) => {
                    debug!(sequence, points, raw_bytes, bytes = payload.len(), "Frame compressed");
                    match out.offer(Bytes::from(payload)) {
                        Offer::Accepted => summary.forwarded += 1,
                        Offer::Dropped => {}
                        Offer::Closed => {
                            debug!("Outbound queue closed, stopping assembly");
                            break;
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(sequence, error = %e, "Dropping frame after compression failure");
                }
            }
        }

        if assembler.pending_points() > 0 {
            debug!(points = assembler.pending_points(), "Discarding partial rotation");
        }
        info!(
            packets = summary.received,
            frames = assembler.frames_sealed(),
            forwarded = summary.forwarded,
            failed = summary.failed,
            "Assembly task ended"
        );
        summary
    }

    /// Spawn the reverse task: payload queue → decompressed frames → frame queue.
    pub fn spawn_reverse(
        pipeline: Arc<Pipeline>,
        input: StageReceiver<Bytes>,
        out: StageSender<Frame>,
        cancel: CancellationToken,
    ) -> JoinHandle<StageSummary> {
        tokio::spawn(Self::reverse_task(pipeline, input, out, cancel))
    }

    async fn reverse_task(
        pipeline: Arc<Pipeline>,
        mut input: StageReceiver<Bytes>,
        out: StageSender<Frame>,
        cancel: CancellationToken,
    ) -> StageSummary {
        let mut summary = StageSummary::default();
        info!(stages = ?pipeline.stage_names(), "Reverse task started");

        loop {
            let payload = tokio::select! {
                _ = cancel.cancelled() => break,
                payload = input.recv() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };
            let sequence = summary.received;
            summary.received += 1;

            let frame = {
                let pipeline = pipeline.clone();
                let payload = payload.clone();
                off_executor("decompress", move || {
                    pipeline.decompress(&payload).and_then(|serialized| Frame::deserialize(sequence, &serialized))
                })
                .await
            };

            match frame {
                Ok(frame) => {
                    debug!(sequence, bytes = payload.len(), points = frame.len(), "Frame reconstructed");
                    match out.offer(frame) {
                        Offer::Accepted => summary.forwarded += 1,
                        Offer::Dropped => {}
                        Offer::Closed => {
                            debug!("Frame queue closed, stopping reverse pipeline");
                            break;
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(sequence, bytes = payload.len(), error = %e, "Dropping undecodable payload");
                }
            }
        }

        info!(
            received = summary.received,
            forwarded = summary.forwarded,
            failed = summary.failed,
            "Reverse task ended"
        );
        summary
    }
}
