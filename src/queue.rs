//! Bounded hand-off queues between pipeline stages
//!
//! Every stage boundary is a bounded mpsc channel. Producers that can be
//! overwhelmed by bursty input use [`StageSender::offer`], which never waits: when
//! the queue is full the new item is dropped and a warning is logged. Producers
//! feeding a single internal consumer may use [`StageSender::send`] instead, which
//! waits for capacity.
//!
//! ```rust
//! use lidarcast::queue::{Offer, stage_queue};
//!
//! let (tx, mut rx) = stage_queue::<u32>("example", 1);
//! assert_eq!(tx.offer(1), Offer::Accepted);
//! assert_eq!(tx.offer(2), Offer::Dropped);
//! assert_eq!(rx.try_recv(), Some(1));
//! assert_eq!(tx.stats().dropped, 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::{DispatchError, Result};

/// Outcome of a non-blocking [`StageSender::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Item was queued
    Accepted,
    /// Queue was full; the item was discarded
    Dropped,
    /// Consumer is gone; the item was discarded
    Closed,
}

/// Snapshot of a queue's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Items offered or sent by producers
    pub offered: u64,
    /// Items that made it into the queue
    pub accepted: u64,
    /// Items discarded because the queue was full
    pub dropped: u64,
}

impl QueueStats {
    /// Get the drop rate as a percentage
    pub fn drop_rate(&self) -> f64 {
        if self.offered == 0 { 0.0 } else { (self.dropped as f64 / self.offered as f64) * 100.0 }
    }
}

#[derive(Debug, Default)]
struct Counters {
    offered: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

/// Producer half of a stage queue. Cheap to clone; clones share counters.
#[derive(Debug)]
pub struct StageSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    counters: Arc<Counters>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self { name: self.name, tx: self.tx.clone(), counters: self.counters.clone() }
    }
}

/// Read-only view of a queue's counters. Does not keep the queue open.
#[derive(Debug, Clone)]
pub struct QueueMonitor {
    name: &'static str,
    counters: Arc<Counters>,
}

impl QueueMonitor {
    /// Queue name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current counter values
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            offered: self.counters.offered.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Consumer half of a stage queue
#[derive(Debug)]
pub struct StageReceiver<T> {
    name: &'static str,
    rx: mpsc::Receiver<T>,
}

/// Create a named bounded queue.
///
/// # Panics
///
/// Panics if `capacity` is zero; configuration validation rejects that earlier.
pub fn stage_queue<T>(name: &'static str, capacity: usize) -> (StageSender<T>, StageReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (StageSender { name, tx, counters: Arc::default() }, StageReceiver { name, rx })
}

impl<T> StageSender<T> {
    /// Queue name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue without waiting; drops the item if the queue is full.
    pub fn offer(&self, item: T) -> Offer {
        self.counters.offered.fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(item) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                Offer::Accepted
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(queue = self.name, dropped, "Queue full, dropping newest item");
                Offer::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Enqueue, waiting for capacity.
    pub async fn send(&self, item: T) -> Result<()> {
        self.counters.offered.fetch_add(1, Ordering::Relaxed);
        self.tx.send(item).await.map_err(|_| DispatchError::QueueClosed { queue: self.name })?;
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the consumer goes away
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Counters shared by every clone of this sender
    pub fn stats(&self) -> QueueStats {
        self.monitor().stats()
    }

    /// Counter view that outlives the sender
    pub fn monitor(&self) -> QueueMonitor {
        QueueMonitor { name: self.name, counters: self.counters.clone() }
    }
}

impl<T> StageReceiver<T> {
    /// Queue name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Receive the next item; `None` once every sender is dropped and the queue drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Receive without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Convert into a `Stream` of items
    pub fn into_stream(self) -> ReceiverStream<T> {
        ReceiverStream::new(self.rx)
    }
}
