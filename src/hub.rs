//! Frame fan-out to any number of subscribers
//!
//! The hub is the hand-off point between the reverse pipeline and whatever
//! presents frames to observers. Every subscription is an independent, lazy
//! `Stream` that starts at the next published frame. A subscriber that falls
//! behind skips ahead to fresh frames instead of slowing the publisher.
//!
//! ```rust
//! use futures::StreamExt;
//! use lidarcast::hub::FrameHub;
//! use lidarcast::types::{Frame, Point3D, UpdateRate};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = FrameHub::new(16, 10.0);
//! let mut frames = hub.subscribe(UpdateRate::Native);
//!
//! hub.publish(Frame::new(0, vec![Point3D::new(1.0, 2.0, 3.0)]));
//! let frame = frames.next().await.unwrap();
//! assert_eq!(frame.len(), 1);
//! # }
//! ```

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::{StreamExt, future};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::queue::StageReceiver;
use crate::stream::ThrottleExt;
use crate::types::{Frame, UpdateRate};

/// Nominal frame rate of a sensor spinning at 600 RPM.
pub const DEFAULT_SOURCE_HZ: f64 = 10.0;

struct Inner {
    frames: broadcast::Sender<Arc<Frame>>,
    latest: watch::Sender<Option<Arc<Frame>>>,
    source_hz: f64,
}

/// Broadcasts completed frames to subscribers. Cheap to clone.
#[derive(Clone)]
pub struct FrameHub {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FrameHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHub")
            .field("subscribers", &self.subscriber_count())
            .field("source_hz", &self.inner.source_hz)
            .finish()
    }
}

impl FrameHub {
    /// Create a hub buffering up to `capacity` frames per subscriber.
    ///
    /// `source_hz` is the expected frame rate, used to normalize subscription rates.
    pub fn new(capacity: usize, source_hz: f64) -> Self {
        let (frames, _) = broadcast::channel(capacity.max(1));
        let (latest, _) = watch::channel(None);
        Self { inner: Arc::new(Inner { frames, latest, source_hz }) }
    }

    /// Publish a frame to every current subscriber; returns how many received it.
    pub fn publish(&self, frame: Frame) -> usize {
        let frame = Arc::new(frame);
        self.inner.latest.send_replace(Some(frame.clone()));
        let receivers = self.inner.frames.send(frame).unwrap_or(0);
        trace!(receivers, "Frame published");
        receivers
    }

    /// Most recently published frame
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.inner.latest.borrow().clone()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.frames.receiver_count()
    }

    /// Expected source frame rate
    pub fn source_hz(&self) -> f64 {
        self.inner.source_hz
    }

    /// Subscribe to frames published from now on.
    ///
    /// With `UpdateRate::Max(hz)` below the source rate, frames are throttled with
    /// latest-wins semantics. Must be called within a Tokio runtime when throttled.
    pub fn subscribe(&self, rate: UpdateRate) -> BoxStream<'static, Arc<Frame>> {
        let frames = BroadcastStream::new(self.inner.frames.subscribe()).filter_map(|result| {
            future::ready(match result {
                Ok(frame) => Some(frame),
                Err(lagged) => {
                    debug!(error = %lagged, "Subscriber lagging, skipping ahead");
                    None
                }
            })
        });

        match rate.throttle_interval(self.inner.source_hz) {
            None => frames.boxed(),
            Some(interval) => frames.throttle(interval).boxed(),
        }
    }

    /// Publish every frame from `frames` until the queue closes or `cancel` fires.
    pub async fn run(&self, mut frames: StageReceiver<Frame>, cancel: CancellationToken) -> u64 {
        let mut published = 0u64;
        info!(queue = frames.name(), "Hub started");

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            published += 1;
            debug!(sequence = frame.sequence, points = frame.len(), "Publishing frame");
            self.publish(frame);
        }

        info!(published, "Hub stopped");
        published
    }
}

impl Default for FrameHub {
    fn default() -> Self {
        Self::new(16, DEFAULT_SOURCE_HZ)
    }
}
