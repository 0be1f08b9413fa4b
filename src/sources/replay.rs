//! Replay source for capture files

use std::path::Path;

use bytes::Bytes;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::source::PacketSource;
use crate::types::{PACKET_SIZE, RawPacket};
use crate::{DispatchError, Result};

/// Time between packets from a sensor spinning at its native rate.
pub const SENSOR_PACKET_INTERVAL: Duration = Duration::from_micros(1330);

/// Replays a capture of back-to-back sensor packets.
///
/// The capture is a flat file of 1206-byte records with no header. Packets are
/// paced at [`SENSOR_PACKET_INTERVAL`] by default so downstream stages see the
/// same load as from a live sensor.
pub struct ReplayPacketSource {
    /// Whole capture, sliced per packet without copying
    data: Bytes,

    /// Index of the next record
    position: usize,

    /// Restart from the first record at the end
    looping: bool,

    /// Time between packets; zero replays as fast as the consumer pulls
    period: Duration,

    /// Created on first use so construction needs no runtime
    interval: Option<Interval>,

    label: String,
}

impl ReplayPacketSource {
    /// Open a capture file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|source| DispatchError::ConfigFile { path: path.to_path_buf(), source })?;
        let source = Self::from_bytes(data, path.display().to_string());
        info!(
            path = %path.display(),
            packets = source.total_packets(),
            seconds = source.duration().as_secs_f64(),
            "Opened capture"
        );
        Ok(source)
    }

    /// Replay an in-memory capture
    pub fn from_bytes(data: impl Into<Bytes>, label: impl Into<String>) -> Self {
        let data = data.into();
        let trailing = data.len() % PACKET_SIZE;
        if trailing != 0 {
            warn!(trailing, "Capture ends with a partial packet, ignoring it");
        }
        Self {
            data,
            position: 0,
            looping: false,
            period: SENSOR_PACKET_INTERVAL,
            interval: None,
            label: label.into(),
        }
    }

    /// Restart from the first packet when the capture ends
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Set packet pacing; `Duration::ZERO` disables it
    pub fn with_interval(mut self, period: Duration) -> Self {
        self.period = period;
        self.interval = None;
        debug!(?period, "Replay pacing set");
        self
    }

    /// Number of whole packets in the capture
    pub fn total_packets(&self) -> usize {
        self.data.len() / PACKET_SIZE
    }

    /// Capture duration at the native packet rate
    pub fn duration(&self) -> Duration {
        SENSOR_PACKET_INTERVAL * self.total_packets() as u32
    }
}

fn pacing(period: Duration) -> Interval {
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[async_trait::async_trait]
impl PacketSource for ReplayPacketSource {
    async fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        let total = self.total_packets();
        if self.position >= total {
            if !self.looping || total == 0 {
                debug!("Reached end of capture");
                return Ok(None);
            }
            trace!("Looping capture");
            self.position = 0;
        }

        if !self.period.is_zero() {
            let period = self.period;
            self.interval.get_or_insert_with(|| pacing(period)).tick().await;
        }

        let start = self.position * PACKET_SIZE;
        self.position += 1;
        RawPacket::new(self.data.slice(start..start + PACKET_SIZE)).map(Some)
    }

    fn describe(&self) -> String {
        format!("replay://{}", self.label)
    }
}
