//! Update rate control for fan-out subscriptions

use serde::{Deserialize, Serialize};

/// Delivery rate for a frame subscription
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every frame the receiver reconstructs (one per sensor rotation)
    Native,

    /// Throttled to at most this many frames per second, latest frame wins.
    /// If the requested rate meets or exceeds the source rate, Native is used
    Max(u32),
}

impl UpdateRate {
    /// Normalize rate against source frequency
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Native => UpdateRate::Native,
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= source_hz => UpdateRate::Native,
            UpdateRate::Max(hz) => UpdateRate::Max(hz),
        }
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self, source_hz: f64) -> Option<std::time::Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(std::time::Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
