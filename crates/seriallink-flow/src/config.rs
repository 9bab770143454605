use std::time::Duration;

use seriallink_frame::{clamp_mtu, FrameConfig, DEFAULT_MTU};

/// Default ingress (received packets) queue depth.
pub const DEFAULT_INGRESS_CAPACITY: usize = 10;
/// Default egress (packets awaiting transmission) queue depth.
pub const DEFAULT_EGRESS_CAPACITY: usize = 10;

/// Configuration for one serial transport endpoint.
///
/// Everything here is fixed when the transport starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Maximum payload per data frame. Default: 100.
    pub mtu: usize,
    /// Received packets buffered before the receive task blocks.
    pub ingress_capacity: usize,
    /// Packets buffered before `send` blocks.
    pub egress_capacity: usize,
    /// Pause before the first startup sentinel, giving the local receive
    /// task time to start listening.
    pub startup_delay: Duration,
    /// Interval between startup sentinels until the peer answers.
    pub retry_interval: Duration,
}

impl TransportConfig {
    /// Frame codec settings derived from this configuration.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig::with_mtu(self.mtu)
    }

    pub(crate) fn effective_mtu(&self) -> usize {
        clamp_mtu(self.mtu)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            egress_capacity: DEFAULT_EGRESS_CAPACITY,
            startup_delay: Duration::from_secs(1),
            retry_interval: Duration::from_millis(100),
        }
    }
}
