//! Coordinator tuning knobs

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Buffer sizes and deadlines for the coordinator and its peers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Channel buffer size for coordinator commands
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,

    /// Channel buffer size for per-peer outbound notifications
    #[serde(rename = "peer-channel-buffer")]
    pub peer_channel_buffer: usize,

    /// Deadline for a single write to a peer, in seconds
    #[serde(rename = "write-timeout-secs")]
    pub write_timeout_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 256,
            peer_channel_buffer: 32,
            write_timeout_secs: 10,
        }
    }
}

impl CoordinatorConfig {
    /// Get the per-write deadline as a Duration
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}
