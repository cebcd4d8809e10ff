// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Node configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default heartbeat period in milliseconds.
pub const DEFAULT_HEARTBEAT_PERIOD_MS: u64 = 1000;

/// Default participant registry log location.
pub const DEFAULT_LOG_FILE: &str = ".wayline_schedule_node.yaml";

/// Runtime configuration of a schedule node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Period between heartbeat beacons, in milliseconds. Also the lease
    /// and deadline a liveliness-aware broker should attach to the topic.
    pub heartbeat_period_ms: u64,
    /// Location of the durable participant registry log.
    pub log_file_location: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heartbeat_period_ms: DEFAULT_HEARTBEAT_PERIOD_MS,
            log_file_location: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl NodeConfig {
    /// Heartbeat period as a [`Duration`].
    #[must_use]
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }
}
