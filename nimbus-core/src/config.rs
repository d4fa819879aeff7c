// SPDX-License-Identifier: LGPL-3.0-only
//! Monitor configuration.

use std::time::Duration;

/// Default minimum spacing between two progress deliveries to one subscriber.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(250);

/// Configuration for a [`DownloadMonitor`](crate::monitor::DownloadMonitor).
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Minimum interval between two non-terminal updates delivered to a single
    /// subscriber. The first value, terminal values and errors bypass it.
    pub throttle_interval: Duration,
}

impl MonitorConfig {
    /// Set the throttle interval.
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
        }
    }
}
