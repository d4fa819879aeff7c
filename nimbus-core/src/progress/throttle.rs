// SPDX-License-Identifier: LGPL-3.0-only
use crate::status::DownloadStatus;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of asking the throttle whether a status may be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Deliver now.
    Ready,
    /// Hold the value until `deadline`; a newer value may replace it meanwhile.
    Wait(Instant),
}

/// Rate limiter for a single subscriber.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    /// Create a throttle allowing one non-terminal update per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Decide whether `status` may be delivered at `now`.
    ///
    /// The first value, terminal values and failures are always `Ready`.
    pub fn check(&self, status: &DownloadStatus, now: Instant) -> ThrottleDecision {
        let Some(last) = self.last_emit else {
            return ThrottleDecision::Ready;
        };
        if status.is_terminal() {
            return ThrottleDecision::Ready;
        }

        let deadline = last + self.interval;
        if now >= deadline {
            ThrottleDecision::Ready
        } else {
            ThrottleDecision::Wait(deadline)
        }
    }

    /// Record a delivery at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last_emit = Some(now);
    }
}
