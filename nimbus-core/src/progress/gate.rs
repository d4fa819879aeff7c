// SPDX-License-Identifier: LGPL-3.0-only
use crate::status::DownloadStatus;

/// Keeps the progress a subscriber has seen non-decreasing.
///
/// Backends may report progress out of order. Within one fetch attempt a value
/// lower than the last delivered one is dropped; `NotFetched` starts a new
/// attempt and resets the floor.
#[derive(Debug, Clone, Default)]
pub struct MonotonicGate {
    last_delivered: Option<DownloadStatus>,
}

impl MonotonicGate {
    /// Create a gate that has delivered nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `status` may be delivered given what was delivered before.
    pub fn admits(&self, status: &DownloadStatus) -> bool {
        match (&self.last_delivered, status) {
            (Some(last), next) if last == next => false,
            (Some(DownloadStatus::Fetching(floor)), DownloadStatus::Fetching(p)) => p >= floor,
            _ => true,
        }
    }

    /// Record that `status` was delivered.
    pub fn record(&mut self, status: &DownloadStatus) {
        self.last_delivered = Some(status.clone());
    }

    /// The last delivered status, if any.
    pub fn last(&self) -> Option<&DownloadStatus> {
        self.last_delivered.as_ref()
    }
}
