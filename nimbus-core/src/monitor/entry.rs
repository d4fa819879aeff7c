// SPDX-License-Identifier: LGPL-3.0-only
//! Registry entries: one per watched resource.

use crate::source::WatchHandle;
use crate::status::DownloadStatus;
use tokio::sync::watch;

/// Broadcaster slot. `None` until the first status is known.
pub(crate) type StatusSlot = Option<DownloadStatus>;

/// State for one resource in the registry.
///
/// Exists iff `ref_count > 0`; the registry removes it (and cancels the watch)
/// in the same critical section that drops the count to zero.
pub(crate) struct Entry {
    pub(crate) generation: u64,
    pub(crate) ref_count: usize,
    pub(crate) sender: watch::Sender<StatusSlot>,
    pub(crate) watch: Option<Box<dyn WatchHandle>>,
    /// References handed to raw `unsubscribe` by detached handles.
    pub(crate) detached: usize,
    resident: bool,
}

impl Entry {
    pub(crate) fn new(generation: u64) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            generation,
            ref_count: 1,
            sender,
            watch: None,
            detached: 0,
            resident: false,
        }
    }

    /// Whether a status has been published yet.
    pub(crate) fn is_seeded(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub(crate) fn last_status(&self) -> StatusSlot {
        self.sender.borrow().clone()
    }

    /// Publish `status` to every receiver. Returns `false` if it was dropped.
    ///
    /// Once the resource is resident, late `Fetching` reports from the same
    /// attempt are stale and dropped. `NotFetched` opens a new attempt.
    pub(crate) fn publish(&mut self, status: DownloadStatus) -> bool {
        let status = status.clamped();
        match &status {
            DownloadStatus::Fetching(_) if self.resident => return false,
            DownloadStatus::NotFetched => self.resident = false,
            DownloadStatus::Local | DownloadStatus::Fetched => self.resident = true,
            _ => {},
        }
        self.sender.send_replace(Some(status));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_fetching_after_fetched_is_dropped() {
        let mut entry = Entry::new(0);
        let rx = entry.sender.subscribe();

        assert!(entry.publish(DownloadStatus::fetching(0.5)));
        assert!(entry.publish(DownloadStatus::Fetched));
        assert!(!entry.publish(DownloadStatus::fetching(0.7)));
        assert_eq!(*rx.borrow(), Some(DownloadStatus::Fetched));

        assert!(entry.publish(DownloadStatus::NotFetched));
        assert!(entry.publish(DownloadStatus::fetching(0.1)));
        assert_eq!(*rx.borrow(), Some(DownloadStatus::Fetching(0.1)));
    }
}
