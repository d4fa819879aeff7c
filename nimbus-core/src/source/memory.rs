// SPDX-License-Identifier: LGPL-3.0-only
//! A manually driven, in-memory Download Status Source.
//!
//! Useful for embedders whose backend pushes status into the process through
//! some other channel, and for exercising the monitor without a real backend.

use super::{DownloadStatusSource, StatusCallback, WatchHandle};
use crate::error::SourceError;
use crate::resource::ResourceId;
use crate::status::DownloadStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

struct Inner {
    statuses: Mutex<HashMap<ResourceId, DownloadStatus>>,
    watchers: Mutex<HashMap<ResourceId, Vec<(u64, StatusCallback)>>>,
    next_watch_id: AtomicU64,
    available: AtomicBool,
    auto_fetch: AtomicBool,
    default_status: DownloadStatus,
    watch_calls: AtomicUsize,
    begin_fetch_calls: AtomicUsize,
}

impl Inner {
    fn statuses(&self) -> MutexGuard<'_, HashMap<ResourceId, DownloadStatus>> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watchers(&self) -> MutexGuard<'_, HashMap<ResourceId, Vec<(u64, StatusCallback)>>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks_for(&self, id: &ResourceId) -> Vec<StatusCallback> {
        self.watchers()
            .get(id)
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SourceError::Unavailable("in-memory source is offline".to_string()))
        }
    }
}

/// In-memory source whose statuses are set by the embedder.
///
/// Unknown resources report the default status ([`DownloadStatus::Local`]
/// unless overridden with [`InMemorySource::with_default_status`]).
#[derive(Clone)]
pub struct InMemorySource {
    inner: Arc<Inner>,
}

impl InMemorySource {
    /// Create an empty source. `begin_fetch` moves `NotFetched` resources to
    /// `Fetching(0.0)` by default.
    pub fn new() -> Self {
        Self::with_default_status(DownloadStatus::Local)
    }

    /// Create an empty source that reports `status` for unknown resources.
    pub fn with_default_status(status: DownloadStatus) -> Self {
        Self {
            inner: Arc::new(Inner {
                statuses: Mutex::new(HashMap::new()),
                watchers: Mutex::new(HashMap::new()),
                next_watch_id: AtomicU64::new(0),
                available: AtomicBool::new(true),
                auto_fetch: AtomicBool::new(true),
                default_status: status,
                watch_calls: AtomicUsize::new(0),
                begin_fetch_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Enable or disable the `NotFetched` -> `Fetching(0.0)` transition on `begin_fetch`.
    pub fn set_auto_fetch(&self, enabled: bool) {
        self.inner.auto_fetch.store(enabled, Ordering::Release);
    }

    /// Simulate the backend going offline (or coming back).
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    /// Record a new status and push it to every live watcher of `id`.
    pub fn set_status(&self, id: &ResourceId, status: DownloadStatus) {
        let status = status.clamped();
        self.inner.statuses().insert(id.clone(), status.clone());

        for callback in self.inner.callbacks_for(id) {
            callback(Ok(status.clone()));
        }
    }

    /// Report a watch error for `id`. All watches for `id` end.
    pub fn fail(&self, id: &ResourceId, error: SourceError) {
        let callbacks = self.inner.callbacks_for(id);
        self.inner.watchers().remove(id);

        for callback in callbacks {
            callback(Err(error.clone()));
        }
    }

    /// Number of `watch` calls made so far (successful or not).
    pub fn watch_calls(&self) -> usize {
        self.inner.watch_calls.load(Ordering::Acquire)
    }

    /// Number of `begin_fetch` calls made so far.
    pub fn begin_fetch_calls(&self) -> usize {
        self.inner.begin_fetch_calls.load(Ordering::Acquire)
    }

    /// Number of watches on `id` that have not been cancelled.
    pub fn active_watches(&self, id: &ResourceId) -> usize {
        self.inner.watchers().get(id).map_or(0, Vec::len)
    }

    /// Number of live watches across all resources.
    pub fn total_active_watches(&self) -> usize {
        self.inner.watchers().values().map(Vec::len).sum()
    }

    fn status_of(&self, id: &ResourceId) -> DownloadStatus {
        self.inner
            .statuses()
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.inner.default_status.clone())
    }
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DownloadStatusSource for InMemorySource {
    async fn current_status(&self, id: &ResourceId) -> Result<DownloadStatus, SourceError> {
        self.inner.check_available()?;
        Ok(self.status_of(id))
    }

    async fn begin_fetch(&self, id: &ResourceId) -> Result<(), SourceError> {
        self.inner.begin_fetch_calls.fetch_add(1, Ordering::AcqRel);
        self.inner.check_available()?;

        if self.inner.auto_fetch.load(Ordering::Acquire)
            && self.status_of(id) == DownloadStatus::NotFetched
        {
            self.set_status(id, DownloadStatus::fetching(0.0));
        }
        Ok(())
    }

    fn watch(
        &self,
        id: &ResourceId,
        on_update: StatusCallback,
    ) -> Result<Box<dyn WatchHandle>, SourceError> {
        self.inner.watch_calls.fetch_add(1, Ordering::AcqRel);
        self.inner.check_available()?;

        let watch_id = self.inner.next_watch_id.fetch_add(1, Ordering::AcqRel);
        self.inner
            .watchers()
            .entry(id.clone())
            .or_default()
            .push((watch_id, on_update));

        Ok(Box::new(InMemoryWatch {
            inner: Arc::downgrade(&self.inner),
            id: id.clone(),
            watch_id,
        }))
    }
}

struct InMemoryWatch {
    inner: Weak<Inner>,
    id: ResourceId,
    watch_id: u64,
}

impl WatchHandle for InMemoryWatch {
    fn cancel(self: Box<Self>) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut watchers = inner.watchers();
        if let Some(list) = watchers.get_mut(&self.id) {
            list.retain(|(watch_id, _)| *watch_id != self.watch_id);
            if list.is_empty() {
                watchers.remove(&self.id);
            }
        }
    }
}
