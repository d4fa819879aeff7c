// SPDX-License-Identifier: LGPL-3.0-only
//! Download progress multiplexer.
//!
//! [`DownloadMonitor`] deduplicates backend watches: no matter how many
//! callers subscribe to a resource, exactly one watch runs against the
//! [`DownloadStatusSource`]. Subscribers are reference counted; the watch is
//! cancelled and the registry entry removed when the last one goes away.
//!
//! Each entry broadcasts through a `tokio::sync::watch` channel that keeps the
//! last known status, so a late subscriber starts from the current value
//! instead of waiting for the next backend event.

mod entry;
mod handle;

pub use handle::{ProgressCancel, ProgressHandle};

use crate::config::MonitorConfig;
use crate::error::SourceError;
use crate::resource::ResourceId;
use crate::source::{DownloadStatusSource, StatusCallback, WatchHandle};
use crate::status::DownloadStatus;
use entry::Entry;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State shared between the monitor, its handles and watch callbacks.
pub(crate) struct Shared {
    source: Arc<dyn DownloadStatusSource>,
    registry: Mutex<HashMap<ResourceId, Entry>>,
    next_generation: AtomicU64,
    config: MonitorConfig,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, HashMap<ResourceId, Entry>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route a watch report to the entry it was started for.
    ///
    /// Reports for a generation that has been torn down are dropped, so a
    /// callback racing with teardown can never reach a newer entry.
    fn deliver(&self, id: &ResourceId, generation: u64, update: Result<DownloadStatus, SourceError>) {
        let ended = {
            let mut registry = self.registry();
            let Some(entry) = registry.get_mut(id).filter(|e| e.generation == generation) else {
                log::trace!("Dropping report for torn down watch on {}", id);
                return;
            };

            let status = match update {
                Ok(status) => status,
                Err(e) => {
                    log::error!("Watch on {} failed: {}", id, e);
                    DownloadStatus::Failed(e.to_string())
                },
            };

            if !status.is_failed() {
                if !entry.publish(status) {
                    log::trace!("Dropped stale progress for {}", id);
                }
                return;
            }

            entry.publish(status);
            registry.remove(id)
        };

        if let Some(mut entry) = ended {
            log::debug!("Tearing down watch on {} after failure", id);
            if let Some(watch) = entry.watch.take() {
                watch.cancel();
            }
        }
    }

    /// Publish the queried status unless the watch already reported something newer.
    ///
    /// Returns `false` when the entry is gone, i.e. every subscriber has left.
    fn seed(&self, id: &ResourceId, generation: u64, status: DownloadStatus) -> bool {
        let mut registry = self.registry();
        let Some(entry) = registry.get_mut(id).filter(|e| e.generation == generation) else {
            return false;
        };
        if !entry.is_seeded() {
            entry.publish(status);
        }
        true
    }

    /// Drop the reference held by a handle of `generation`.
    fn release(&self, id: &ResourceId, generation: u64) {
        self.drop_reference(id, |entry| {
            if entry.generation != generation {
                log::trace!("Release for stale generation of {} ignored", id);
                return false;
            }
            true
        });
    }

    /// Move a handle's reference over to the raw `unsubscribe` path.
    fn detach(&self, id: &ResourceId, generation: u64) {
        let mut registry = self.registry();
        if let Some(entry) = registry.get_mut(id).filter(|e| e.generation == generation) {
            entry.detached += 1;
        }
    }

    /// Drop one detached reference, if the current entry has any.
    fn release_detached(&self, id: &ResourceId) {
        self.drop_reference(id, |entry| {
            if entry.detached == 0 {
                log::trace!("Unsubscribe for {} without a detached reference ignored", id);
                return false;
            }
            entry.detached -= 1;
            true
        });
    }

    /// Decrement the entry for `id` if `claim` accepts it, tearing it down at zero.
    fn drop_reference(&self, id: &ResourceId, claim: impl FnOnce(&mut Entry) -> bool) {
        let removed = {
            let mut registry = self.registry();
            let Some(entry) = registry.get_mut(id) else {
                log::trace!("Release for untracked {} ignored", id);
                return;
            };
            if !claim(entry) {
                return;
            }

            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count > 0 {
                return;
            }
            registry.remove(id)
        };

        if let Some(mut entry) = removed {
            log::debug!("Last subscriber of {} left, cancelling watch", id);
            if let Some(watch) = entry.watch.take() {
                watch.cancel();
            }
        }
    }

    /// Start the single backend watch for a freshly created entry.
    async fn start(self: Arc<Self>, id: ResourceId, generation: u64) {
        let weak = Arc::downgrade(&self);
        let callback_id = id.clone();
        let callback: StatusCallback = Arc::new(move |update| {
            if let Some(shared) = weak.upgrade() {
                shared.deliver(&callback_id, generation, update);
            }
        });

        let watch = match self.source.watch(&id, callback) {
            Ok(watch) => watch,
            Err(e) => {
                self.deliver(&id, generation, Err(e));
                return;
            },
        };

        if let Some(orphan) = self.attach(&id, generation, watch) {
            log::debug!("Subscribers of {} left before the watch started", id);
            orphan.cancel();
            return;
        }

        match self.source.current_status(&id).await {
            Ok(DownloadStatus::NotFetched) => {
                if !self.seed(&id, generation, DownloadStatus::NotFetched) {
                    log::debug!("Subscribers of {} left before a fetch was requested", id);
                    return;
                }
                log::debug!("Requesting fetch of {}", id);
                if let Err(e) = self.source.begin_fetch(&id).await {
                    self.deliver(&id, generation, Err(e));
                }
            },
            Ok(status) if status.is_failed() => self.deliver(&id, generation, Ok(status)),
            Ok(status) => {
                self.seed(&id, generation, status);
            },
            Err(e) => self.deliver(&id, generation, Err(e)),
        }
    }

    /// Store the watch on its entry. Hands it back if the entry is gone.
    fn attach(
        &self,
        id: &ResourceId,
        generation: u64,
        watch: Box<dyn WatchHandle>,
    ) -> Option<Box<dyn WatchHandle>> {
        let mut registry = self.registry();
        match registry.get_mut(id) {
            Some(entry) if entry.generation == generation => {
                entry.watch = Some(watch);
                None
            },
            _ => Some(watch),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let registry = self.registry.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (id, mut entry) in registry.drain() {
            log::debug!("Monitor dropped, cancelling watch on {}", id);
            if let Some(watch) = entry.watch.take() {
                watch.cancel();
            }
        }
    }
}

/// Deduplicating, reference-counted progress multiplexer.
///
/// Cloning is cheap and every clone shares one registry.
#[derive(Clone)]
pub struct DownloadMonitor {
    shared: Arc<Shared>,
}

impl DownloadMonitor {
    /// Create a monitor over `source`.
    pub fn new(source: Arc<dyn DownloadStatusSource>, config: MonitorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                registry: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Register interest in `id`.
    ///
    /// The first subscriber creates the entry and starts the backend watch
    /// (requesting a fetch when the resource is `NotFetched`); later ones join
    /// the existing broadcaster and see its last known status right away.
    /// The returned handle releases its reference when cancelled or dropped.
    pub async fn subscribe(&self, id: ResourceId) -> ProgressHandle {
        let (generation, rx, created) = {
            let mut registry = self.shared.registry();
            match registry.get_mut(&id) {
                Some(entry) => {
                    entry.ref_count += 1;
                    log::trace!("Joined watch on {} ({} subscribers)", id, entry.ref_count);
                    (entry.generation, entry.sender.subscribe(), false)
                },
                None => {
                    let generation = self.shared.next_generation.fetch_add(1, Ordering::AcqRel);
                    let entry = Entry::new(generation);
                    let rx = entry.sender.subscribe();
                    registry.insert(id.clone(), entry);
                    log::debug!("Starting watch on {}", id);
                    (generation, rx, true)
                },
            }
        };

        let handle = ProgressHandle::new(
            Arc::downgrade(&self.shared),
            id.clone(),
            generation,
            rx,
            self.shared.config.throttle_interval,
        );

        if created {
            // Spawned so that dropping this future midway cannot strand other
            // subscribers on an entry whose watch never started.
            let start = tokio::spawn(self.shared.clone().start(id, generation));
            if let Err(e) = start.await {
                log::error!("Watch start task failed: {}", e);
            }
        }

        handle
    }

    /// Release a reference taken over with [`ProgressHandle::detach`].
    ///
    /// Call exactly once per detached handle. A no-op when `id` is not tracked
    /// or its current entry holds no detached reference, so duplicate or late
    /// calls (including ones arriving after a failure teardown) never take a
    /// reference that a live handle owns.
    pub fn unsubscribe(&self, id: &ResourceId) {
        self.shared.release_detached(id);
    }

    /// Subscribe and expose progress as a stream of fractions in `[0, 1]`.
    ///
    /// The stream ends after a terminal status (a failure ends it without a
    /// final value). Cancelling or dropping the stream unsubscribes.
    pub async fn subscribe_progress(&self, id: ResourceId) -> (ProgressCancel, BoxStream<'static, f64>) {
        let handle = self.subscribe(id).await;
        let cancel = handle.canceller();
        (cancel, handle.into_progress_stream())
    }

    /// Number of live subscribers for `id` (0 when untracked).
    pub fn subscriber_count(&self, id: &ResourceId) -> usize {
        self.shared.registry().get(id).map_or(0, |e| e.ref_count)
    }

    /// Whether an entry (and so a backend watch) exists for `id`.
    pub fn is_tracking(&self, id: &ResourceId) -> bool {
        self.shared.registry().contains_key(id)
    }

    /// Last status broadcast for `id`, if tracked and known.
    pub fn last_status(&self, id: &ResourceId) -> Option<DownloadStatus> {
        self.shared.registry().get(id).and_then(|e| e.last_status())
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.shared.registry().len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.shared.registry().is_empty()
    }

    /// The underlying status source.
    pub fn source(&self) -> &Arc<dyn DownloadStatusSource> {
        &self.shared.source
    }

    /// The monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }
}
