// SPDX-License-Identifier: LGPL-3.0-only
//! Materialization pipeline.
//!
//! Turns `(id, size)` into a displayable thumbnail, waiting for cloud-backed
//! files to become resident before generating:
//!
//! ```text
//! CheckingCache --hit--> done
//!       | miss
//! CheckingResidency --local/fetched--> Generating --> done
//!       | not fetched / fetching
//! AwaitingFetch --fetched--> Generating
//! ```
//!
//! Any stage may fail. Only thumbnails rendered from real content are cached.

use crate::thumbnail::cache::ThumbnailCache;
use crate::thumbnail::error::ThumbnailError;
use crate::thumbnail::events::{create_thumbnail_event_channel, ThumbnailEvent};
use crate::thumbnail::key::CacheKey;
use crate::thumbnail::{GeneratorOutput, Thumbnail, ThumbnailGenerator, MAX_THUMBNAIL_SIZE};
use nimbus_core::{DownloadMonitor, DownloadStatus, DownloadStatusSource, ResourceId, SourceError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    CheckingCache,
    CheckingResidency,
    AwaitingFetch,
    Generating,
}

struct Inner {
    cache: Arc<ThumbnailCache>,
    monitor: DownloadMonitor,
    generator: Arc<dyn ThumbnailGenerator>,
    event_tx: broadcast::Sender<ThumbnailEvent>,
}

/// Orchestrates cache, download monitor and generator.
///
/// Cloning is cheap; clones share everything.
#[derive(Clone)]
pub struct ThumbnailPipeline {
    inner: Arc<Inner>,
}

impl ThumbnailPipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        cache: Arc<ThumbnailCache>,
        monitor: DownloadMonitor,
        generator: Arc<dyn ThumbnailGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                monitor,
                generator,
                event_tx: create_thumbnail_event_channel(),
            }),
        }
    }

    /// Materialize a thumbnail in the background.
    ///
    /// Dropping or cancelling the returned request abandons the work; a
    /// pending download subscription is released exactly once.
    pub fn request_thumbnail(&self, id: ResourceId, size: u32) -> ThumbnailRequest {
        let pipeline = self.clone();
        ThumbnailRequest {
            task: tokio::spawn(async move { pipeline.materialize(id, size).await }),
        }
    }

    /// Materialize a thumbnail on the current task.
    pub async fn materialize(&self, id: ResourceId, size: u32) -> Result<Thumbnail, ThumbnailError> {
        let key = CacheKey::new(id, size);
        let result = self.run(&key).await;

        let event = match &result {
            Ok(thumbnail) => ThumbnailEvent::ThumbnailReady {
                id: key.id.clone(),
                size,
                cached: matches!(thumbnail, Thumbnail::Cached(_)),
            },
            Err(e) if e.is_cancelled() => return result,
            Err(e) => {
                log::warn!("Thumbnail for {} at {} failed: {}", key.id, size, e);
                ThumbnailEvent::ThumbnailFailed {
                    id: key.id.clone(),
                    size,
                    error: e.to_string(),
                }
            },
        };
        let _ = self.inner.event_tx.send(event);
        result
    }

    /// Subscribe to thumbnail events.
    pub fn subscribe(&self) -> broadcast::Receiver<ThumbnailEvent> {
        self.inner.event_tx.subscribe()
    }

    /// The thumbnail cache.
    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        &self.inner.cache
    }

    /// The download monitor.
    pub fn monitor(&self) -> &DownloadMonitor {
        &self.inner.monitor
    }

    async fn run(&self, key: &CacheKey) -> Result<Thumbnail, ThumbnailError> {
        if key.size > MAX_THUMBNAIL_SIZE {
            return Err(ThumbnailError::GenerationFailed(format!(
                "requested size {} exceeds the {} pixel limit",
                key.size, MAX_THUMBNAIL_SIZE
            )));
        }

        let mut stage = Stage::CheckingCache;
        loop {
            log::trace!("{} at {}: {:?}", key.id, key.size, stage);
            stage = match stage {
                Stage::CheckingCache => match self.inner.cache.get(key).await {
                    Some(bitmap) => return Ok(Thumbnail::Cached(bitmap)),
                    None => Stage::CheckingResidency,
                },
                Stage::CheckingResidency => match self.residency(&key.id).await? {
                    status if status.is_resident() => Stage::Generating,
                    DownloadStatus::Failed(reason) => return Err(ThumbnailError::FetchFailed(reason)),
                    _ => Stage::AwaitingFetch,
                },
                Stage::AwaitingFetch => {
                    // The handle unsubscribes when it goes out of scope, on
                    // every path including task abort.
                    let mut handle = self.inner.monitor.subscribe(key.id.clone()).await;
                    match handle.wait_terminal().await {
                        Some(status) if status.is_resident() => Stage::Generating,
                        Some(DownloadStatus::Failed(reason)) => {
                            return Err(ThumbnailError::FetchFailed(reason))
                        },
                        _ => {
                            return Err(ThumbnailError::FetchFailed(format!(
                                "watch on {} ended before the file was fetched",
                                key.id
                            )))
                        },
                    }
                },
                Stage::Generating => return self.generate(key).await,
            };
        }
    }

    /// Known residency of `id`: the monitor's last broadcast if it is
    /// tracking the resource, otherwise a fresh query.
    async fn residency(&self, id: &ResourceId) -> Result<DownloadStatus, ThumbnailError> {
        if let Some(status) = self.inner.monitor.last_status(id) {
            return Ok(status);
        }
        self.inner
            .monitor
            .source()
            .current_status(id)
            .await
            .map_err(|e| match e {
                SourceError::Unavailable(reason) => ThumbnailError::BackendUnavailable(reason),
                other => ThumbnailError::FetchFailed(other.to_string()),
            })
    }

    async fn generate(&self, key: &CacheKey) -> Result<Thumbnail, ThumbnailError> {
        let output = self.inner.generator.generate(&key.id, key.size).await?;
        Ok(match output {
            GeneratorOutput::Content(bitmap) => {
                self.inner.cache.put(key.clone(), bitmap.clone());
                Thumbnail::Generated {
                    bitmap,
                    cacheable: true,
                }
            },
            GeneratorOutput::Placeholder(bitmap) => Thumbnail::Generated {
                bitmap,
                cacheable: false,
            },
            GeneratorOutput::Fallback(bitmap) => Thumbnail::Fallback(bitmap),
        })
    }
}

/// An in-flight thumbnail request.
///
/// Resolves to the thumbnail, or to [`ThumbnailError::Cancelled`] once
/// cancelled. Dropping it cancels the work.
pub struct ThumbnailRequest {
    task: JoinHandle<Result<Thumbnail, ThumbnailError>>,
}

impl ThumbnailRequest {
    /// Abandon the request. Idempotent.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// A handle that can cancel the request without owning it.
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    /// Whether the request has completed, failed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for ThumbnailRequest {
    type Output = Result<Thumbnail, ThumbnailError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) if e.is_cancelled() => Poll::Ready(Err(ThumbnailError::Cancelled)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(ThumbnailError::GenerationFailed(format!(
                "Task execution error: {}",
                e
            )))),
        }
    }
}

impl Drop for ThumbnailRequest {
    fn drop(&mut self) {
        self.task.abort();
    }
}
