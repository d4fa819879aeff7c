// SPDX-License-Identifier: LGPL-3.0-only
//! Top-level entry point wiring the pieces together.

use crate::settings::Settings;
use crate::thumbnail::{
    ThumbnailCache, ThumbnailEvent, ThumbnailGenerator, ThumbnailPipeline, ThumbnailRequest,
};
use futures::stream::BoxStream;
use nimbus_core::{DownloadMonitor, DownloadStatusSource, ProgressCancel, ResourceId};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Thumbnails and download progress for cloud-backed files.
///
/// Must be created inside a tokio runtime: the cache starts its disk worker
/// on construction.
#[derive(Clone)]
pub struct ThumbnailService {
    pipeline: ThumbnailPipeline,
}

impl ThumbnailService {
    /// Build the service from `settings`.
    pub fn new(
        source: Arc<dyn DownloadStatusSource>,
        generator: Arc<dyn ThumbnailGenerator>,
        settings: &Settings,
    ) -> Self {
        let monitor = DownloadMonitor::new(source, settings.monitor_config());
        let cache = Arc::new(ThumbnailCache::new(settings.cache_config()));
        log::info!("Thumbnail service ready (cache at {:?})", cache.config().root);
        Self {
            pipeline: ThumbnailPipeline::new(cache, monitor, generator),
        }
    }

    /// Request a thumbnail of `id` fitting in `size` x `size` pixels.
    pub fn request_thumbnail(&self, id: ResourceId, size: u32) -> ThumbnailRequest {
        self.pipeline.request_thumbnail(id, size)
    }

    /// Follow the download progress of `id` as fractions in `[0, 1]`.
    pub async fn subscribe_progress(&self, id: ResourceId) -> (ProgressCancel, BoxStream<'static, f64>) {
        self.pipeline.monitor().subscribe_progress(id).await
    }

    /// Subscribe to thumbnail ready/failed events.
    pub fn events(&self) -> broadcast::Receiver<ThumbnailEvent> {
        self.pipeline.subscribe()
    }

    /// The materialization pipeline.
    pub fn pipeline(&self) -> &ThumbnailPipeline {
        &self.pipeline
    }

    /// The thumbnail cache.
    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        self.pipeline.cache()
    }

    /// The download monitor.
    pub fn monitor(&self) -> &DownloadMonitor {
        self.pipeline.monitor()
    }
}
