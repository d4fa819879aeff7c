// SPDX-License-Identifier: LGPL-3.0-only
#![warn(missing_docs)]

//! Download-aware thumbnails for cloud-backed files.
//!
//! `nimbus` re-exports its member crates:
//! - [`core`]: resource ids, download status, status sources and the
//!   deduplicating progress monitor.
//! - [`services`]: the two-tier thumbnail cache, generators, the
//!   materialization pipeline and settings.

pub use nimbus_core as core;
pub use nimbus_services as services;

/// A "prelude" for users of nimbus.
///
/// ```rust
/// use nimbus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        DownloadMonitor, DownloadStatus, DownloadStatusSource, MonitorConfig, ProgressCancel,
        ProgressHandle, ResourceId, SourceError, WatchHandle,
    };
    pub use crate::services::thumbnail::{ImageGenerator, ThumbnailEvent};
    pub use crate::services::{
        Bitmap, CacheConfig, GeneratorOutput, Settings, Thumbnail, ThumbnailCache, ThumbnailError,
        ThumbnailGenerator, ThumbnailPipeline, ThumbnailRequest, ThumbnailService,
    };
}
