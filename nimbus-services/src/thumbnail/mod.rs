// SPDX-License-Identifier: LGPL-3.0-only
//! Thumbnail generation and caching system.
//!
//! Thumbnails are cached in two tiers: a bounded in-memory LRU for hot
//! lookups and a bounded on-disk tier that survives restarts. The disk tier
//! follows the freedesktop.org naming scheme (`md5(uri).png`) inside one
//! directory per requested size.

use nimbus_core::ResourceId;

pub mod bitmap;
pub mod cache;
pub mod disk_cache;
pub mod error;
pub mod events;
pub mod executor;
pub mod image_cache;
pub mod image_generator;
pub mod key;
pub mod pipeline;

pub use bitmap::Bitmap;
pub use cache::{CacheStats, ThumbnailCache};
pub use disk_cache::{DiskCache, SweepReport};
pub use error::ThumbnailError;
pub use events::ThumbnailEvent;
pub use image_cache::ThumbnailImageCache;
pub use image_generator::ImageGenerator;
pub use key::CacheKey;
pub use pipeline::{ThumbnailPipeline, ThumbnailRequest};

/// Largest thumbnail edge, in pixels, the pipeline renders.
pub const MAX_THUMBNAIL_SIZE: u32 = 1024;

/// What a [`ThumbnailGenerator`] produced.
///
/// Only [`GeneratorOutput::Content`] is ever written to the cache.
#[derive(Debug, Clone)]
pub enum GeneratorOutput {
    /// A thumbnail rendered from the file's real content.
    Content(Bitmap),
    /// Rendered from the file but degraded (e.g. a partial decode); shown, not cached.
    Placeholder(Bitmap),
    /// No generator handles this file; a generic icon to display instead.
    Fallback(Bitmap),
}

/// Result of a thumbnail request.
#[derive(Debug, Clone)]
pub enum Thumbnail {
    /// Served from the cache.
    Cached(Bitmap),
    /// Freshly generated; `cacheable` tells whether it was stored.
    Generated {
        /// The generated pixels.
        bitmap: Bitmap,
        /// Whether the bitmap came from real content and was cached.
        cacheable: bool,
    },
    /// Generic icon; never cached.
    Fallback(Bitmap),
}

impl Thumbnail {
    /// The pixels to display.
    pub fn bitmap(&self) -> &Bitmap {
        match self {
            Self::Cached(bitmap) | Self::Fallback(bitmap) => bitmap,
            Self::Generated { bitmap, .. } => bitmap,
        }
    }

    /// Consume the result and keep the pixels.
    pub fn into_bitmap(self) -> Bitmap {
        match self {
            Self::Cached(bitmap) | Self::Fallback(bitmap) => bitmap,
            Self::Generated { bitmap, .. } => bitmap,
        }
    }

    /// Whether this is a generic fallback icon.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Produces thumbnail pixels for resident files.
///
/// Implementations decode images, grab video frames or extract artwork; the
/// pipeline only calls them once the file's bytes are local.
#[async_trait::async_trait]
pub trait ThumbnailGenerator: Send + Sync + 'static {
    /// Generate a thumbnail fitting in `size` x `size` pixels.
    async fn generate(&self, id: &ResourceId, size: u32) -> Result<GeneratorOutput, ThumbnailError>;
}
