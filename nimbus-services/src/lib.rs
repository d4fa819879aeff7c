// SPDX-License-Identifier: LGPL-3.0-only
//! Thumbnail services for nimbus: the two-tier thumbnail cache, thumbnail
//! generation, and the materialization pipeline that waits for cloud-backed
//! files to become resident before generating their thumbnails.

pub mod config;
pub mod io_helpers;
pub mod service;
pub mod settings;
pub mod thumbnail;

pub use config::CacheConfig;
pub use service::ThumbnailService;
pub use settings::Settings;
pub use thumbnail::{
    Bitmap, CacheKey, GeneratorOutput, Thumbnail, ThumbnailCache, ThumbnailError,
    ThumbnailGenerator, ThumbnailPipeline, ThumbnailRequest,
};
