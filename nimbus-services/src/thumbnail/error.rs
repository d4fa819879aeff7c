// SPDX-License-Identifier: LGPL-3.0-only
//! Error types for thumbnail operations.

use thiserror::Error;

/// Errors that can occur while materializing a thumbnail.
#[derive(Error, Debug)]
pub enum ThumbnailError {
    /// The Download Status Source could not be reached.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend reported that fetching the file failed.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// Thumbnail generation failed.
    #[error("Thumbnail generation failed: {0}")]
    GenerationFailed(String),

    /// The caller withdrew interest before the thumbnail was ready.
    #[error("Thumbnail request cancelled")]
    Cancelled,

    /// Disk cache I/O failed.
    #[error("Cache I/O error: {0}")]
    CacheIo(#[from] std::io::Error),

    /// A cached file could not be encoded or decoded.
    #[error("Cache format error: {0}")]
    CacheFormat(#[from] image::ImageError),
}

impl ThumbnailError {
    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
