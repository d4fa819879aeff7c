// SPDX-License-Identifier: LGPL-3.0-only
//! Error types for download status sources.

use crate::resource::ResourceId;
use thiserror::Error;

/// Errors reported by a [`DownloadStatusSource`](crate::source::DownloadStatusSource).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The backend could not be reached.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend does not know the resource.
    #[error("Resource not found: {0}")]
    NotFound(ResourceId),

    /// Any other backend-reported failure.
    #[error("Backend error: {0}")]
    Backend(String),
}
