// SPDX-License-Identifier: LGPL-3.0-only
//! Event system for thumbnail notifications.

use nimbus_core::ResourceId;
use tokio::sync::broadcast;

/// Events emitted by the thumbnail pipeline.
#[derive(Debug, Clone)]
pub enum ThumbnailEvent {
    /// A thumbnail is ready to display.
    ThumbnailReady {
        /// The resource the thumbnail belongs to.
        id: ResourceId,
        /// Requested size.
        size: u32,
        /// Whether it was served from the cache rather than generated.
        cached: bool,
    },
    /// Materialization failed.
    ThumbnailFailed {
        /// The resource the thumbnail belongs to.
        id: ResourceId,
        /// Requested size.
        size: u32,
        /// Error that occurred.
        error: String,
    },
}

impl ThumbnailEvent {
    /// The resource this event is about.
    pub fn id(&self) -> &ResourceId {
        match self {
            Self::ThumbnailReady { id, .. } | Self::ThumbnailFailed { id, .. } => id,
        }
    }
}

/// Create a new broadcast channel for thumbnail events.
pub fn create_thumbnail_event_channel() -> broadcast::Sender<ThumbnailEvent> {
    broadcast::channel(100).0 // Buffer up to 100 events
}
