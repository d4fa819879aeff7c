// SPDX-License-Identifier: LGPL-3.0-only
//! The Download Status Source boundary.
//!
//! A source knows how a storage backend reports residency. It can be queried,
//! asked to start fetching, and watched for changes. Whether it is push or poll
//! driven is up to the implementation; the monitor only relies on this trait.

use crate::error::SourceError;
use crate::resource::ResourceId;
use crate::status::DownloadStatus;
use async_trait::async_trait;
use std::sync::Arc;

pub mod memory;
pub mod polling;

pub use memory::InMemorySource;
pub use polling::{PollingSource, StatusProbe};

/// Callback invoked by a watch for every status change or watch error.
///
/// May be called from any thread. An `Err` ends the watch.
pub type StatusCallback = Arc<dyn Fn(Result<DownloadStatus, SourceError>) + Send + Sync>;

/// Handle to a running watch. Cancelling stops all further callbacks.
pub trait WatchHandle: Send {
    /// Stop the watch.
    fn cancel(self: Box<Self>);
}

/// A backend that can report download status for resources.
#[async_trait]
pub trait DownloadStatusSource: Send + Sync + 'static {
    /// Query the current status. May cost a backend round-trip.
    async fn current_status(&self, id: &ResourceId) -> Result<DownloadStatus, SourceError>;

    /// Ask the backend to start fetching.
    ///
    /// Must be a no-op if the resource is already fetching or fetched.
    async fn begin_fetch(&self, id: &ResourceId) -> Result<(), SourceError>;

    /// Start watching a resource for status changes.
    fn watch(
        &self,
        id: &ResourceId,
        on_update: StatusCallback,
    ) -> Result<Box<dyn WatchHandle>, SourceError>;
}
