// SPDX-License-Identifier: LGPL-3.0-only
#![warn(missing_docs)]

//! Core building blocks for nimbus: resource identity, the download status
//! model, the Download Status Source boundary and the progress multiplexer
//! that fans backend status out to any number of subscribers.

pub mod config;
pub mod error;
pub mod monitor;
pub mod progress;
pub mod resource;
pub mod source;
pub mod status;

pub use config::MonitorConfig;
pub use error::SourceError;
pub use monitor::{DownloadMonitor, ProgressCancel, ProgressHandle};
pub use resource::ResourceId;
pub use source::{DownloadStatusSource, StatusCallback, WatchHandle};
pub use status::DownloadStatus;
