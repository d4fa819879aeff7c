// SPDX-License-Identifier: LGPL-3.0-only
//! Download status model.

use std::fmt;

/// Residency of a resource as reported by a Download Status Source.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    /// The bytes are local and the file is not backed by a remote store.
    Local,
    /// The file lives remotely and has not been fetched.
    NotFetched,
    /// A fetch is in flight. Progress is always within `[0, 1]`.
    Fetching(f64),
    /// The remote file has been fetched and is resident.
    Fetched,
    /// The fetch failed or the backend could not be reached.
    Failed(String),
}

impl DownloadStatus {
    /// Build a `Fetching` status, clamping `progress` into `[0, 1]`.
    pub fn fetching(progress: f64) -> Self {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        Self::Fetching(progress)
    }

    /// Re-clamp a status that may have been constructed directly.
    pub fn clamped(self) -> Self {
        match self {
            Self::Fetching(p) => Self::fetching(p),
            other => other,
        }
    }

    /// Whether the bytes are available locally.
    pub fn is_resident(&self) -> bool {
        matches!(self, Self::Local | Self::Fetched)
    }

    /// Whether no further progress is expected for the current attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Local | Self::Fetched | Self::Failed(_))
    }

    /// Whether this is a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Progress as a fraction, or `None` for failures.
    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::Local | Self::Fetched => Some(1.0),
            Self::NotFetched => Some(0.0),
            Self::Fetching(p) => Some(*p),
            Self::Failed(_) => None,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::NotFetched => write!(f, "not fetched"),
            Self::Fetching(p) => write!(f, "fetching ({:.0}%)", p * 100.0),
            Self::Fetched => write!(f, "fetched"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetching_is_clamped() {
        assert_eq!(DownloadStatus::fetching(1.7), DownloadStatus::Fetching(1.0));
        assert_eq!(DownloadStatus::fetching(-0.2), DownloadStatus::Fetching(0.0));
        assert_eq!(DownloadStatus::fetching(f64::NAN), DownloadStatus::Fetching(0.0));
        assert_eq!(
            DownloadStatus::Fetching(3.0).clamped(),
            DownloadStatus::Fetching(1.0)
        );
    }

    #[test]
    fn test_classification() {
        assert!(DownloadStatus::Local.is_resident());
        assert!(DownloadStatus::Fetched.is_terminal());
        assert!(!DownloadStatus::fetching(0.5).is_terminal());
        assert!(DownloadStatus::Failed("offline".into()).is_terminal());
        assert_eq!(DownloadStatus::Failed("x".into()).progress(), None);
        assert_eq!(DownloadStatus::NotFetched.progress(), Some(0.0));
    }
}
