// SPDX-License-Identifier: LGPL-3.0-only
//! Stable resource identity.
//!
//! A [`ResourceId`] is the single correlation key shared by the progress
//! multiplexer and the thumbnail cache. Two spellings of the same local file
//! must produce the same id, so paths are absolutized and lexically normalized
//! before being turned into a `file://` URI.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const FILE_SCHEME: &str = "file://";

/// Opaque, stable identity for a file (its canonical location).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    /// Build an id from a filesystem path.
    ///
    /// Relative paths are resolved against the current directory and `.`/`..`
    /// components are folded away without touching the filesystem (the file
    /// may not be resident yet, so canonicalization is not an option).
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("/"))
                .join(path)
        };

        let normalized = normalize(&absolute);
        let path_str = normalized.to_string_lossy();
        let encoded = urlencoding::encode(&path_str);
        Self(Arc::from(format!("{}{}", FILE_SCHEME, encoded)))
    }

    /// Wrap an opaque backend identifier as-is.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self(Arc::from(uri.into()))
    }

    /// The URI form of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode a `file://` id back into a path. Returns `None` for other schemes.
    pub fn to_path(&self) -> Option<PathBuf> {
        let encoded = self.0.strip_prefix(FILE_SCHEME)?;
        let decoded = urlencoding::decode(encoded).ok()?;
        Some(PathBuf::from(decoded.as_ref()))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

impl From<&Path> for ResourceId {
    fn from(path: &Path) -> Self {
        Self::from_path(path)
    }
}

impl From<PathBuf> for ResourceId {
    fn from(path: PathBuf) -> Self {
        Self::from_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_paths_produce_equal_ids() {
        let a = ResourceId::from_path("/home/user/Pictures/cat.png");
        let b = ResourceId::from_path("/home/user/./Documents/../Pictures/cat.png");
        assert_eq!(a, b);
    }

    #[test]
    fn test_path_round_trip_with_spaces() {
        let id = ResourceId::from_path("/tmp/holiday photos/beach 01.jpg");
        assert!(id.as_str().starts_with("file://"));
        assert!(!id.as_str().contains(' '));
        assert_eq!(
            id.to_path(),
            Some(PathBuf::from("/tmp/holiday photos/beach 01.jpg"))
        );
    }

    #[test]
    fn test_opaque_uri_has_no_path() {
        let id = ResourceId::from_uri("drive://folder/123");
        assert_eq!(id.as_str(), "drive://folder/123");
        assert_eq!(id.to_path(), None);
    }

    #[test]
    fn test_relative_path_is_absolutized() {
        let id = ResourceId::from_path("some/file.txt");
        let path = id.to_path().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("some/file.txt"));
    }
}
