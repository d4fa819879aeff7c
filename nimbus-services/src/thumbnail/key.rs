// SPDX-License-Identifier: LGPL-3.0-only
//! Cache keys and on-disk naming for thumbnails.
//!
//! Disk entries follow the freedesktop.org Thumbnail Managing Standard naming:
//! `{root}/{size}/{md5(uri)}.png`.

use nimbus_core::ResourceId;
use std::path::{Path, PathBuf};

/// Identity of a cached thumbnail: which resource, at which requested size.
///
/// A thumbnail generated for one size is never a hit for another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The resource the thumbnail was generated from.
    pub id: ResourceId,
    /// Requested edge length in pixels.
    pub size: u32,
}

impl CacheKey {
    /// Create a key.
    pub fn new(id: ResourceId, size: u32) -> Self {
        Self { id, size }
    }

    /// File name of the disk entry: `{md5(uri)}.png`.
    pub fn file_name(&self) -> String {
        format!("{}.png", uri_to_md5(self.id.as_str()))
    }

    /// Path of the disk entry below `root`.
    ///
    /// # Arguments
    /// * `root` - The disk cache root directory.
    ///
    /// # Returns
    /// `{root}/{size}/{md5(uri)}.png`. Nothing is created on disk.
    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(self.size.to_string()).join(self.file_name())
    }
}

/// Compute the MD5 hash of a resource URI as a hexadecimal string.
pub fn uri_to_md5(uri: &str) -> String {
    let digest = md5::compute(uri.as_bytes());
    format!("{:x}", digest)
}
