// SPDX-License-Identifier: LGPL-3.0-only
//! Persistent thumbnail tier.
//!
//! One PNG per cache key under the cache root. There is no index file: the
//! directory listing and file modification times are the source of truth for
//! eviction, and reads refresh the mtime so it doubles as a recency marker.

use crate::config::CacheConfig;
use crate::io_helpers;
use crate::thumbnail::bitmap::Bitmap;
use crate::thumbnail::error::ThumbnailError;
use crate::thumbnail::key::CacheKey;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Outcome of a disk sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Cache files found.
    pub scanned: usize,
    /// Cache files removed.
    pub removed: usize,
    /// Measured usage before eviction.
    pub bytes_before: u64,
    /// Usage after eviction.
    pub bytes_after: u64,
}

struct CacheFile {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

/// The on-disk thumbnail tier.
pub struct DiskCache {
    root: PathBuf,
    high_mark: u64,
    low_mark: u64,
    usage: AtomicU64,
}

impl DiskCache {
    /// Create the tier described by `config`. Nothing is touched on disk yet.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            root: config.root.clone(),
            high_mark: config.high_mark_bytes(),
            low_mark: config.low_mark_bytes(),
            usage: AtomicU64::new(0),
        }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        key.path_in(&self.root)
    }

    /// Estimated bytes on disk. Exact right after a sweep.
    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::Acquire)
    }

    /// Usage at which a sweep is due.
    pub fn high_mark(&self) -> u64 {
        self.high_mark
    }

    /// Usage a sweep evicts down to.
    pub fn low_mark(&self) -> u64 {
        self.low_mark
    }

    /// Whether estimated usage has crossed the high watermark.
    pub fn needs_sweep(&self) -> bool {
        self.usage() >= self.high_mark
    }

    /// Read and decode the entry for `key`, refreshing its recency.
    ///
    /// A file that fails to decode is removed and reported as an error.
    pub async fn read(&self, key: &CacheKey) -> Result<Option<Bitmap>, ThumbnailError> {
        let path = self.path_for(key);
        let Some(bytes) = io_helpers::read_and_touch(&path).await? else {
            return Ok(None);
        };

        let decoded = smol::unblock(move || Bitmap::decode_png(&bytes)).await;
        match decoded {
            Ok(bitmap) => Ok(Some(bitmap)),
            Err(e) => {
                log::warn!("Discarding unreadable cache file {:?}: {}", path, e);
                let _ = smol::unblock(move || fs::remove_file(path)).await;
                Err(e)
            },
        }
    }

    /// Encode and persist `bitmap` for `key`. Returns the new usage estimate.
    pub async fn write(&self, key: &CacheKey, bitmap: Bitmap) -> Result<u64, ThumbnailError> {
        let path = self.path_for(key);
        let encoded = smol::unblock(move || bitmap.encode_png()).await?;
        let written = encoded.len() as u64;

        let replaced = io_helpers::write_atomic(&path, encoded).await?.unwrap_or(0);
        let usage = self.adjust_usage(written, replaced);
        log::trace!("Persisted {:?} ({} bytes, usage {})", path, written, usage);
        Ok(usage)
    }

    fn adjust_usage(&self, added: u64, removed: u64) -> u64 {
        let mut current = self.usage.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(added).saturating_sub(removed);
            match self
                .usage
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Measure the tier and evict oldest entries down to the low watermark.
    ///
    /// Entries that vanish mid-sweep are treated as already evicted.
    ///
    /// # Arguments
    /// * `force` - Evict down to the low watermark even when usage is below
    ///   the high watermark. Without it nothing is evicted until usage reaches
    ///   the high watermark.
    ///
    /// # Returns
    /// A [`SweepReport`] with the measured usage before and after. The usage
    /// estimate is reset to the measured value. Fails only when the root
    /// cannot be listed.
    pub async fn sweep(&self, force: bool) -> Result<SweepReport, ThumbnailError> {
        let root = self.root.clone();
        let (high, low) = (self.high_mark, self.low_mark);

        let report = smol::unblock(move || -> io::Result<SweepReport> {
            let mut files = scan(&root)?;
            let bytes_before: u64 = files.iter().map(|f| f.len).sum();
            let mut report = SweepReport {
                scanned: files.len(),
                removed: 0,
                bytes_before,
                bytes_after: bytes_before,
            };

            if bytes_before <= low || (!force && bytes_before < high) {
                return Ok(report);
            }

            files.sort_by_key(|f| f.modified);
            for file in files {
                if report.bytes_after <= low {
                    break;
                }
                match fs::remove_file(&file.path) {
                    Ok(()) => report.removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {},
                    Err(e) => {
                        log::warn!("Could not evict {:?}: {}", file.path, e);
                        continue;
                    },
                }
                report.bytes_after -= file.len;
            }
            Ok(report)
        })
        .await?;

        self.usage.store(report.bytes_after, Ordering::Release);
        if report.removed > 0 {
            log::debug!(
                "Disk sweep removed {} of {} thumbnails ({} -> {} bytes)",
                report.removed,
                report.scanned,
                report.bytes_before,
                report.bytes_after
            );
        }
        Ok(report)
    }

    /// Remove every entry and recreate an empty root.
    pub async fn clear(&self) -> Result<(), ThumbnailError> {
        io_helpers::reset_dir(&self.root).await?;
        self.usage.store(0, Ordering::Release);
        log::debug!("Cleared disk thumbnail cache at {:?}", self.root);
        Ok(())
    }
}

/// List `{root}/{size}/*.png` with sizes and modification times.
fn scan(root: &Path) -> io::Result<Vec<CacheFile>> {
    let size_dirs = match fs::read_dir(root) {
        Ok(dirs) => dirs,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for size_dir in size_dirs.flatten() {
        if !size_dir.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let Ok(entries) = fs::read_dir(size_dir.path()) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            // Raced with a delete or rename; skip it.
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            files.push(CacheFile {
                path,
                len: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
    }
    Ok(files)
}
