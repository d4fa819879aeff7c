// SPDX-License-Identifier: LGPL-3.0-only
//! Thumbnail cache configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Limits and locations for the [`ThumbnailCache`](crate::thumbnail::ThumbnailCache).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Root directory of the disk tier.
    pub root: PathBuf,
    /// Maximum number of bitmaps held in memory.
    pub memory_max_entries: usize,
    /// Maximum total pixel bytes held in memory.
    pub memory_max_bytes: usize,
    /// Disk tier ceiling in bytes.
    pub disk_max_bytes: u64,
    /// Fraction of the ceiling at which a sweep is triggered.
    pub disk_high_watermark: f64,
    /// Fraction of the ceiling a sweep evicts down to.
    pub disk_low_watermark: f64,
    /// Interval of the periodic disk sweep.
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Default configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// The per-user cache directory: `~/.cache/nimbus/thumbnails`.
    pub fn default_root() -> PathBuf {
        let cache_base = dirs::cache_dir().unwrap_or_else(|| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string())).join(".cache")
        });
        cache_base.join("nimbus").join("thumbnails")
    }

    /// Replace out-of-range watermarks with the defaults.
    ///
    /// Valid watermarks satisfy `0 < low < high <= 1`.
    pub fn validated(mut self) -> Self {
        let (low, high) = (self.disk_low_watermark, self.disk_high_watermark);
        if !(low > 0.0 && low < high && high <= 1.0) {
            log::warn!(
                "Invalid disk watermarks (low {}, high {}), using defaults",
                low,
                high
            );
            let defaults = Self::default();
            self.disk_low_watermark = defaults.disk_low_watermark;
            self.disk_high_watermark = defaults.disk_high_watermark;
        }
        self.memory_max_entries = self.memory_max_entries.max(1);
        self
    }

    /// Usage in bytes at which a sweep starts.
    pub fn high_mark_bytes(&self) -> u64 {
        (self.disk_max_bytes as f64 * self.disk_high_watermark) as u64
    }

    /// Usage in bytes a sweep evicts down to.
    pub fn low_mark_bytes(&self) -> u64 {
        (self.disk_max_bytes as f64 * self.disk_low_watermark) as u64
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            memory_max_entries: 256,
            memory_max_bytes: 64 * 1024 * 1024,
            disk_max_bytes: 512 * 1024 * 1024,
            disk_high_watermark: 0.8,
            disk_low_watermark: 0.5,
            sweep_interval: Duration::from_secs(300),
        }
    }
}
