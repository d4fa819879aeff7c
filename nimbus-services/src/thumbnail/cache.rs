// SPDX-License-Identifier: LGPL-3.0-only
//! Two-tier thumbnail cache.
//!
//! Lookups go memory first, then disk; a disk hit is promoted into memory.
//! Stores land in memory synchronously and reach disk through the
//! [`ThumbnailExecutor`] queue. Disk failures are logged and behave like
//! misses: the cache is an accelerator, not a store of record.

use crate::config::CacheConfig;
use crate::thumbnail::bitmap::Bitmap;
use crate::thumbnail::disk_cache::{DiskCache, SweepReport};
use crate::thumbnail::error::ThumbnailError;
use crate::thumbnail::executor::ThumbnailExecutor;
use crate::thumbnail::image_cache::ThumbnailImageCache;
use crate::thumbnail::key::CacheKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by the memory tier.
    pub memory_hits: u64,
    /// Lookups answered by the disk tier.
    pub disk_hits: u64,
    /// Lookups neither tier could answer.
    pub misses: u64,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

/// Memory LRU in front of a watermark-bounded disk tier.
pub struct ThumbnailCache {
    config: CacheConfig,
    memory: ThumbnailImageCache,
    disk: Arc<DiskCache>,
    executor: ThumbnailExecutor,
    counters: Counters,
}

impl ThumbnailCache {
    /// Create the cache and start its disk worker on the current tokio runtime.
    pub fn new(config: CacheConfig) -> Self {
        let config = config.validated();
        let disk = Arc::new(DiskCache::new(&config));
        let executor = ThumbnailExecutor::new(disk.clone(), config.sweep_interval);
        log::debug!("Thumbnail cache at {:?}", config.root);

        Self {
            memory: ThumbnailImageCache::new(config.memory_max_entries, config.memory_max_bytes),
            disk,
            executor,
            counters: Counters::default(),
            config,
        }
    }

    /// Look up `key`, memory first.
    ///
    /// A disk hit is promoted into memory unless a `put` for the same key
    /// landed while the file was being read.
    pub async fn get(&self, key: &CacheKey) -> Option<Bitmap> {
        if let Some(bitmap) = self.memory.get(key) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(bitmap);
        }

        match self.disk.read(key).await {
            Ok(Some(bitmap)) => {
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("Promoting {:?} from disk", key);
                if !self.memory.put_if_absent(key.clone(), bitmap.clone()) {
                    return self.memory.get(key).or(Some(bitmap));
                }
                Some(bitmap)
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
            Err(e) => {
                log::warn!("Disk cache read for {} failed: {}", key.id, e);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    /// Store `bitmap` in both tiers. The disk write happens in the background.
    pub fn put(&self, key: CacheKey, bitmap: Bitmap) {
        self.memory.put(key.clone(), bitmap.clone());
        self.executor.persist(key, bitmap);
    }

    /// Drop everything from both tiers.
    pub async fn clear(&self) -> Result<(), ThumbnailError> {
        self.memory.clear();
        self.executor.clear().await
    }

    /// Wait for queued disk writes to land.
    pub async fn flush(&self) {
        self.executor.flush().await;
    }

    /// Sweep the disk tier now, evicting down to the low watermark
    /// regardless of the high watermark.
    pub async fn sweep_now(&self) -> Result<SweepReport, ThumbnailError> {
        self.executor.sweep(true).await
    }

    /// Snapshot of the hit and miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    /// The memory tier.
    pub fn memory(&self) -> &ThumbnailImageCache {
        &self.memory
    }

    /// The disk tier.
    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    /// The effective configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
