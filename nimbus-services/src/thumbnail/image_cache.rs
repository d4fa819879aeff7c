// SPDX-License-Identifier: LGPL-3.0-only
//! LRU cache for decoded thumbnail images.
//!
//! The memory tier of the thumbnail cache. It is bounded both by entry count
//! and by total pixel bytes; whichever ceiling is exceeded, least recently
//! used entries are evicted until both hold again.

use crate::thumbnail::bitmap::Bitmap;
use crate::thumbnail::key::CacheKey;
use lru::LruCache;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Tier {
    entries: LruCache<CacheKey, Bitmap>,
    total_bytes: usize,
}

/// Bounded, thread-safe LRU of decoded thumbnails.
///
/// All mutations (insert, evict, promote) are serialized by one lock. Disk
/// I/O never happens while it is held.
pub struct ThumbnailImageCache {
    tier: Mutex<Tier>,
    max_entries: usize,
    max_bytes: usize,
}

impl ThumbnailImageCache {
    /// Create a cache holding at most `max_entries` bitmaps and `max_bytes` pixel bytes.
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            tier: Mutex::new(Tier {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            max_entries: max_entries.max(1),
            max_bytes,
        }
    }

    fn tier(&self) -> MutexGuard<'_, Tier> {
        self.tier.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a bitmap and mark it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Bitmap> {
        self.tier().entries.get(key).cloned()
    }

    /// Insert a bitmap, evicting least recently used entries as needed.
    ///
    /// # Arguments
    /// * `key` - The cache key; an existing entry under it is replaced.
    /// * `bitmap` - The decoded pixels to keep.
    ///
    /// # Returns
    /// The keys evicted to make room. A bitmap larger than the whole byte
    /// budget is not kept, and any older entry under `key` is dropped.
    pub fn put(&self, key: CacheKey, bitmap: Bitmap) -> Vec<CacheKey> {
        let size = bitmap.byte_size();
        let mut tier = self.tier();

        if size > self.max_bytes {
            log::debug!(
                "Bitmap for {:?} ({} bytes) exceeds memory budget, not kept",
                key,
                size
            );
            if let Some(old) = tier.entries.pop(&key) {
                tier.total_bytes -= old.byte_size();
            }
            return Vec::new();
        }

        if let Some(old) = tier.entries.put(key, bitmap) {
            tier.total_bytes -= old.byte_size();
        }
        tier.total_bytes += size;
        self.evict(&mut tier)
    }

    /// Insert a bitmap only if `key` is not already held.
    ///
    /// Used for promotions from a slower tier, which must not replace a
    /// newer entry stored in the meantime. Returns whether it was inserted.
    pub fn put_if_absent(&self, key: CacheKey, bitmap: Bitmap) -> bool {
        let size = bitmap.byte_size();
        let mut tier = self.tier();
        if size > self.max_bytes || tier.entries.contains(&key) {
            return false;
        }

        tier.entries.put(key, bitmap);
        tier.total_bytes += size;
        self.evict(&mut tier);
        true
    }

    fn evict(&self, tier: &mut Tier) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        while tier.entries.len() > self.max_entries || tier.total_bytes > self.max_bytes {
            let Some((old_key, old)) = tier.entries.pop_lru() else {
                break;
            };
            tier.total_bytes -= old.byte_size();
            evicted.push(old_key);
        }
        if !evicted.is_empty() {
            log::trace!("Evicted {} thumbnails from memory", evicted.len());
        }
        evicted
    }

    /// Whether `key` is held, without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.tier().entries.contains(key)
    }

    /// Drop a single entry.
    pub fn remove(&self, key: &CacheKey) -> Option<Bitmap> {
        let mut tier = self.tier();
        let old = tier.entries.pop(key)?;
        tier.total_bytes -= old.byte_size();
        Some(old)
    }

    /// Clear the cache.
    pub fn clear(&self) {
        let mut tier = self.tier();
        tier.entries.clear();
        tier.total_bytes = 0;
    }

    /// Get the number of cached thumbnails.
    pub fn len(&self) -> usize {
        self.tier().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.tier().entries.is_empty()
    }

    /// Total pixel bytes currently held.
    pub fn total_bytes(&self) -> usize {
        self.tier().total_bytes
    }
}

impl Default for ThumbnailImageCache {
    fn default() -> Self {
        Self::new(256, 64 * 1024 * 1024)
    }
}
