use lru::LruCache;
use parking_lot::Mutex;

use super::key::{Blob, BlobKey};
use crate::units::ByteSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTierLimits {
    pub max_bytes: ByteSize,
    pub max_items: usize,
}

impl MemoryTierLimits {
    pub const fn defaults() -> Self {
        Self {
            max_bytes: ByteSize::from_mib(64),
            max_items: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub bytes: u64,
    pub count: usize,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<BlobKey, Blob>,
    bytes: u64,
}

/// In-memory tier bounded by total bytes and item count.
///
/// Whichever limit is hit first evicts least-recently-used entries. A blob
/// larger than the byte budget is never admitted.
#[derive(Debug)]
pub struct MemoryTier {
    limits: MemoryTierLimits,
    inner: Mutex<Inner>,
}

impl MemoryTier {
    pub fn new(limits: MemoryTierLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
        }
    }

    pub fn limits(&self) -> MemoryTierLimits {
        self.limits
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &BlobKey) -> Option<Blob> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &BlobKey) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Insert or replace `key`, then evict until both limits hold.
    ///
    /// Returns the number of entries evicted to make room.
    pub fn insert(&self, key: BlobKey, blob: Blob) -> usize {
        let max_bytes = self.limits.max_bytes.as_bytes();
        let size = blob.byte_len();
        let mut inner = self.inner.lock();

        if let Some(previous) = inner.entries.pop(&key) {
            inner.bytes = inner.bytes.saturating_sub(previous.byte_len());
        }
        if size > max_bytes || self.limits.max_items == 0 {
            log::debug!(
                "memory tier skipped oversized blob; key={}, size={}",
                key,
                size
            );
            return 0;
        }

        inner.bytes = inner.bytes.saturating_add(size);
        inner.entries.put(key, blob);

        let mut evicted = 0;
        while inner.bytes > max_bytes
            || inner.entries.len() > self.limits.max_items
        {
            match inner.entries.pop_lru() {
                Some((_, old)) => {
                    inner.bytes = inner.bytes.saturating_sub(old.byte_len());
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    pub fn remove(&self, key: &BlobKey) -> Option<Blob> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key);
        if let Some(blob) = removed.as_ref() {
            inner.bytes = inner.bytes.saturating_sub(blob.byte_len());
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.bytes = 0;
    }

    pub fn usage(&self) -> MemoryUsage {
        let inner = self.inner.lock();
        MemoryUsage {
            bytes: inner.bytes,
            count: inner.entries.len(),
        }
    }
}
