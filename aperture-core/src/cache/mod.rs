//! Two-tier blob cache.
//!
//! Lookups walk memory, then disk (promoting hits), then the injected loader.
//! Disk failures are logged and treated as misses or dropped writes; only
//! loader failures reach the caller, and nothing is cached when a load fails.
//!
//! Concurrent misses on the same key are not coalesced: each caller runs its
//! own loader and the last write wins. A lookup that straddles
//! [`BlobCache::invalidate_all`] still returns its blob but caches nothing.

pub mod disk;
mod key;
mod memory;
mod stats;

pub use disk::{
    CacacheDiskTier, CleanupReport, DiskCacheRoot, DiskTier, DiskTierLimits,
    TierError, TierResult,
};
pub use key::{Blob, BlobKey, CachedBlob};
pub use memory::{MemoryTier, MemoryTierLimits, MemoryUsage};
pub use stats::{CacheCounters, CacheCountersSnapshot};

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::error::{GatewayResult, LoadError};

/// Where a [`BlobCache::get`] result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobSource {
    Memory,
    Disk,
    Loader,
}

/// Which tiers currently hold a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Absent,
    MemoryOnly,
    DiskOnly,
    MemoryAndDisk,
}

/// Steps of a single lookup. `Load` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    ProbeMemory,
    ProbeDisk,
    Load,
}

/// Observable cache sizes, recomputed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub memory_bytes: u64,
    pub memory_count: usize,
    pub disk_bytes: u64,
    pub counters: CacheCountersSnapshot,
}

/// Process-wide blob cache; construct once and share through `Arc`.
#[derive(Debug)]
pub struct BlobCache {
    memory: MemoryTier,
    disk: Arc<dyn DiskTier>,
    counters: CacheCounters,
    generation: AtomicU64,
}

impl BlobCache {
    pub fn new(
        memory_limits: MemoryTierLimits,
        disk: Arc<dyn DiskTier>,
    ) -> Self {
        Self {
            memory: MemoryTier::new(memory_limits),
            disk,
            counters: CacheCounters::default(),
            generation: AtomicU64::new(0),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Return the blob for `key`, invoking `loader` only on a full miss.
    pub async fn get<F, Fut>(
        &self,
        key: &BlobKey,
        loader: F,
    ) -> Result<Blob, LoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<Vec<u8>>>,
    {
        self.get_with_source(key, loader)
            .await
            .map(|(blob, _)| blob)
    }

    pub async fn get_with_source<F, Fut>(
        &self,
        key: &BlobKey,
        loader: F,
    ) -> Result<(Blob, BlobSource), LoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<Vec<u8>>>,
    {
        let generation = self.generation.load(Ordering::SeqCst);
        let mut step = Lookup::ProbeMemory;
        loop {
            step = match step {
                Lookup::ProbeMemory => match self.memory.get(key) {
                    Some(blob) => {
                        self.counters.on_memory_hit();
                        return Ok((blob, BlobSource::Memory));
                    }
                    None => Lookup::ProbeDisk,
                },
                Lookup::ProbeDisk => match self.disk.read(key).await {
                    Ok(Some(found)) => {
                        self.counters.on_disk_hit();
                        let blob = Arc::new(found);
                        if self.is_current(generation) {
                            self.memory.insert(key.clone(), Arc::clone(&blob));
                        }
                        return Ok((blob, BlobSource::Disk));
                    }
                    Ok(None) => Lookup::Load,
                    Err(e) => {
                        self.counters.on_disk_read_error();
                        log::warn!(
                            "blob cache disk read failed; key={}, err={e}",
                            key
                        );
                        Lookup::Load
                    }
                },
                Lookup::Load => break,
            };
        }

        self.counters.on_load();
        let bytes = loader().await.map_err(|source| {
            self.counters.on_load_failure();
            LoadError {
                key: key.clone(),
                source,
            }
        })?;

        let blob = Arc::new(CachedBlob::new(bytes));
        self.memory.insert(key.clone(), Arc::clone(&blob));
        // Checked after the insert so a concurrent wipe either clears the
        // entry or is seen here.
        if !self.is_current(generation) {
            self.memory.remove(key);
            log::debug!(
                "blob cache load discarded after invalidation; key={}",
                key
            );
            return Ok((blob, BlobSource::Loader));
        }
        if let Err(e) = self.disk.write(key, blob.bytes()).await {
            self.counters.on_disk_write_error();
            log::warn!("blob cache disk write failed; key={}, err={e}", key);
        }

        Ok((blob, BlobSource::Loader))
    }

    /// Which tiers hold `key` right now. Does not touch LRU order.
    pub async fn residency(&self, key: &BlobKey) -> Residency {
        let in_memory = self.memory.contains(key);
        let on_disk = match self.disk.read(key).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                log::debug!(
                    "blob cache residency probe failed; key={}, err={e}",
                    key
                );
                false
            }
        };
        match (in_memory, on_disk) {
            (false, false) => Residency::Absent,
            (true, false) => Residency::MemoryOnly,
            (false, true) => Residency::DiskOnly,
            (true, true) => Residency::MemoryAndDisk,
        }
    }

    /// Clear memory immediately, then wipe the disk store. Loads already in
    /// flight finish but do not repopulate either tier.
    pub async fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.memory.clear();
        if let Err(e) = self.disk.clear().await {
            log::warn!("blob cache disk clear failed: {e}");
        }
    }

    /// Remove disk entries older than `max_age`. Memory is untouched.
    pub async fn invalidate_expired(&self, max_age: Duration) -> u64 {
        match self.disk.remove_older_than(max_age).await {
            Ok(removed) => {
                self.counters.on_cleanup_finished(removed);
                removed
            }
            Err(e) => {
                log::warn!("blob cache expiry sweep failed: {e}");
                0
            }
        }
    }

    /// One age + budget pass over the disk tier.
    pub async fn cleanup(&self) -> CleanupReport {
        match self.disk.cleanup().await {
            Ok(report) => {
                self.counters.on_cleanup_finished(report.removed());
                report
            }
            Err(e) => {
                log::warn!("blob cache disk cleanup failed: {e}");
                CleanupReport::default()
            }
        }
    }

    pub async fn statistics(&self) -> CacheStatistics {
        let memory = self.memory.usage();
        let disk_bytes = self.disk.usage_bytes().await.unwrap_or_else(|e| {
            log::warn!("blob cache disk usage probe failed: {e}");
            0
        });
        CacheStatistics {
            memory_bytes: memory.bytes,
            memory_count: memory.count,
            disk_bytes,
            counters: self.counters.snapshot(),
        }
    }

    /// Run [`cleanup`](Self::cleanup) every `interval` until the handle is
    /// aborted. The first pass runs after one full interval.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );
            loop {
                ticker.tick().await;
                cache.cleanup().await;
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;
    use crate::{error::GatewayError, units::ByteSize};

    /// Map-backed disk tier with switchable failures.
    #[derive(Debug, Default)]
    pub(crate) struct MapDiskTier {
        entries: Mutex<HashMap<BlobKey, CachedBlob>>,
        pub fail_reads: AtomicBool,
        pub fail_writes: AtomicBool,
        pub writes: AtomicUsize,
        pub cleanups: AtomicUsize,
    }

    fn io_error() -> TierError {
        TierError::Io(std::io::Error::other("simulated disk failure"))
    }

    #[async_trait]
    impl DiskTier for MapDiskTier {
        async fn read(&self, key: &BlobKey) -> TierResult<Option<CachedBlob>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(io_error());
            }
            Ok(self.entries.lock().get(key).cloned())
        }

        async fn write(&self, key: &BlobKey, bytes: &[u8]) -> TierResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(io_error());
            }
            self.entries
                .lock()
                .insert(key.clone(), CachedBlob::new(bytes.to_vec()));
            Ok(())
        }

        async fn remove_older_than(
            &self,
            max_age: Duration,
        ) -> TierResult<u64> {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|_, blob| blob.age() <= max_age);
            Ok((before - entries.len()) as u64)
        }

        async fn cleanup(&self) -> TierResult<CleanupReport> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(CleanupReport::default())
        }

        async fn clear(&self) -> TierResult<()> {
            self.entries.lock().clear();
            Ok(())
        }

        async fn usage_bytes(&self) -> TierResult<u64> {
            Ok(self.entries.lock().values().map(CachedBlob::byte_len).sum())
        }
    }

    fn cache_with(disk: Arc<MapDiskTier>, max_bytes: u64) -> BlobCache {
        BlobCache::new(
            MemoryTierLimits {
                max_bytes: ByteSize::from_bytes(max_bytes),
                max_items: 100,
            },
            disk,
        )
    }

    #[tokio::test]
    async fn second_get_skips_loader() {
        let disk = Arc::new(MapDiskTier::default());
        let cache = cache_with(Arc::clone(&disk), 1024);
        let key = BlobKey::new("k");

        let (first, source) = cache
            .get_with_source(&key, || async { Ok(vec![1, 2, 3]) })
            .await
            .unwrap();
        assert_eq!(source, BlobSource::Loader);

        let calls = AtomicUsize::new(0);
        let (second, source) = cache
            .get_with_source(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![0])
            })
            .await
            .unwrap();
        assert_eq!(source, BlobSource::Memory);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(cache.residency(&key).await, Residency::MemoryAndDisk);
    }

    #[tokio::test]
    async fn disk_hit_is_promoted_to_memory() {
        let disk = Arc::new(MapDiskTier::default());
        let key = BlobKey::new("k");
        disk.write(&key, &[9u8; 8]).await.unwrap();

        let cache = cache_with(Arc::clone(&disk), 1024);
        assert_eq!(cache.residency(&key).await, Residency::DiskOnly);

        let (_, source) = cache
            .get_with_source(&key, || async { Ok(vec![0]) })
            .await
            .unwrap();
        assert_eq!(source, BlobSource::Disk);
        assert_eq!(cache.residency(&key).await, Residency::MemoryAndDisk);
    }

    #[tokio::test]
    async fn disk_write_failure_is_invisible_to_caller() {
        let disk = Arc::new(MapDiskTier::default());
        disk.fail_writes.store(true, Ordering::SeqCst);
        let cache = cache_with(Arc::clone(&disk), 1024);
        let key = BlobKey::new("k");

        let blob =
            cache.get(&key, || async { Ok(vec![5u8; 4]) }).await.unwrap();
        assert_eq!(blob.bytes(), &[5u8; 4]);
        assert_eq!(cache.residency(&key).await, Residency::MemoryOnly);
        assert_eq!(cache.statistics().await.counters.disk_write_errors, 1);
    }

    #[tokio::test]
    async fn disk_read_failure_falls_through_to_loader() {
        let disk = Arc::new(MapDiskTier::default());
        disk.fail_reads.store(true, Ordering::SeqCst);
        let cache = cache_with(disk, 1024);

        let (blob, source) = cache
            .get_with_source(&BlobKey::new("k"), || async { Ok(vec![1]) })
            .await
            .unwrap();
        assert_eq!(source, BlobSource::Loader);
        assert_eq!(blob.bytes(), &[1]);
    }

    #[tokio::test]
    async fn loader_failure_propagates_and_caches_nothing() {
        let disk = Arc::new(MapDiskTier::default());
        let cache = cache_with(Arc::clone(&disk), 1024);
        let key = BlobKey::new("k");

        let err = cache
            .get(&key, || async { Err(GatewayError::Server { code: 503 }) })
            .await
            .unwrap_err();
        assert_eq!(err.key, key);
        assert_eq!(err.source, GatewayError::Server { code: 503 });
        assert_eq!(cache.residency(&key).await, Residency::Absent);
        assert_eq!(disk.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalidate_all_forces_reload() {
        let disk = Arc::new(MapDiskTier::default());
        let cache = cache_with(disk, 1024);
        let key = BlobKey::new("k");
        cache.get(&key, || async { Ok(vec![1]) }).await.unwrap();

        cache.invalidate_all().await;

        let stats = cache.statistics().await;
        assert_eq!((stats.memory_bytes, stats.memory_count), (0, 0));
        assert_eq!(stats.disk_bytes, 0);

        let (_, source) = cache
            .get_with_source(&key, || async { Ok(vec![2]) })
            .await
            .unwrap();
        assert_eq!(source, BlobSource::Loader);
    }

    #[tokio::test]
    async fn memory_budget_holds_across_loads() {
        let disk = Arc::new(MapDiskTier::default());
        let cache = cache_with(disk, 100);
        for i in 0..10u8 {
            let key = BlobKey::new(format!("k{i}"));
            cache
                .get(&key, || async move { Ok(vec![i; 30]) })
                .await
                .unwrap();
            assert!(cache.statistics().await.memory_bytes <= 100);
        }
    }

    #[tokio::test]
    async fn load_racing_invalidate_all_is_not_cached() {
        let disk = Arc::new(MapDiskTier::default());
        let cache = Arc::new(cache_with(Arc::clone(&disk), 1024));
        let key = BlobKey::new("k");
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let racing = tokio::spawn({
            let (cache, key) = (Arc::clone(&cache), key.clone());
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            async move {
                cache
                    .get(&key, || async move {
                        started.notify_one();
                        release.notified().await;
                        Ok(vec![1u8; 4])
                    })
                    .await
            }
        });

        started.notified().await;
        cache.invalidate_all().await;
        release.notify_one();

        let stale = racing.await.unwrap().unwrap();
        assert_eq!(stale.bytes(), &[1u8; 4]);
        assert_eq!(cache.residency(&key).await, Residency::Absent);
        assert_eq!(disk.writes.load(Ordering::SeqCst), 0);

        let calls = AtomicUsize::new(0);
        let (fresh, source) = cache
            .get_with_source(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![2u8; 4])
            })
            .await
            .unwrap();
        assert_eq!(source, BlobSource::Loader);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fresh.bytes(), &[2u8; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_cleanup_once_per_interval() {
        let disk = Arc::new(MapDiskTier::default());
        let cache = Arc::new(cache_with(Arc::clone(&disk), 1024));
        let interval = Duration::from_secs(7 * 24 * 60 * 60);

        let sweeper = cache.spawn_sweeper(interval);
        settle().await;
        assert_eq!(disk.cleanups.load(Ordering::SeqCst), 0);

        tokio::time::advance(interval / 2).await;
        settle().await;
        assert_eq!(disk.cleanups.load(Ordering::SeqCst), 0);

        tokio::time::advance(interval / 2 + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(disk.cleanups.load(Ordering::SeqCst), 1);

        tokio::time::advance(interval).await;
        settle().await;
        assert_eq!(disk.cleanups.load(Ordering::SeqCst), 2);
        assert_eq!(cache.statistics().await.counters.cleanup_runs, 2);

        sweeper.abort();
        tokio::time::advance(interval * 2).await;
        settle().await;
        assert_eq!(disk.cleanups.load(Ordering::SeqCst), 2);
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }
}
