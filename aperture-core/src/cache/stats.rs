use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`CacheCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCountersSnapshot {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub disk_read_errors: u64,
    pub disk_write_errors: u64,
    pub cleanup_runs: u64,
    pub cleanup_removed: u64,
}

#[derive(Debug, Default)]
pub struct CacheCounters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    disk_read_errors: AtomicU64,
    disk_write_errors: AtomicU64,
    cleanup_runs: AtomicU64,
    cleanup_removed: AtomicU64,
}

impl CacheCounters {
    pub fn on_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_disk_read_error(&self) {
        self.disk_read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_disk_write_error(&self) {
        self.disk_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_cleanup_finished(&self, removed: u64) {
        self.cleanup_runs.fetch_add(1, Ordering::Relaxed);
        self.cleanup_removed.fetch_add(removed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheCountersSnapshot {
        CacheCountersSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            disk_read_errors: self.disk_read_errors.load(Ordering::Relaxed),
            disk_write_errors: self.disk_write_errors.load(Ordering::Relaxed),
            cleanup_runs: self.cleanup_runs.load(Ordering::Relaxed),
            cleanup_removed: self.cleanup_removed.load(Ordering::Relaxed),
        }
    }
}
