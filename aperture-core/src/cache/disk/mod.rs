//! Persistent tier of the blob cache.
//!
//! [`CacacheDiskTier`] keeps blobs in a dedicated, reclaimable `cacache`
//! directory. All disk work funnels through one FIFO lane so reads, writes
//! and sweeps never interleave on the same entries.

mod eviction;

pub use eviction::{
    DiskEntryInfo, EvictionPlan, EvictionReason, PlannedEviction,
    plan_evictions,
};

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use cacache::{Integrity, RemoveOpts};
use directories::ProjectDirs;
use sha2::Digest;
use thiserror::Error;
use tokio::sync::Mutex;

use super::key::{BlobKey, CachedBlob};
use crate::units::ByteSize;

/// Disk tier failures. These never leave the blob cache.
#[derive(Error, Debug)]
pub enum TierError {
    #[error("cacache error: {0}")]
    Cacache(#[from] cacache::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type TierResult<T> = std::result::Result<T, TierError>;

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub scanned: u64,
    pub removed_expired: u64,
    pub removed_over_budget: u64,
    pub bytes_after: u64,
}

impl CleanupReport {
    pub fn removed(&self) -> u64 {
        self.removed_expired + self.removed_over_budget
    }
}

/// Storage contract for the persistent tier.
///
/// Implementations must serialize their own operations in submission order.
#[async_trait]
pub trait DiskTier: Send + Sync + fmt::Debug {
    /// `Ok(None)` on a miss.
    async fn read(&self, key: &BlobKey) -> TierResult<Option<CachedBlob>>;

    async fn write(&self, key: &BlobKey, bytes: &[u8]) -> TierResult<()>;

    /// Remove every entry whose age is strictly greater than `max_age`.
    async fn remove_older_than(&self, max_age: Duration) -> TierResult<u64>;

    /// Apply the configured age limit and byte budget.
    async fn cleanup(&self) -> TierResult<CleanupReport>;

    /// Drop every entry and recreate an empty store.
    async fn clear(&self) -> TierResult<()>;

    /// Bytes currently stored, recomputed from the store itself.
    async fn usage_bytes(&self) -> TierResult<u64>;
}

/// Root directory for the blob store; `cacache` manages its contents.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DiskCacheRoot(PathBuf);

impl DiskCacheRoot {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    /// Platform cache directory, namespaced per server so switching servers
    /// never mixes blobs.
    pub fn for_server(server_url: &str) -> anyhow::Result<Self> {
        let proj_dirs = ProjectDirs::from("", "aperture", "aperture")
            .ok_or_else(|| anyhow::anyhow!("Failed to resolve ProjectDirs"))?;
        Ok(Self(
            proj_dirs
                .cache_dir()
                .join("blobs")
                .join(namespace_for_server_url(server_url)),
        ))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Debug for DiskCacheRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DiskCacheRoot").field(&self.0).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskTierLimits {
    pub max_bytes: ByteSize,
    pub max_age: Duration,
}

impl DiskTierLimits {
    pub const fn defaults() -> Self {
        Self {
            max_bytes: ByteSize::from_mib(512),
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug)]
struct UsageBytes(AtomicU64);

impl UsageBytes {
    fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    fn load(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn store(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    fn add(&self, add: u64) {
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_add(add))
        });
    }

    fn sub(&self, sub: u64) {
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(sub))
        });
    }
}

/// Index entries per content hash. `cacache` stores identical bytes once,
/// so content may only be deleted along with the last key naming it.
#[derive(Debug, Default)]
struct ContentRefs(HashMap<Integrity, usize>);

impl ContentRefs {
    fn count<'a>(
        entries: impl IntoIterator<Item = &'a cacache::Metadata>,
    ) -> Self {
        let mut refs = HashMap::new();
        for m in entries {
            *refs.entry(m.integrity.clone()).or_insert(0) += 1;
        }
        Self(refs)
    }

    fn is_last(&self, integrity: &Integrity) -> bool {
        self.0.get(integrity).is_none_or(|n| *n <= 1)
    }

    fn release(&mut self, integrity: &Integrity) {
        if let Some(n) = self.0.get_mut(integrity) {
            *n = n.saturating_sub(1);
        }
    }
}

/// `cacache`-backed disk tier.
#[derive(Debug)]
pub struct CacacheDiskTier {
    root: DiskCacheRoot,
    limits: DiskTierLimits,
    usage: UsageBytes,
    lane: Mutex<()>,
}

impl CacacheDiskTier {
    /// Open (or create) the store at `root`, running one eviction pass.
    pub fn try_new_for_root(
        root: DiskCacheRoot,
        limits: DiskTierLimits,
    ) -> anyhow::Result<Self> {
        let root_path = root.as_path();
        std::fs::create_dir_all(root_path)?;

        let usage = cleanup_sync(root_path, &limits, unix_ms_now())
            .unwrap_or_else(|e| {
                log::warn!(
                    "disk tier init cleanup failed; root={}, err={e}",
                    root_path.display()
                );
                0
            });

        Ok(Self {
            root,
            limits,
            usage: UsageBytes::new(usage),
            lane: Mutex::new(()),
        })
    }

    pub fn try_new_for_server(
        server_url: &str,
        limits: DiskTierLimits,
    ) -> anyhow::Result<Self> {
        Self::try_new_for_root(DiskCacheRoot::for_server(server_url)?, limits)
    }

    pub fn root(&self) -> &DiskCacheRoot {
        &self.root
    }

    pub fn limits(&self) -> DiskTierLimits {
        self.limits
    }

    async fn list_entries(&self) -> TierResult<Vec<cacache::Metadata>> {
        let root = self.root.as_path().to_path_buf();
        let entries = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in cacache::index::ls(&root) {
                match entry {
                    Ok(m) => out.push(m),
                    Err(e) => log::warn!("disk tier index ls entry error: {e}"),
                }
            }
            out
        })
        .await?;
        Ok(entries)
    }

    /// Drop the index entry for `key`, and its content too when
    /// `delete_content` is set. Content already gone counts as removed.
    async fn remove_entry(
        &self,
        key: &BlobKey,
        delete_content: bool,
    ) -> TierResult<()> {
        let root = self.root.as_path();
        match RemoveOpts::new()
            .remove_fully(delete_content)
            .remove(root, key.as_str())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_missing_file(&e) => {
                RemoveOpts::new().remove(root, key.as_str()).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Eviction pass; the caller must hold the lane.
    async fn cleanup_locked(
        &self,
        max_age_ms: u64,
        max_bytes: u64,
    ) -> TierResult<CleanupReport> {
        let start = Instant::now();
        let entries = self.list_entries().await?;
        let scanned = entries.len() as u64;
        let mut refs = ContentRefs::count(&entries);

        let mut hashes = HashMap::with_capacity(entries.len());
        let infos = entries
            .into_iter()
            .map(|m| {
                let key = BlobKey::new(&m.key);
                hashes.insert(key.clone(), m.integrity);
                DiskEntryInfo {
                    key,
                    size_bytes: m.size as u64,
                    written_at_ms: u128_to_u64(m.time),
                }
            })
            .collect();

        let plan = plan_evictions(infos, unix_ms_now(), max_age_ms, max_bytes);
        let mut total_bytes = plan.total_bytes_before;
        let mut report = CleanupReport {
            scanned,
            ..CleanupReport::default()
        };

        for eviction in plan.planned {
            let hash = hashes.get(&eviction.key);
            let last = hash.is_none_or(|h| refs.is_last(h));
            match self.remove_entry(&eviction.key, last).await {
                Ok(()) => {
                    if let Some(h) = hash {
                        refs.release(h);
                    }
                    total_bytes =
                        total_bytes.saturating_sub(eviction.size_bytes);
                    match eviction.reason {
                        EvictionReason::Expired => report.removed_expired += 1,
                        EvictionReason::OverBudget => {
                            report.removed_over_budget += 1
                        }
                    }
                }
                Err(e) => log::warn!(
                    "disk tier eviction failed; key={}, err={e}",
                    eviction.key
                ),
            }
        }

        self.usage.store(total_bytes);
        report.bytes_after = total_bytes;

        if report.removed() > 0 {
            log::info!(
                "disk tier cleanup removed {} entries \
                 (expired={}, budget={}) in {}ms",
                report.removed(),
                report.removed_expired,
                report.removed_over_budget,
                start.elapsed().as_millis()
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl DiskTier for CacacheDiskTier {
    async fn read(&self, key: &BlobKey) -> TierResult<Option<CachedBlob>> {
        let _lane = self.lane.lock().await;

        let Some(meta) =
            cacache::metadata(self.root.as_path(), key.as_str()).await?
        else {
            return Ok(None);
        };

        match cacache::read_hash(self.root.as_path(), &meta.integrity).await {
            Ok(bytes) => {
                let written_at =
                    UNIX_EPOCH + Duration::from_millis(u128_to_u64(meta.time));
                Ok(Some(CachedBlob::with_created_at(bytes, written_at)))
            }
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) if is_missing_file(&e) => {
                log::warn!("disk tier content missing; key={}, err={e}", key);
                match self.remove_entry(key, false).await {
                    Ok(()) => self.usage.sub(meta.size as u64),
                    Err(e) => log::warn!(
                        "disk tier dangling entry removal failed; \
                         key={}, err={e}",
                        key
                    ),
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &BlobKey, bytes: &[u8]) -> TierResult<()> {
        let _lane = self.lane.lock().await;

        let previous =
            match cacache::metadata(self.root.as_path(), key.as_str()).await {
                Ok(meta) => meta,
                Err(e) => {
                    log::debug!(
                        "disk tier write preflight metadata failed; \
                         key={}, err={e}",
                        key
                    );
                    None
                }
            };
        if let Some(old) = previous {
            let refs = ContentRefs::count(&self.list_entries().await?);
            self.remove_entry(key, refs.is_last(&old.integrity)).await?;
            self.usage.sub(old.size as u64);
        }

        cacache::write(self.root.as_path(), key.as_str(), bytes).await?;
        self.usage.add(bytes.len() as u64);

        let max_bytes = self.limits.max_bytes.as_bytes();
        if max_bytes > 0 && self.usage.load() > max_bytes {
            self.cleanup_locked(duration_ms(self.limits.max_age), max_bytes)
                .await?;
        }
        Ok(())
    }

    async fn remove_older_than(&self, max_age: Duration) -> TierResult<u64> {
        let _lane = self.lane.lock().await;
        // A zero age disables the planner's age pass; one millisecond keeps
        // "strictly older than zero" meaningful.
        let max_age_ms = duration_ms(max_age).max(1);
        let report = self.cleanup_locked(max_age_ms, 0).await?;
        Ok(report.removed_expired)
    }

    async fn cleanup(&self) -> TierResult<CleanupReport> {
        let _lane = self.lane.lock().await;
        self.cleanup_locked(
            duration_ms(self.limits.max_age),
            self.limits.max_bytes.as_bytes(),
        )
        .await
    }

    async fn clear(&self) -> TierResult<()> {
        let _lane = self.lane.lock().await;
        cacache::clear(self.root.as_path()).await?;
        tokio::fs::create_dir_all(self.root.as_path()).await?;
        self.usage.store(0);
        Ok(())
    }

    async fn usage_bytes(&self) -> TierResult<u64> {
        let _lane = self.lane.lock().await;
        let total = self
            .list_entries()
            .await?
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.size as u64));
        self.usage.store(total);
        Ok(total)
    }
}

fn namespace_for_server_url(server_url: &str) -> String {
    let normalized = normalize_server_url(server_url);
    let digest = sha2::Sha256::digest(normalized.as_bytes());
    hex_encode(&digest[..16])
}

fn normalize_server_url(server_url: &str) -> String {
    server_url.trim().trim_end_matches('/').to_ascii_lowercase()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn unix_ms_now() -> u64 {
    u128_to_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis(),
    )
}

fn is_missing_file(err: &cacache::Error) -> bool {
    matches!(
        err,
        cacache::Error::IoError(e, _)
            if e.kind() == std::io::ErrorKind::NotFound
    )
}

fn u128_to_u64(v: u128) -> u64 {
    v.min(u128::from(u64::MAX)) as u64
}

fn duration_ms(d: Duration) -> u64 {
    u128_to_u64(d.as_millis())
}

fn cleanup_sync(
    root: &Path,
    limits: &DiskTierLimits,
    now_ms: u64,
) -> anyhow::Result<u64> {
    let mut entries = Vec::new();
    for entry in cacache::index::ls(root) {
        match entry {
            Ok(m) => entries.push(m),
            Err(e) => log::warn!("disk tier index ls entry error: {e}"),
        }
    }
    if entries.is_empty() {
        return Ok(0);
    }

    let mut refs = ContentRefs::count(&entries);
    let mut hashes = HashMap::with_capacity(entries.len());
    let infos = entries
        .into_iter()
        .map(|m| {
            let key = BlobKey::new(&m.key);
            hashes.insert(key.clone(), m.integrity);
            DiskEntryInfo {
                key,
                size_bytes: m.size as u64,
                written_at_ms: u128_to_u64(m.time),
            }
        })
        .collect();

    let plan = plan_evictions(
        infos,
        now_ms,
        duration_ms(limits.max_age),
        limits.max_bytes.as_bytes(),
    );
    let mut total_bytes = plan.total_bytes_before;
    for e in plan.planned {
        let hash = hashes.get(&e.key);
        let last = hash.is_none_or(|h| refs.is_last(h));
        let removed = match RemoveOpts::new()
            .remove_fully(last)
            .remove_sync(root, e.key.as_str())
        {
            Err(err) if is_missing_file(&err) => {
                RemoveOpts::new().remove_sync(root, e.key.as_str())
            }
            other => other,
        };
        if let Err(err) = removed {
            log::warn!(
                "disk tier init eviction failed; key={}, err={err}",
                e.key
            );
            continue;
        }
        if let Some(h) = hash {
            refs.release(h);
        }
        total_bytes = total_bytes.saturating_sub(e.size_bytes);
    }
    Ok(total_bytes)
}
