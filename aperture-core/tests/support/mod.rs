#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use aperture_core::{
    ApertureConfig, GatewayError, GatewayResult, LibraryGateway,
    cache::{
        BlobKey, CachedBlob, CleanupReport, DiskTier, TierError, TierResult,
    },
};
use aperture_model::{
    AlbumId, Asset, AssetId, Coordinates, ImageVariant, Marker, MetadataFilter,
    MetadataPage, Page, PageRequest, SortOrder,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tempfile::TempDir;

/// Per-operation request counts.
#[derive(Debug, Default)]
pub struct Calls {
    pub blobs: AtomicUsize,
    pub markers: AtomicUsize,
    pub metadata: AtomicUsize,
    pub random: AtomicUsize,
    pub albums: AtomicUsize,
    pub single: AtomicUsize,
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// In-memory inventory answering every gateway call locally.
#[derive(Debug, Default)]
pub struct FakeGateway {
    assets: Vec<Asset>,
    albums: HashMap<AlbumId, Vec<AssetId>>,
    pub markers_unsupported: AtomicBool,
    pub fail_batches: AtomicBool,
    pub calls: Calls,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn with_album(mut self, album: &str, members: &[&str]) -> Self {
        self.albums.insert(
            AlbumId::new(album).unwrap(),
            members.iter().map(|id| AssetId::new(id).unwrap()).collect(),
        );
        self
    }

    fn matching(&self, filter: &MetadataFilter) -> Vec<Asset> {
        let mut found: Vec<Asset> = self
            .assets
            .iter()
            .filter(|a| {
                filter.ids.as_ref().is_none_or(|ids| ids.contains(&a.id))
            })
            .filter(|a| {
                filter
                    .has_coordinates
                    .is_none_or(|want| a.coordinates.is_some() == want)
            })
            .filter(|a| {
                filter.favorite.is_none_or(|want| a.is_favorite == want)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| match filter.order {
            SortOrder::NewestFirst => b.taken_at.cmp(&a.taken_at),
            SortOrder::OldestFirst => a.taken_at.cmp(&b.taken_at),
        });
        found
    }
}

/// Deterministic payload per asset and variant.
pub fn blob_bytes(id: &AssetId, variant: ImageVariant) -> Vec<u8> {
    format!("{}:{}", id, variant).into_bytes().repeat(16)
}

#[async_trait]
impl LibraryGateway for FakeGateway {
    async fn fetch_blob(
        &self,
        id: &AssetId,
        variant: ImageVariant,
    ) -> GatewayResult<Vec<u8>> {
        self.calls.blobs.fetch_add(1, Ordering::SeqCst);
        if self.assets.iter().any(|a| &a.id == id) {
            Ok(blob_bytes(id, variant))
        } else {
            Err(GatewayError::NotFound(id.to_string()))
        }
    }

    async fn query_markers(&self) -> GatewayResult<Vec<Marker>> {
        self.calls.markers.fetch_add(1, Ordering::SeqCst);
        if self.markers_unsupported.load(Ordering::SeqCst) {
            return Err(GatewayError::Unsupported("markers".into()));
        }
        Ok(self
            .assets
            .iter()
            .filter_map(|a| {
                let coordinates = a.coordinates?;
                Some(Marker::new(a.id.clone(), coordinates, a.location.clone()))
            })
            .collect())
    }

    async fn query_metadata(
        &self,
        filter: &MetadataFilter,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<MetadataPage> {
        self.calls.metadata.fetch_add(1, Ordering::SeqCst);
        if filter.ids.is_some() && self.fail_batches.load(Ordering::SeqCst) {
            return Err(GatewayError::Server { code: 500 });
        }
        let request = PageRequest::new(page, page_size)
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(Page::from_slice(&self.matching(filter)[..], request))
    }

    async fn query_random(
        &self,
        filter: &MetadataFilter,
        limit: u32,
    ) -> GatewayResult<Vec<Asset>> {
        self.calls.random.fetch_add(1, Ordering::SeqCst);
        let mut found = self.matching(filter);
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn fetch_album_assets(
        &self,
        album: &AlbumId,
    ) -> GatewayResult<Vec<Asset>> {
        self.calls.albums.fetch_add(1, Ordering::SeqCst);
        let members = self
            .albums
            .get(album)
            .ok_or_else(|| GatewayError::NotFound(album.to_string()))?;
        Ok(self
            .assets
            .iter()
            .filter(|a| members.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn fetch_asset(&self, id: &AssetId) -> GatewayResult<Asset> {
        self.calls.single.fetch_add(1, Ordering::SeqCst);
        self.assets
            .iter()
            .find(|a| &a.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }
}

/// Asset `id` taken `minutes` after a fixed epoch.
pub fn photo(id: &str, minutes: i64) -> Asset {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    Asset::new(
        AssetId::new(id).unwrap(),
        format!("{id}.heic"),
        base + ChronoDuration::minutes(minutes),
    )
}

pub fn photo_at(
    id: &str,
    minutes: i64,
    place: &str,
    lat: f64,
    lon: f64,
) -> Asset {
    photo(id, minutes).with_location(place, Coordinates::new(lat, lon))
}

/// Defaults with a temporary cache root and no background sweep.
pub fn test_config() -> (ApertureConfig, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ApertureConfig::default();
    config.cache.root = Some(dir.path().join("blobs"));
    config.cache.sweep_interval = Duration::ZERO;
    (config, dir)
}

/// Disk tier whose writes always fail and whose reads always miss.
#[derive(Debug, Default)]
pub struct BrokenDiskTier {
    pub writes: AtomicUsize,
}

#[async_trait]
impl DiskTier for BrokenDiskTier {
    async fn read(&self, _key: &BlobKey) -> TierResult<Option<CachedBlob>> {
        Ok(None)
    }

    async fn write(&self, _key: &BlobKey, _bytes: &[u8]) -> TierResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(TierError::Io(std::io::Error::other("read-only filesystem")))
    }

    async fn remove_older_than(&self, _max_age: Duration) -> TierResult<u64> {
        Ok(0)
    }

    async fn cleanup(&self) -> TierResult<CleanupReport> {
        Ok(CleanupReport::default())
    }

    async fn clear(&self) -> TierResult<()> {
        Ok(())
    }

    async fn usage_bytes(&self) -> TierResult<u64> {
        Ok(0)
    }
}
