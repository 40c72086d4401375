//! Composition root wiring the gateway, blob cache, location index and
//! retrieval strategies together.

use std::{fmt, sync::Arc, time::Duration};

use aperture_model::{
    Asset, AssetId, FilterContext, ImageVariant, LocationSummary, Page,
    PageRequest, SortOrder,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    cache::{
        Blob, BlobCache, BlobKey, CacacheDiskTier, CacheStatistics, DiskTier,
    },
    config::ApertureConfig,
    error::Result,
    gateway::LibraryGateway,
    location::LocationIndex,
    retrieval::{
        RetrievalStrategy, SharedSortPreference, SortPreference,
        StrategyFactory,
    },
};

/// Entry point for a UI layer browsing one remote library.
///
/// Holds the strategy of the most recent filter context, so consecutive
/// pages of one context share its local caches. Switching context replaces
/// it.
pub struct MediaLibrary {
    gateway: Arc<dyn LibraryGateway>,
    cache: Arc<BlobCache>,
    locations: Arc<LocationIndex>,
    sort: Arc<SharedSortPreference>,
    factory: StrategyFactory,
    active: Mutex<Option<(FilterContext, Arc<RetrievalStrategy>)>>,
    disk_max_age: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl fmt::Debug for MediaLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaLibrary")
            .field("cache", &self.cache)
            .field("locations", &self.locations)
            .field("sort", &self.sort)
            .field("disk_max_age", &self.disk_max_age)
            .field("sweeping", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

impl MediaLibrary {
    /// Build everything from `config`, opening the `cacache` store on disk.
    pub fn open(
        config: &ApertureConfig,
        gateway: Arc<dyn LibraryGateway>,
    ) -> anyhow::Result<Self> {
        let root = config.cache.resolve_root(&config.library.server_url)?;
        let disk = CacacheDiskTier::try_new_for_root(
            root,
            config.cache.disk_limits(),
        )?;
        info!(
            root = %disk.root().as_path().display(),
            memory_max = %config.cache.memory_max_bytes,
            disk_max = %config.cache.disk_max_bytes,
            "media library opened"
        );
        Ok(Self::with_disk_tier(config, gateway, Arc::new(disk)))
    }

    /// Like [`open`](Self::open) with a caller-supplied disk tier.
    ///
    /// The expiry sweeper is only started when called inside a Tokio
    /// runtime and `cache.sweep_interval` is non-zero.
    pub fn with_disk_tier(
        config: &ApertureConfig,
        gateway: Arc<dyn LibraryGateway>,
        disk: Arc<dyn DiskTier>,
    ) -> Self {
        let cache =
            Arc::new(BlobCache::new(config.cache.memory_limits(), disk));
        let locations = Arc::new(LocationIndex::new(
            Arc::clone(&gateway),
            Arc::new(config.location.canonicalizer()),
            config.location.settings(),
        ));
        let sort =
            Arc::new(SharedSortPreference::new(config.library.sort_order));
        let factory = StrategyFactory::new(
            Arc::clone(&gateway),
            Arc::clone(&locations),
            Arc::clone(&sort) as Arc<dyn SortPreference>,
        );

        let sweeper = start_sweeper(&cache, config.cache.sweep_interval);

        Self {
            gateway,
            cache,
            locations,
            sort,
            factory,
            active: Mutex::new(None),
            disk_max_age: config.cache.disk_max_age,
            sweeper,
        }
    }

    pub fn cache(&self) -> &Arc<BlobCache> {
        &self.cache
    }

    pub fn locations(&self) -> &Arc<LocationIndex> {
        &self.locations
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort.sort_order()
    }

    /// Takes effect on the next page request; cached collections re-sort
    /// without refetching.
    pub fn set_sort_order(&self, order: SortOrder) {
        self.sort.set(order);
    }

    pub async fn fetch_page(
        &self,
        context: &FilterContext,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Asset>> {
        let request = PageRequest::new(page, page_size)?;
        self.strategy_for(context).fetch_page(request).await
    }

    pub async fn fetch_random(
        &self,
        context: &FilterContext,
        limit: u32,
    ) -> Result<Page<Asset>> {
        self.strategy_for(context).fetch_random(limit).await
    }

    /// Image bytes for `id`, served from cache when possible.
    pub async fn thumbnail(
        &self,
        id: &AssetId,
        variant: ImageVariant,
    ) -> Result<Blob> {
        let key = BlobKey::for_asset(id, variant);
        let blob = self
            .cache
            .get(&key, || self.gateway.fetch_blob(id, variant))
            .await?;
        Ok(blob)
    }

    pub async fn location_summaries(&self) -> Result<Arc<[LocationSummary]>> {
        self.locations.location_summaries().await
    }

    pub async fn location_count(&self) -> Result<usize> {
        self.locations.location_count().await
    }

    pub async fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics().await
    }

    /// Empty both blob tiers.
    pub async fn clear_cache(&self) {
        self.cache.invalidate_all().await;
    }

    /// Drop disk blobs older than the configured maximum age.
    pub async fn clear_expired(&self) -> u64 {
        let removed = self.cache.invalidate_expired(self.disk_max_age).await;
        debug!(removed, "expired blobs removed");
        removed
    }

    /// Forget everything tied to the current session: blobs, markers,
    /// location summaries and the active strategy.
    pub async fn invalidate_all(&self) {
        self.active.lock().take();
        self.locations.invalidate();
        self.cache.invalidate_all().await;
        info!("media library caches invalidated");
    }

    fn strategy_for(&self, context: &FilterContext) -> Arc<RetrievalStrategy> {
        let mut active = self.active.lock();
        if let Some((current, strategy)) = active.as_ref()
            && current == context
        {
            return Arc::clone(strategy);
        }
        let strategy = Arc::new(self.factory.select(context));
        *active = Some((context.clone(), Arc::clone(&strategy)));
        strategy
    }
}

impl Drop for MediaLibrary {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

fn start_sweeper(
    cache: &Arc<BlobCache>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(_) => Some(cache.spawn_sweeper(interval)),
        Err(_) => {
            warn!("no tokio runtime; periodic blob cache sweep disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use aperture_model::{AlbumId, Coordinates, Marker, MetadataFilter};

    use super::*;
    use crate::{
        cache::tests::MapDiskTier,
        error::{GatewayError, LibraryError},
        gateway::MockLibraryGateway,
        retrieval::{StrategyKind, test_support::asset},
    };

    fn config() -> ApertureConfig {
        let mut config = ApertureConfig::default();
        config.cache.sweep_interval = Duration::ZERO;
        config
    }

    fn library(gateway: MockLibraryGateway) -> MediaLibrary {
        MediaLibrary::with_disk_tier(
            &config(),
            Arc::new(gateway),
            Arc::new(MapDiskTier::default()),
        )
    }

    #[tokio::test]
    async fn pages_of_one_context_reuse_the_strategy() {
        let mut gateway = MockLibraryGateway::new();
        gateway
            .expect_fetch_album_assets()
            .times(1)
            .returning(|_| {
                Ok((0..7).map(|i| asset(&format!("a{i}"), i)).collect())
            });
        let library = library(gateway);
        let album = FilterContext::collection(AlbumId::new("trip").unwrap());

        let first = library.fetch_page(&album, 1, 5).await.unwrap();
        let second = library.fetch_page(&album, 2, 5).await.unwrap();
        assert_eq!(first.items.len(), 5);
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.next_page, None);
        assert_eq!(
            library.strategy_for(&album).kind(),
            StrategyKind::FixedCollection
        );
    }

    #[tokio::test]
    async fn switching_context_builds_a_new_strategy() {
        let mut gateway = MockLibraryGateway::new();
        gateway
            .expect_fetch_album_assets()
            .times(2)
            .returning(|_| Ok(vec![asset("a", 1)]));
        gateway
            .expect_query_metadata()
            .times(1)
            .returning(|_, _, _| Ok(Page::empty(0)));
        let library = library(gateway);
        let album = FilterContext::collection(AlbumId::new("trip").unwrap());
        let query = FilterContext::query(MetadataFilter::default());

        library.fetch_page(&album, 1, 10).await.unwrap();
        library.fetch_page(&query, 1, 10).await.unwrap();
        // Back to the album: its previous strategy was dropped.
        library.fetch_page(&album, 1, 10).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_page_is_rejected_before_any_request() {
        let library = library(MockLibraryGateway::new());
        let err = library
            .fetch_page(&FilterContext::location("Oslo"), 0, 10)
            .await
            .unwrap_err();
        assert_eq!(err, LibraryError::InvalidPage { page: 0, page_size: 10 });
    }

    #[tokio::test]
    async fn thumbnails_are_fetched_once() {
        let mut gateway = MockLibraryGateway::new();
        gateway
            .expect_fetch_blob()
            .withf(|id, variant| {
                id.as_str() == "p1" && *variant == ImageVariant::Thumbnail
            })
            .times(1)
            .returning(|_, _| Ok(vec![7u8; 32]));
        let library = library(gateway);
        let id = AssetId::new("p1").unwrap();

        let first =
            library.thumbnail(&id, ImageVariant::Thumbnail).await.unwrap();
        let again =
            library.thumbnail(&id, ImageVariant::Thumbnail).await.unwrap();
        assert_eq!(first.bytes(), again.bytes());

        let stats = library.cache_statistics().await;
        assert_eq!(stats.memory_count, 1);
        assert_eq!(stats.memory_bytes, 32);
        assert_eq!(stats.counters.memory_hits, 1);
    }

    #[tokio::test]
    async fn thumbnail_load_failure_surfaces_as_load_error() {
        let mut gateway = MockLibraryGateway::new();
        gateway
            .expect_fetch_blob()
            .returning(|id, _| Err(GatewayError::NotFound(id.to_string())));
        let library = library(gateway);

        let err = library
            .thumbnail(&AssetId::new("gone").unwrap(), ImageVariant::Preview)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::Load(_)));
        assert_eq!(library.cache_statistics().await.memory_count, 0);
    }

    #[tokio::test]
    async fn invalidate_all_refetches_markers() {
        let mut gateway = MockLibraryGateway::new();
        gateway.expect_query_markers().times(2).returning(|| {
            Ok(vec![Marker::new(
                AssetId::new("m1").unwrap(),
                Coordinates::new(59.91, 10.75),
                Some("Oslo".into()),
            )])
        });
        let library = library(gateway);

        assert_eq!(library.location_count().await.unwrap(), 1);
        assert_eq!(library.location_count().await.unwrap(), 1);
        library.invalidate_all().await;
        let summaries = library.location_summaries().await.unwrap();
        assert_eq!(summaries[0].name, "Oslo");
    }
}
