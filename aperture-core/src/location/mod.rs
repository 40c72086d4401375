//! Location index built from the lightweight marker feed.
//!
//! One cheap marker fetch answers location counts, per-location summaries
//! and identifier resolution, instead of paging full metadata for each.

mod canonical;

pub use canonical::{
    LocationCanonicalizer, VariantTableCanonicalizer, canonicalize_location,
    normalize_location,
};

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use aperture_model::{AssetId, LocationSummary, Marker, MetadataFilter};
use parking_lot::RwLock;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    error::{GatewayError, Result},
    gateway::LibraryGateway,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationIndexSettings {
    /// How long a fetched marker set is served without refetching.
    pub freshness: Duration,
    /// Page size of the full-metadata fallback.
    pub fallback_batch_size: u32,
    /// Upper bound on fallback pages fetched per refresh.
    pub fallback_max_batches: u32,
}

impl Default for LocationIndexSettings {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(5 * 60),
            fallback_batch_size: 1000,
            fallback_max_batches: 5,
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    markers: Arc<[Marker]>,
    summaries: Arc<[LocationSummary]>,
    fetched_at: Instant,
}

/// Shared marker cache plus the summaries derived from it.
///
/// Markers and summaries are refreshed and invalidated together.
pub struct LocationIndex {
    gateway: Arc<dyn LibraryGateway>,
    canonicalizer: Arc<dyn LocationCanonicalizer>,
    settings: LocationIndexSettings,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
}

impl fmt::Debug for LocationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationIndex")
            .field("canonicalizer", &self.canonicalizer)
            .field("settings", &self.settings)
            .field("cached", &self.snapshot.read().is_some())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LocationIndex {
    pub fn new(
        gateway: Arc<dyn LibraryGateway>,
        canonicalizer: Arc<dyn LocationCanonicalizer>,
        settings: LocationIndexSettings,
    ) -> Self {
        Self {
            gateway,
            canonicalizer,
            settings,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn canonicalizer(&self) -> &Arc<dyn LocationCanonicalizer> {
        &self.canonicalizer
    }

    /// All markers with valid coordinates, in feed order.
    pub async fn markers(&self) -> Result<Arc<[Marker]>> {
        Ok(Arc::clone(&self.snapshot().await?.markers))
    }

    /// Markers grouped by canonical location name, largest groups first.
    pub async fn location_summaries(&self) -> Result<Arc<[LocationSummary]>> {
        Ok(Arc::clone(&self.snapshot().await?.summaries))
    }

    pub async fn location_count(&self) -> Result<usize> {
        Ok(self.snapshot().await?.summaries.len())
    }

    /// Identifiers of markers whose canonical location equals that of
    /// `location`, in marker order.
    pub async fn identifiers_for(
        &self,
        location: &str,
    ) -> Result<Vec<AssetId>> {
        let Some(wanted) = self.canonicalizer.canonicalize(location) else {
            return Ok(Vec::new());
        };
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .markers
            .iter()
            .filter(|m| {
                m.location
                    .as_deref()
                    .and_then(|name| self.canonicalizer.canonicalize(name))
                    .is_some_and(|c| c == wanted)
            })
            .map(|m| m.id.clone())
            .collect())
    }

    /// Drop cached markers and summaries, e.g. on session switch.
    ///
    /// A refresh already in flight finishes but does not repopulate.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.snapshot.write() = None;
        debug!("location index invalidated");
    }

    fn fresh_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .as_ref()
            .filter(|s| s.fetched_at.elapsed() < self.settings.freshness)
            .cloned()
    }

    async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.fresh_snapshot() {
            return Ok(snapshot);
        }

        let _refresh = self.refresh_lock.lock().await;
        if let Some(snapshot) = self.fresh_snapshot() {
            return Ok(snapshot);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let markers = self.fetch_markers().await?;
        let summaries = summarize(&markers, self.canonicalizer.as_ref());
        let snapshot = Arc::new(Snapshot {
            markers: markers.into(),
            summaries: summaries.into(),
            fetched_at: Instant::now(),
        });

        if self.generation.load(Ordering::SeqCst) == generation {
            *self.snapshot.write() = Some(Arc::clone(&snapshot));
        } else {
            debug!("location index refresh discarded after invalidation");
        }
        Ok(snapshot)
    }

    async fn fetch_markers(&self) -> Result<Vec<Marker>> {
        let raw = match self.gateway.query_markers().await {
            Ok(markers) => markers,
            Err(GatewayError::Unauthorized) => {
                return Err(GatewayError::Unauthorized.into());
            }
            Err(err) => {
                info!(
                    error = %err,
                    "marker feed unavailable; falling back to metadata pages"
                );
                self.fetch_markers_fallback().await?
            }
        };

        let before = raw.len();
        let markers: Vec<Marker> =
            raw.into_iter().filter(|m| m.coordinates.is_valid()).collect();
        if markers.len() < before {
            warn!(
                dropped = before - markers.len(),
                "dropped markers with out-of-range coordinates"
            );
        }
        debug!(count = markers.len(), "marker feed refreshed");
        Ok(markers)
    }

    async fn fetch_markers_fallback(&self) -> Result<Vec<Marker>> {
        let filter = MetadataFilter::with_coordinates();
        let batch_size = self.settings.fallback_batch_size.max(1);
        let mut markers = Vec::new();

        for page in 1..=self.settings.fallback_max_batches.max(1) {
            let batch = self
                .gateway
                .query_metadata(&filter, page, batch_size)
                .await?;
            markers.extend(batch.items.into_iter().filter_map(|asset| {
                Some(Marker::new(asset.id, asset.coordinates?, asset.location))
            }));
            if batch.next_page.is_none() {
                return Ok(markers);
            }
        }

        warn!(
            fetched = markers.len(),
            max_batches = self.settings.fallback_max_batches,
            "marker fallback hit its batch cap; locations may be incomplete"
        );
        Ok(markers)
    }
}

/// Group markers by canonical location, keeping the first marker of each
/// group as its representative. Markers without a usable name are skipped.
fn summarize(
    markers: &[Marker],
    canonicalizer: &dyn LocationCanonicalizer,
) -> Vec<LocationSummary> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut summaries: Vec<LocationSummary> = Vec::new();

    for marker in markers {
        let Some(name) = marker.location.as_deref() else {
            continue;
        };
        let Some(canonical) = canonicalizer.canonicalize(name) else {
            continue;
        };
        match slots.get(&canonical) {
            Some(&slot) => summaries[slot].count += 1,
            None => {
                slots.insert(canonical.clone(), summaries.len());
                summaries.push(LocationSummary {
                    name: name.trim().to_string(),
                    canonical,
                    count: 1,
                    representative: marker.id.clone(),
                });
            }
        }
    }

    summaries.sort_by(|a, b| {
        b.count.cmp(&a.count).then_with(|| a.canonical.cmp(&b.canonical))
    });
    summaries
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use aperture_model::{Asset, Coordinates, MetadataPage};
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::gateway::MockLibraryGateway;

    fn marker(id: &str, location: Option<&str>) -> Marker {
        Marker::new(
            AssetId::new(id).unwrap(),
            Coordinates::new(40.7, -74.0),
            location.map(str::to_string),
        )
    }

    fn index_with(
        gateway: MockLibraryGateway,
        settings: LocationIndexSettings,
    ) -> LocationIndex {
        LocationIndex::new(
            Arc::new(gateway),
            Arc::new(VariantTableCanonicalizer::new([("NYC", "New York")])),
            settings,
        )
    }

    fn sample_markers() -> Vec<Marker> {
        vec![
            marker("a", Some("New York")),
            marker("b", Some("  new   york ")),
            marker("c", Some("Paris")),
            marker("d", Some("NYC")),
            Marker::new(
                AssetId::new("bad").unwrap(),
                Coordinates::new(123.0, 0.0),
                Some("Nowhere".into()),
            ),
        ]
    }

    #[tokio::test]
    async fn summaries_merge_variants_and_count_every_marker() {
        let mut gateway = MockLibraryGateway::new();
        gateway
            .expect_query_markers()
            .times(1)
            .returning(|| Ok(sample_markers()));
        let index = index_with(gateway, LocationIndexSettings::default());

        let summaries = index.location_summaries().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].canonical, "new york");
        assert_eq!(summaries[0].name, "New York");
        assert_eq!(summaries[0].count, 3);
        assert_eq!(summaries[0].representative.as_str(), "a");
        assert_eq!(summaries[1].canonical, "paris");

        let total: usize = summaries.iter().map(|s| s.count).sum();
        assert_eq!(total, index.markers().await.unwrap().len());
    }

    #[tokio::test]
    async fn identifiers_follow_marker_order() {
        let mut gateway = MockLibraryGateway::new();
        gateway
            .expect_query_markers()
            .times(1)
            .returning(|| Ok(sample_markers()));
        let index = index_with(gateway, LocationIndexSettings::default());

        let ids = index.identifiers_for("new york").await.unwrap();
        let ids: Vec<&str> = ids.iter().map(AssetId::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);

        assert!(index.identifiers_for("Atlantis").await.unwrap().is_empty());
        assert!(index.identifiers_for("   ").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn markers_are_refetched_after_freshness_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut gateway = MockLibraryGateway::new();
        gateway.expect_query_markers().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(sample_markers())
        });
        let index = index_with(gateway, LocationIndexSettings::default());

        index.markers().await.unwrap();
        index.location_summaries().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        index.markers().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let mut gateway = MockLibraryGateway::new();
        gateway
            .expect_query_markers()
            .times(2)
            .returning(|| Ok(sample_markers()));
        let index = index_with(gateway, LocationIndexSettings::default());

        index.markers().await.unwrap();
        index.invalidate();
        index.markers().await.unwrap();
    }

    #[tokio::test]
    async fn unsupported_feed_falls_back_to_capped_metadata_pages() {
        let mut gateway = MockLibraryGateway::new();
        gateway.expect_query_markers().times(1).returning(|| {
            Err(GatewayError::Unsupported("map markers".into()))
        });
        gateway
            .expect_query_metadata()
            .withf(|filter, _, size| {
                filter.has_coordinates == Some(true) && *size == 2
            })
            .times(3)
            .returning(|_, page, _| {
                let taken = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
                let items = (0..2)
                    .map(|i| {
                        Asset::new(
                            AssetId::new(format!("p{page}-{i}")).unwrap(),
                            "img.jpg",
                            taken,
                        )
                        .with_location("Oslo", Coordinates::new(59.9, 10.7))
                    })
                    .collect();
                Ok(MetadataPage {
                    items,
                    total: 100,
                    next_page: Some(page + 1),
                })
            });
        let index = index_with(
            gateway,
            LocationIndexSettings {
                fallback_batch_size: 2,
                fallback_max_batches: 3,
                ..LocationIndexSettings::default()
            },
        );

        let markers = index.markers().await.unwrap();
        assert_eq!(markers.len(), 6);
        assert_eq!(index.identifiers_for("oslo").await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn unauthorized_feed_is_not_masked_by_fallback() {
        let mut gateway = MockLibraryGateway::new();
        gateway
            .expect_query_markers()
            .returning(|| Err(GatewayError::Unauthorized));
        gateway.expect_query_metadata().never();
        let index = index_with(gateway, LocationIndexSettings::default());

        let err = index.markers().await.unwrap_err();
        assert_eq!(err, crate::error::LibraryError::Unauthorized);
    }
}
