use std::{collections::HashSet, fmt, sync::Arc};

use aperture_model::{Asset, AssetId, MetadataFilter, Page, PageRequest};
use dashmap::DashMap;
use futures::{StreamExt, stream};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{SortPreference, sample, sort_assets};
use crate::{
    error::{GatewayError, LibraryError, Result},
    gateway::LibraryGateway,
    location::LocationIndex,
};

/// Upper bound on concurrent single-record requests during fallback.
const PER_ID_CONCURRENCY: usize = 8;

/// Resolves a location's identifiers from the location index, then fetches
/// full records only for the requested slice.
///
/// Records are cached per instance; nothing is shared across contexts.
pub struct IdentifierFetchStrategy {
    gateway: Arc<dyn LibraryGateway>,
    locations: Arc<LocationIndex>,
    location: String,
    sort: Arc<dyn SortPreference>,
    identifiers: Mutex<Option<Arc<[AssetId]>>>,
    records: DashMap<AssetId, Asset>,
}

impl fmt::Debug for IdentifierFetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierFetchStrategy")
            .field("location", &self.location)
            .field("sort", &self.sort)
            .field("cached_records", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl IdentifierFetchStrategy {
    pub fn new(
        gateway: Arc<dyn LibraryGateway>,
        locations: Arc<LocationIndex>,
        location: impl Into<String>,
        sort: Arc<dyn SortPreference>,
    ) -> Self {
        Self {
            gateway,
            locations,
            location: location.into(),
            sort,
            identifiers: Mutex::new(None),
            records: DashMap::new(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn cached_records(&self) -> usize {
        self.records.len()
    }

    pub async fn fetch_page(
        &self,
        request: PageRequest,
    ) -> Result<Page<Asset>> {
        let identifiers = self.identifiers().await?;
        let total = identifiers.len();
        let Some(range) = request.bounds(total) else {
            return Ok(Page::empty(total));
        };

        let mut items = self.resolve(&identifiers[range]).await?;
        sort_assets(&mut items, self.sort.sort_order());
        Ok(Page {
            items,
            total,
            next_page: request.next_page(total),
        })
    }

    pub async fn fetch_random(&self, limit: u32) -> Result<Page<Asset>> {
        let identifiers = self.identifiers().await?;
        let picked = sample(&identifiers[..], limit as usize);
        let items = self.resolve(&picked).await?;
        Ok(Page::complete(items))
    }

    async fn identifiers(&self) -> Result<Arc<[AssetId]>> {
        let mut cached = self.identifiers.lock().await;
        if let Some(ids) = cached.as_ref() {
            return Ok(Arc::clone(ids));
        }
        let ids: Arc<[AssetId]> =
            self.locations.identifiers_for(&self.location).await?.into();
        debug!(
            location = %self.location,
            count = ids.len(),
            "location identifiers resolved"
        );
        *cached = Some(Arc::clone(&ids));
        Ok(ids)
    }

    /// Records for `wanted`, in `wanted` order, skipping any that could not
    /// be fetched. Fails only when none of `wanted` could be produced.
    async fn resolve(&self, wanted: &[AssetId]) -> Result<Vec<Asset>> {
        let missing: Vec<AssetId> = wanted
            .iter()
            .filter(|id| !self.records.contains_key(*id))
            .cloned()
            .collect();

        let last_error = if missing.is_empty() {
            None
        } else {
            self.fetch_missing(missing).await?
        };

        let items: Vec<Asset> = wanted
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.value().clone()))
            .collect();

        match last_error {
            Some(err) if items.is_empty() && !wanted.is_empty() => {
                Err(err.into())
            }
            _ => Ok(items),
        }
    }

    /// One batched request for `missing`, then single-record requests for
    /// whatever the batch did not produce. Returns the last per-record
    /// failure, if any.
    async fn fetch_missing(
        &self,
        missing: Vec<AssetId>,
    ) -> Result<Option<GatewayError>> {
        let mut pending: HashSet<AssetId> = missing.iter().cloned().collect();
        let filter = MetadataFilter::for_ids(missing.clone());
        let batch_size = u32::try_from(missing.len()).unwrap_or(u32::MAX);

        match self.gateway.query_metadata(&filter, 1, batch_size).await {
            Ok(batch) => {
                for asset in batch.items {
                    if pending.remove(&asset.id) {
                        self.records.insert(asset.id.clone(), asset);
                    }
                }
                if !pending.is_empty() {
                    debug!(
                        omitted = pending.len(),
                        "batch response omitted identifiers; \
                         fetching individually"
                    );
                }
            }
            Err(GatewayError::Unauthorized) => {
                return Err(LibraryError::Unauthorized);
            }
            Err(err) => {
                warn!(
                    error = %err,
                    count = missing.len(),
                    "batched record fetch failed; fetching individually"
                );
            }
        }

        if pending.is_empty() {
            return Ok(None);
        }

        // Keep request order so logs line up with the page slice.
        let pending: Vec<AssetId> = missing
            .into_iter()
            .filter(|id| pending.contains(id))
            .collect();

        let results: Vec<(AssetId, std::result::Result<Asset, GatewayError>)> =
            stream::iter(pending)
                .map(|id| async move {
                    let result = self.gateway.fetch_asset(&id).await;
                    (id, result)
                })
                .buffered(PER_ID_CONCURRENCY)
                .collect()
                .await;

        let mut last_error = None;
        for (id, result) in results {
            match result {
                Ok(asset) => {
                    self.records.insert(id, asset);
                }
                Err(GatewayError::Unauthorized) => {
                    return Err(LibraryError::Unauthorized);
                }
                Err(err) => {
                    warn!(
                        id = %id,
                        error = %err,
                        "record fetch failed; omitting from page"
                    );
                    last_error = Some(err);
                }
            }
        }
        Ok(last_error)
    }
}
