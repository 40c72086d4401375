use std::{fmt, sync::Arc};

use aperture_model::{AlbumId, Asset, Page, PageRequest, SortOrder};
use tokio::sync::Mutex;
use tracing::debug;

use super::{SortPreference, sample, sort_assets};
use crate::{error::Result, gateway::LibraryGateway};

#[derive(Debug)]
struct SortedCollection {
    order: SortOrder,
    assets: Arc<[Asset]>,
}

/// Loads a bounded collection once and pages through it locally.
///
/// The cached collection lives until [`clear`](Self::clear); later pages and
/// random samples never touch the network.
pub struct FixedCollectionStrategy {
    gateway: Arc<dyn LibraryGateway>,
    album: AlbumId,
    sort: Arc<dyn SortPreference>,
    cached: Mutex<Option<SortedCollection>>,
}

impl fmt::Debug for FixedCollectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedCollectionStrategy")
            .field("album", &self.album)
            .field("sort", &self.sort)
            .finish_non_exhaustive()
    }
}

impl FixedCollectionStrategy {
    pub fn new(
        gateway: Arc<dyn LibraryGateway>,
        album: AlbumId,
        sort: Arc<dyn SortPreference>,
    ) -> Self {
        Self {
            gateway,
            album,
            sort,
            cached: Mutex::new(None),
        }
    }

    pub fn album(&self) -> &AlbumId {
        &self.album
    }

    pub async fn fetch_page(
        &self,
        request: PageRequest,
    ) -> Result<Page<Asset>> {
        let assets = self.collection().await?;
        Ok(Page::from_slice(&assets[..], request))
    }

    pub async fn fetch_random(&self, limit: u32) -> Result<Page<Asset>> {
        let assets = self.collection().await?;
        Ok(Page::complete(sample(&assets[..], limit as usize)))
    }

    /// Forget the cached collection; the next call refetches it.
    pub async fn clear(&self) {
        *self.cached.lock().await = None;
    }

    async fn collection(&self) -> Result<Arc<[Asset]>> {
        let order = self.sort.sort_order();
        let mut cached = self.cached.lock().await;

        if let Some(existing) = cached.as_mut() {
            if existing.order != order {
                let mut resorted = existing.assets.to_vec();
                sort_assets(&mut resorted, order);
                existing.assets = resorted.into();
                existing.order = order;
            }
            return Ok(Arc::clone(&existing.assets));
        }

        let mut assets = self.gateway.fetch_album_assets(&self.album).await?;
        sort_assets(&mut assets, order);
        debug!(album = %self.album, count = assets.len(), "collection cached");

        let assets: Arc<[Asset]> = assets.into();
        *cached = Some(SortedCollection {
            order,
            assets: Arc::clone(&assets),
        });
        Ok(assets)
    }
}
