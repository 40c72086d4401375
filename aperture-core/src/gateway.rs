//! Network gateway contract.
//!
//! The gateway issues authenticated requests against the remote inventory.
//! Authentication, retries and transport timeouts live behind this trait;
//! the caching layer only sees decoded records and raw bytes.

use aperture_model::{
    AlbumId, Asset, AssetId, ImageVariant, Marker, MetadataFilter,
    MetadataPage,
};
use async_trait::async_trait;

use crate::error::GatewayResult;

/// Remote inventory operations consumed by caches and strategies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LibraryGateway: Send + Sync {
    /// Raw image bytes for one asset at one size variant.
    async fn fetch_blob(
        &self,
        id: &AssetId,
        variant: ImageVariant,
    ) -> GatewayResult<Vec<u8>>;

    /// The lightweight marker feed.
    ///
    /// Older servers do not expose it and answer with
    /// [`GatewayError::Unsupported`](crate::error::GatewayError::Unsupported)
    /// or `NotFound`.
    async fn query_markers(&self) -> GatewayResult<Vec<Marker>>;

    /// Filtered, sorted, paginated full-metadata query.
    async fn query_metadata(
        &self,
        filter: &MetadataFilter,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<MetadataPage>;

    /// Up to `limit` random records matching `filter`.
    async fn query_random(
        &self,
        filter: &MetadataFilter,
        limit: u32,
    ) -> GatewayResult<Vec<Asset>>;

    /// Every member of a fixed collection.
    async fn fetch_album_assets(
        &self,
        album: &AlbumId,
    ) -> GatewayResult<Vec<Asset>>;

    /// A single full record.
    async fn fetch_asset(&self, id: &AssetId) -> GatewayResult<Asset>;
}
