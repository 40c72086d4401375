//! # Aperture Core
//!
//! Client-side caching and retrieval for a remote, read-mostly media
//! library. Sits between a UI layer and a network gateway.
//!
//! ## Overview
//!
//! - **Blob cache**: two tiers (in-memory LRU + on-disk `cacache` store)
//!   for thumbnails and previews, each with its own budget, plus age-based
//!   expiry on disk.
//! - **Location index**: one cheap marker fetch answers location counts,
//!   summaries and location → identifier lookups.
//! - **Retrieval strategies**: fixed collections paged locally, locations
//!   resolved to identifiers then fetched per page, and everything else
//!   delegated to server-side filtering.
//!
//! ## Architecture
//!
//! - [`gateway`]: the network contract every component consumes
//! - [`cache`]: [`BlobCache`](cache::BlobCache) and its tiers
//! - [`location`]: [`LocationIndex`](location::LocationIndex)
//! - [`retrieval`]: strategies and
//!   [`StrategyFactory`](retrieval::StrategyFactory)
//! - [`library`]: [`MediaLibrary`], wiring all of the above from an
//!   [`ApertureConfig`]
//!
//! ## Examples
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use aperture_core::{ApertureConfig, LibraryGateway, MediaLibrary};
//! use aperture_model::FilterContext;
//!
//! async fn first_page(
//!     gateway: Arc<dyn LibraryGateway>,
//! ) -> anyhow::Result<()> {
//!     let config = ApertureConfig::load(Path::new("aperture.toml"))?;
//!     let library = MediaLibrary::open(&config, gateway)?;
//!
//!     let kyoto = FilterContext::location("Kyoto");
//!     let page = library.fetch_page(&kyoto, 1, 50).await?;
//!     println!("{} of {} assets", page.items.len(), page.total);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Two-tier blob cache
pub mod cache;

/// File configuration
pub mod config;

/// Error types surfaced by the gateway and the library
pub mod error;

/// Network gateway contract
pub mod gateway;

/// Composition root
pub mod library;

/// Marker-backed location index
pub mod location;

/// Paging strategies per filter context
pub mod retrieval;

/// Logging bootstrap
pub mod telemetry;

/// Byte size units
pub mod units;

pub use config::ApertureConfig;
pub use error::{
    GatewayError, GatewayResult, LibraryError, LoadError,
    Result as LibraryResult,
};
pub use gateway::LibraryGateway;
pub use library::MediaLibrary;
pub use units::ByteSize;
