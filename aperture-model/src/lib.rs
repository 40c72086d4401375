//! Core data model definitions shared across Aperture crates.
#![allow(missing_docs)]

pub mod asset;
pub mod error;
pub mod filter;
pub mod ids;
pub mod image;
pub mod marker;
pub mod page;

pub use asset::{Asset, Coordinates};
pub use error::{ModelError, Result as ModelResult};
pub use filter::{FilterContext, MetadataFilter, SortOrder};
pub use ids::{AlbumId, AssetId};
pub use image::ImageVariant;
pub use marker::{LocationSummary, Marker};
pub use page::{MetadataPage, Page, PageRequest};
