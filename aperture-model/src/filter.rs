use std::fmt;

use crate::ids::{AlbumId, AssetId};

/// Caller-visible ordering preference for browsed assets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::NewestFirst => f.write_str("newest_first"),
            SortOrder::OldestFirst => f.write_str("oldest_first"),
        }
    }
}

/// Server-side metadata filter.
///
/// Every field narrows the result set; an all-default filter matches the
/// whole library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetadataFilter {
    pub album: Option<AlbumId>,
    pub person: Option<String>,
    pub tag: Option<String>,
    pub location: Option<String>,
    pub favorite: Option<bool>,
    pub path: Option<String>,
    pub ids: Option<Vec<AssetId>>,
    pub has_coordinates: Option<bool>,
    pub text: Option<String>,
    pub order: SortOrder,
}

impl MetadataFilter {
    pub fn for_ids(ids: Vec<AssetId>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn with_coordinates() -> Self {
        Self {
            has_coordinates: Some(true),
            ..Self::default()
        }
    }

    pub fn ordered(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

/// Criteria selecting which records a retrieval pages through.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum FilterContext {
    /// A bounded, fixed member list.
    Collection { album: AlbumId },
    /// Assets whose location name matches.
    Location { name: String },
    /// Anything else; resolved by the server.
    Query { filter: MetadataFilter },
}

impl FilterContext {
    pub fn collection(album: AlbumId) -> Self {
        Self::Collection { album }
    }

    pub fn location(name: impl Into<String>) -> Self {
        Self::Location { name: name.into() }
    }

    pub fn query(filter: MetadataFilter) -> Self {
        Self::Query { filter }
    }
}
