use crate::{asset::Coordinates, ids::AssetId};

/// Lightweight remote record: identifier, position and location name only.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Marker {
    pub id: AssetId,
    pub coordinates: Coordinates,
    pub location: Option<String>,
}

impl Marker {
    pub fn new(
        id: AssetId,
        coordinates: Coordinates,
        location: Option<String>,
    ) -> Self {
        Self {
            id,
            coordinates,
            location,
        }
    }
}

/// One group of markers sharing a canonical location name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocationSummary {
    /// Display name, taken from the first marker seen in the group.
    pub name: String,
    /// Canonical form used for grouping and lookups.
    pub canonical: String,
    pub count: usize,
    pub representative: AssetId,
}
