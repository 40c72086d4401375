use chrono::{DateTime, Utc};

use crate::ids::AssetId;

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both components are finite and inside [-90, 90] / [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A full remote record, retrievable by identifier.
///
/// Records are immutable once fetched; the client never writes them back.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Asset {
    pub id: AssetId,
    pub file_name: String,
    pub taken_at: DateTime<Utc>,
    pub is_favorite: bool,
    pub location: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl Asset {
    pub fn new(
        id: AssetId,
        file_name: impl Into<String>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            taken_at,
            is_favorite: false,
            location: None,
            coordinates: None,
        }
    }

    pub fn with_location(
        mut self,
        name: impl Into<String>,
        coordinates: Coordinates,
    ) -> Self {
        self.location = Some(name.into());
        self.coordinates = Some(coordinates);
        self
    }
}
