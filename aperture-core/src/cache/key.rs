use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use aperture_model::{AssetId, ImageVariant};

/// Stable key for locating a blob in either cache tier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey(Arc<str>);

impl BlobKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Build the key for an asset at a given size variant.
    ///
    /// Human-readable and versioned; one key per (identifier, variant).
    pub fn for_asset(id: &AssetId, variant: ImageVariant) -> Self {
        let id = id.as_str();
        let variant = variant.as_str();
        let mut key =
            String::with_capacity(9 + id.len() + 1 + variant.len());
        key.push_str("blobs/v1/");
        key.push_str(id);
        key.push('/');
        key.push_str(variant);
        Self(Arc::from(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BlobKey").field(&&*self.0).finish()
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable cached payload.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedBlob {
    bytes: Arc<[u8]>,
    created_at: SystemTime,
}

/// Shared handle to a cached payload. Callers never mutate blobs.
pub type Blob = Arc<CachedBlob>;

impl CachedBlob {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::with_created_at(bytes, SystemTime::now())
    }

    pub fn with_created_at(
        bytes: impl Into<Arc<[u8]>>,
        created_at: SystemTime,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            created_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Debug for CachedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedBlob")
            .field("byte_len", &self.bytes.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::BlobKey;
    use aperture_model::{AssetId, ImageVariant};

    #[test]
    fn blob_key_is_stable_and_versioned() {
        let id = AssetId::new("0f3c9a").unwrap();

        let key = BlobKey::for_asset(&id, ImageVariant::Thumbnail);
        assert_eq!(key.as_str(), "blobs/v1/0f3c9a/thumbnail");

        let preview = BlobKey::for_asset(&id, ImageVariant::Preview);
        assert_ne!(key, preview);
    }
}
