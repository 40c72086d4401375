//! File configuration.
//!
//! Every section and field is optional; missing values take the defaults
//! below. Durations are human strings (`"5m"`, `"7d"`) or whole seconds;
//! byte sizes are integers or strings such as `"64MiB"`.
//!
//! ```toml
//! [cache]
//! memory_max_bytes = "64MiB"
//! disk_max_age = "7d"
//!
//! [location]
//! freshness = "5m"
//! variants = { "nyc" = "new york" }
//!
//! [library]
//! sort_order = "oldest_first"
//! ```

use std::{collections::BTreeMap, fs, path::Path, path::PathBuf, time::Duration};

use aperture_model::SortOrder;
use serde::Deserialize;

use crate::{
    cache::{DiskCacheRoot, DiskTierLimits, MemoryTierLimits},
    error::{LibraryError, Result},
    location::{LocationIndexSettings, VariantTableCanonicalizer},
    units::ByteSize,
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ApertureConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Blob store directory. Defaults to the platform cache directory,
    /// namespaced by [`LibraryConfig::server_url`].
    pub root: Option<PathBuf>,
    pub memory_max_bytes: ByteSize,
    pub memory_max_items: usize,
    pub disk_max_bytes: ByteSize,
    #[serde(deserialize_with = "duration::deserialize")]
    pub disk_max_age: Duration,
    /// Period of the background expiry sweep; zero disables it.
    #[serde(deserialize_with = "duration::deserialize")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let memory = MemoryTierLimits::defaults();
        let disk = DiskTierLimits::defaults();
        Self {
            root: None,
            memory_max_bytes: memory.max_bytes,
            memory_max_items: memory.max_items,
            disk_max_bytes: disk.max_bytes,
            disk_max_age: disk.max_age,
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl CacheConfig {
    pub fn memory_limits(&self) -> MemoryTierLimits {
        MemoryTierLimits {
            max_bytes: self.memory_max_bytes,
            max_items: self.memory_max_items,
        }
    }

    pub fn disk_limits(&self) -> DiskTierLimits {
        DiskTierLimits {
            max_bytes: self.disk_max_bytes,
            max_age: self.disk_max_age,
        }
    }

    /// The configured root, or the per-server platform directory.
    pub fn resolve_root(
        &self,
        server_url: &str,
    ) -> anyhow::Result<DiskCacheRoot> {
        match &self.root {
            Some(path) => Ok(DiskCacheRoot::new(path.clone())),
            None => DiskCacheRoot::for_server(server_url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocationConfig {
    #[serde(deserialize_with = "duration::deserialize")]
    pub freshness: Duration,
    pub fallback_batch_size: u32,
    pub fallback_max_batches: u32,
    /// Spelling variant → canonical location name.
    pub variants: BTreeMap<String, String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        let settings = LocationIndexSettings::default();
        Self {
            freshness: settings.freshness,
            fallback_batch_size: settings.fallback_batch_size,
            fallback_max_batches: settings.fallback_max_batches,
            variants: BTreeMap::new(),
        }
    }
}

impl LocationConfig {
    pub fn settings(&self) -> LocationIndexSettings {
        LocationIndexSettings {
            freshness: self.freshness,
            fallback_batch_size: self.fallback_batch_size,
            fallback_max_batches: self.fallback_max_batches,
        }
    }

    pub fn canonicalizer(&self) -> VariantTableCanonicalizer {
        VariantTableCanonicalizer::new(&self.variants)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    pub sort_order: SortOrder,
    /// Used only to namespace the default cache directory.
    pub server_url: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            sort_order: SortOrder::default(),
            server_url: "http://localhost".to_string(),
        }
    }
}

impl ApertureConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|err| {
            LibraryError::Config(format!("invalid toml: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents).map_err(|err| {
            LibraryError::Config(format!("invalid json: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`, choosing the format by extension (TOML unless `.json`).
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            LibraryError::Config(format!(
                "failed to read config from {}: {err}",
                path.display()
            ))
        })?;

        let parsed = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        };
        parsed.map_err(|err| match err {
            LibraryError::Config(msg) => {
                LibraryError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.cache.memory_max_items == 0 {
            return Err(LibraryError::Config(
                "cache.memory_max_items must be at least 1".into(),
            ));
        }
        if self.location.fallback_batch_size == 0 {
            return Err(LibraryError::Config(
                "location.fallback_batch_size must be at least 1".into(),
            ));
        }
        if self.location.fallback_max_batches == 0 {
            return Err(LibraryError::Config(
                "location.fallback_max_batches must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(&text)
                .map_err(|err| de::Error::custom(format!("{text:?}: {err}"))),
        }
    }
}
