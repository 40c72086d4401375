use aperture_model::ModelError;
use thiserror::Error;

use crate::cache::BlobKey;

/// Failures reported by the network gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Server error: HTTP {code}")]
    Server { code: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported by server: {0}")]
    Unsupported(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// A blob loader failed; nothing was cached for `key`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to load {key}: {source}")]
pub struct LoadError {
    pub key: BlobKey,
    #[source]
    pub source: GatewayError,
}

/// Errors surfaced to the presentation layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Server error: HTTP {code}")]
    Server { code: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Invalid page request: page={page}, page_size={page_size}")]
    InvalidPage { page: u32, page_size: u32 },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<GatewayError> for LibraryError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(what) => LibraryError::NotFound(what),
            GatewayError::Unauthorized => LibraryError::Unauthorized,
            GatewayError::Server { code } => LibraryError::Server { code },
            GatewayError::Network(msg) => LibraryError::Network(msg),
            GatewayError::Decode(msg) => LibraryError::Decode(msg),
            GatewayError::Unsupported(_) => LibraryError::Server { code: 501 },
        }
    }
}

impl From<ModelError> for LibraryError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidPage { page, page_size } => {
                LibraryError::InvalidPage { page, page_size }
            }
            ModelError::EmptyIdentifier => {
                LibraryError::InvalidIdentifier(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
