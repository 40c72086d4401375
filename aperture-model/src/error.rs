use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidPage { page: u32, page_size: u32 },
    EmptyIdentifier,
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidPage { page, page_size } => write!(
                f,
                "invalid page request: page={page}, page_size={page_size}"
            ),
            ModelError::EmptyIdentifier => {
                write!(f, "identifier must not be empty")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
