//! Catalog error types

use crate::collection::CollectionError;
use thiserror::Error;

/// Catalog-specific error type
#[derive(Debug, Error)]
pub enum IndexError {
    /// The protocol byte names no known catalog layout
    #[error("unsupported index protocol: {0}")]
    UnsupportedProtocol(u8),

    /// A count, id delta or id outside what the layout can encode
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The same id appears twice in one id list
    #[error("duplicate id: {0}")]
    DuplicateId(u32),

    /// Name index conflict while populating the catalog
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    /// Truncated input or other binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for catalog operations
pub type IndexResult<T> = Result<T, IndexError>;
