//! Group packing error types

use thiserror::Error;

/// Group packing error type
#[derive(Debug, Error)]
pub enum GroupError {
    /// A group must hold at least one file
    #[error("group has no files")]
    NoFiles,

    /// A file too large for the length trailer
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The length trailer does not describe the payload
    #[error("corrupt group: {0}")]
    Corrupt(String),

    /// Truncated trailer or other binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for group packing operations
pub type GroupResult<T> = Result<T, GroupError>;
