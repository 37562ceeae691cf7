//! Master index error types

use crate::container::ContainerError;
use crate::index::IndexError;
use thiserror::Error;

/// Master index and checksum table error type
#[derive(Debug, Error)]
pub enum MasterIndexError {
    /// A master index is a whole number of 8-byte entries
    #[error("master index length {0} is not a multiple of 8")]
    InvalidLength(usize),

    /// The checksum table's trailing checksum does not match its entries
    #[error("checksum table mismatch: expected {expected:#010x}, was {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum computed from the entries
        expected: u32,
        /// Checksum stored after the entries
        actual: u32,
    },

    /// Archive or group ids not in ascending order
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A catalog container could not be opened
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// A catalog could not be parsed
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Truncated input or other binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for master index operations
pub type MasterIndexResult<T> = Result<T, MasterIndexError>;
