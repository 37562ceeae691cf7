//! Container error types

use thiserror::Error;

/// Container-specific error type
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Structurally invalid container: missing header, unknown compression
    /// tag, negative or truncated lengths, or decompressed data longer than
    /// declared
    #[error("invalid container: {0}")]
    InvalidFormat(String),

    /// The decompressor ran out of input before producing the declared
    /// uncompressed length
    #[error("unexpected end of data: expected {expected} bytes, got {actual}")]
    UnexpectedEndOfData {
        /// Declared uncompressed length
        expected: usize,
        /// Bytes produced before the stream ended
        actual: usize,
    },

    /// Compression/decompression error reported by a codec
    #[error("compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for container operations
pub type ContainerResult<T> = Result<T, ContainerError>;
