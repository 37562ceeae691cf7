//! Error types for cryptographic operations

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
}
