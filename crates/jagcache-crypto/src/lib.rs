//! Cryptographic operations for the game cache archive format
//!
//! This crate provides the primitives used by the container codec and the
//! catalog format:
//!
//! - **Encryption**: XTEA block cipher applied in place to container payloads
//! - **Name Hashing**: the 31-multiplier string hash used to name groups and
//!   files inside a catalog
//!
//! # Examples
//!
//! ## XTEA Round Trip
//!
//! ```
//! use jagcache_crypto::XteaKey;
//!
//! let key = XteaKey::from_hex("000102030405060708090a0b0c0d0e0f").expect("valid key");
//! let mut data = *b"ABCDEFGH";
//! key.encrypt(&mut data);
//! key.decrypt(&mut data);
//! assert_eq!(&data, b"ABCDEFGH");
//! ```
//!
//! ## Name Hashing
//!
//! ```
//! use jagcache_crypto::name_hash;
//!
//! assert_eq!(name_hash(""), 0);
//! assert_eq!(name_hash("a"), 97);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod name;
pub mod xtea;

pub use error::CryptoError;

// Re-export commonly used types
pub use name::name_hash;
pub use xtea::XteaKey;
