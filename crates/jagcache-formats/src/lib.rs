//! Container and catalog formats for the game cache archive
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! This crate provides symmetric (parser and builder) implementations of the
//! byte formats that give stored groups their meaning.
//!
//! # Supported Formats
//!
//! - **Container**: compression (none, BZIP2, GZIP, LZMA) and XTEA
//!   encryption envelope wrapped around every stored group
//! - **Index**: per-archive catalog of groups, their checksums, versions,
//!   digests, lengths and packed files
//! - **Group**: striped packing of a group's files into one payload
//! - **Master index**: per-archive catalog checksums and versions, plus the
//!   older per-group checksum table
//!
//! The catalog is built on [`collection::NamedEntryCollection`], a sparse
//! id-addressed collection with a unique name-hash index.
//!
//! # Design Principles
//!
//! - **Symmetric Operations**: Both parsing and building supported
//! - **Type Safety**: Optional fields are `Option`s in memory, sentinel
//!   values only on the wire
//! - **Round-Trip Guarantee**: parse(build(data)) == data

#![warn(missing_docs)]

pub mod collection;
pub mod container;
pub mod group;
pub mod index;
pub mod master_index;

// Test utilities module
#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod test_utils;

pub use collection::{CollectionError, Entry, NamedEntryCollection};
pub use container::{CompressionOptions, CompressionType, ContainerError};
pub use group::{Files, GroupError};
pub use index::{Group, Index, IndexError, Protocol};
pub use master_index::{ChecksumTable, MasterIndex, MasterIndexEntry, MasterIndexError};

/// Common format trait implemented by the catalog formats
pub trait CacheFormat: Sized {
    /// Parse from bytes
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>>;

    /// Build to bytes
    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Verify round-trip correctness
    fn verify_round_trip(data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        let parsed = Self::parse(data)?;
        let rebuilt = parsed.build()?;
        if data != rebuilt.as_slice() {
            return Err("Round-trip verification failed".into());
        }
        Ok(())
    }
}
