//! Group storage for the game cache archive.
//!
//! A cache is a set of up to 256 archives, each holding groups addressed by a
//! non-negative integer id. Every group is an opaque byte blob (normally a
//! compressed container, see `jagcache-formats`). This crate persists those
//! blobs and knows nothing about their contents.
//!
//! Two backends implement the [`Store`] trait:
//!
//! - **[`DiskStore`]**: the native block-allocated layout, one shared
//!   `main_file_cache.dat2` data file plus a `main_file_cache.idx<n>` index
//!   file per archive
//! - **[`FlatFileStore`]**: one directory per archive and one `<group>.dat`
//!   file per group, written atomically
//!
//! # Example
//!
//! ```rust,no_run
//! use jagcache_store::{DiskStore, Store};
//!
//! # fn example() -> jagcache_store::Result<()> {
//! let mut store = DiskStore::create("/tmp/cache")?;
//! store.write(2, 10, b"group payload")?;
//! assert_eq!(store.read(2, 10)?, b"group payload");
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Neither backend is safe for concurrent writers; callers serialize access.

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)] // Block and entry fields are u24 on disk
#![allow(clippy::module_name_repetitions)]

use std::path::Path;
use thiserror::Error;

// Buffered random-access file wrapper
pub mod channel;

// Configuration
pub mod config;

// Block-allocated store
pub mod disk;

// One-file-per-group store
pub mod flat;

pub use channel::BufferedChannel;
pub use config::StoreConfig;
pub use disk::DiskStore;
pub use flat::FlatFileStore;

/// Highest archive id.
pub const MAX_ARCHIVE: u8 = 255;

/// Largest group a store accepts, in bytes (`2^24 - 1`).
pub const MAX_GROUP_SIZE: usize = (1 << 24) - 1;

/// Archive holding the catalogs of every other archive.
pub const ARCHIVESET: u8 = 255;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The archive or group does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller passed an argument the store cannot represent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// On-disk structures are inconsistent.
    #[error("Store corrupt: {0}")]
    Corrupt(String),

    /// No block numbers remain in the data file.
    #[error("Store full")]
    Full,

    /// The store has been closed.
    #[error("Store closed")]
    Closed,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent map from `(archive, group)` to a byte blob.
///
/// Groups are written and read whole. `write` replaces any previous contents
/// and creates the archive if needed. Group queries take `&mut self` because
/// lookups go through the same buffered file handles as writes.
pub trait Store {
    /// Check whether the archive exists.
    fn archive_exists(&self, archive: u8) -> Result<bool>;

    /// Check whether the group exists in the archive.
    fn group_exists(&mut self, archive: u8, group: u32) -> Result<bool>;

    /// List existing archives in ascending order.
    fn list_archives(&self) -> Result<Vec<u8>>;

    /// List the groups of an archive in ascending order.
    ///
    /// Fails with [`StoreError::NotFound`] if the archive does not exist.
    fn list_groups(&mut self, archive: u8) -> Result<Vec<u32>>;

    /// Create the archive if it does not exist yet.
    fn create_archive(&mut self, archive: u8) -> Result<()>;

    /// Read a whole group.
    fn read(&mut self, archive: u8, group: u32) -> Result<Vec<u8>>;

    /// Write a whole group, replacing any previous contents.
    ///
    /// Fails with [`StoreError::InvalidArgument`] if `data` is longer than
    /// [`MAX_GROUP_SIZE`].
    fn write(&mut self, archive: u8, group: u32, data: &[u8]) -> Result<()>;

    /// Remove an archive and every group in it.
    fn remove_archive(&mut self, archive: u8) -> Result<()>;

    /// Remove a single group. Removing an absent group is not an error.
    fn remove_group(&mut self, archive: u8, group: u32) -> Result<()>;

    /// Flush buffered writes to disk.
    fn flush(&mut self) -> Result<()>;

    /// Flush and release file handles.
    fn close(&mut self) -> Result<()>;
}

/// Open an existing store, picking the backend from the directory contents.
///
/// A directory containing `main_file_cache.dat2` opens as a [`DiskStore`],
/// anything else as a [`FlatFileStore`].
pub fn open<P: AsRef<Path>>(root: P) -> Result<Box<dyn Store>> {
    let root = root.as_ref();
    if root.join(disk::DATA_FILE_NAME).is_file() {
        Ok(Box::new(DiskStore::open(root)?))
    } else {
        Ok(Box::new(FlatFileStore::open(root)?))
    }
}

pub(crate) fn check_group_size(len: usize) -> Result<()> {
    if len > MAX_GROUP_SIZE {
        return Err(StoreError::InvalidArgument(format!(
            "group is {len} bytes, maximum is {MAX_GROUP_SIZE}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_detects_disk_store() {
        let dir = TempDir::new().expect("temp dir");
        {
            let mut store = DiskStore::create(dir.path()).expect("create");
            store.write(0, 1, b"disk").expect("write");
        }

        let mut store = open(dir.path()).expect("open");
        assert_eq!(store.read(0, 1).expect("read"), b"disk");
        assert!(dir.path().join("main_file_cache.idx0").is_file());
    }

    #[test]
    fn test_open_detects_flat_store() {
        let dir = TempDir::new().expect("temp dir");
        {
            let mut store = FlatFileStore::create(dir.path()).expect("create");
            store.write(3, 7, b"flat").expect("write");
        }

        let mut store = open(dir.path()).expect("open");
        assert_eq!(store.read(3, 7).expect("read"), b"flat");
        assert_eq!(store.list_archives().expect("list"), vec![3]);
    }

    #[test]
    fn test_open_missing_root() {
        let dir = TempDir::new().expect("temp dir");
        let result = open(dir.path().join("missing"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_check_group_size() {
        assert!(check_group_size(MAX_GROUP_SIZE).is_ok());
        assert!(matches!(
            check_group_size(MAX_GROUP_SIZE + 1),
            Err(StoreError::InvalidArgument(_))
        ));
    }
}
