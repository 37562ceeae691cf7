//! Configuration for the block-allocated store

use serde::{Deserialize, Serialize};

use crate::disk::{BLOCK_SIZE, INDEX_ENTRY_SIZE};

/// Buffer sizes used by [`DiskStore`](crate::DiskStore) for its files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Read buffer size for the data file (in bytes)
    pub data_read_buffer: usize,

    /// Write buffer size for the data file (in bytes)
    pub data_write_buffer: usize,

    /// Read buffer size for each index file (in bytes)
    pub index_read_buffer: usize,

    /// Write buffer size for each index file (in bytes)
    pub index_write_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_read_buffer: BLOCK_SIZE * 10,
            data_write_buffer: BLOCK_SIZE * 10,
            index_read_buffer: INDEX_ENTRY_SIZE * 1000,
            index_write_buffer: INDEX_ENTRY_SIZE * 1000,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with default buffer sizes
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration that performs every read and write directly
    pub const fn unbuffered() -> Self {
        Self {
            data_read_buffer: 0,
            data_write_buffer: 0,
            index_read_buffer: 0,
            index_write_buffer: 0,
        }
    }

    /// Set both data file buffer sizes
    #[must_use]
    pub const fn with_data_buffers(mut self, read: usize, write: usize) -> Self {
        self.data_read_buffer = read;
        self.data_write_buffer = write;
        self
    }

    /// Set both index file buffer sizes
    #[must_use]
    pub const fn with_index_buffers(mut self, read: usize, write: usize) -> Self {
        self.index_read_buffer = read;
        self.index_write_buffer = write;
        self
    }
}
