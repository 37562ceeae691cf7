//! Block-allocated store in the native cache layout
//!
//! Every group lives in a chain of fixed-size blocks inside a single shared
//! data file. Each archive has an index file mapping group ids to the length
//! and first block of their chain. Blocks are never freed: removed or shrunk
//! groups leave unreachable blocks behind, and overwrites reuse the existing
//! chain for as long as it stays valid.

mod block;

pub use block::{
    BLOCK_SIZE, BlockHeader, EXTENDED_HEADER_SIZE, HEADER_SIZE, INDEX_ENTRY_SIZE, IndexEntry,
    MAX_BLOCK,
};

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use crate::channel::BufferedChannel;
use crate::config::StoreConfig;
use crate::{MAX_ARCHIVE, Result, Store, StoreError, check_group_size};

/// Name of the shared data file
pub const DATA_FILE_NAME: &str = "main_file_cache.dat2";

/// Name prefix of the per-archive index files
pub const INDEX_FILE_PREFIX: &str = "main_file_cache.idx";

/// Store backed by `main_file_cache.dat2` and `main_file_cache.idx<n>` files
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    config: StoreConfig,
    data: Option<BufferedChannel>,
    indexes: BTreeMap<u8, BufferedChannel>,
}

impl DiskStore {
    /// Open an existing store rooted at `root`.
    ///
    /// The data file must exist. Every index file present is attached.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_with_config(root, StoreConfig::default())
    }

    /// Open an existing store with custom buffer sizes
    pub fn open_with_config<P: AsRef<Path>>(root: P, config: StoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let data_path = root.join(DATA_FILE_NAME);
        if !data_path.is_file() {
            return Err(StoreError::NotFound(format!(
                "data file {} does not exist",
                data_path.display()
            )));
        }

        let data = Self::open_channel(
            &data_path,
            false,
            config.data_read_buffer,
            config.data_write_buffer,
        )?;

        let mut indexes = BTreeMap::new();
        for archive in 0..=MAX_ARCHIVE {
            let path = index_path(&root, archive);
            if path.is_file() {
                let channel = Self::open_channel(
                    &path,
                    false,
                    config.index_read_buffer,
                    config.index_write_buffer,
                )?;
                indexes.insert(archive, channel);
            }
        }

        info!(
            "Opened disk store at {} with {} archives",
            root.display(),
            indexes.len()
        );

        Ok(Self {
            root,
            config,
            data: Some(data),
            indexes,
        })
    }

    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// An existing data file is kept. No index files are created until an
    /// archive is written.
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::create_with_config(root, StoreConfig::default())
    }

    /// Create a store with custom buffer sizes
    pub fn create_with_config<P: AsRef<Path>>(root: P, config: StoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let data = Self::open_channel(
            &root.join(DATA_FILE_NAME),
            true,
            config.data_read_buffer,
            config.data_write_buffer,
        )?;

        info!("Created disk store at {}", root.display());

        Ok(Self {
            root,
            config,
            data: Some(data),
            indexes: BTreeMap::new(),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Buffer configuration in use
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn open_channel(
        path: &Path,
        create: bool,
        read_buffer: usize,
        write_buffer: usize,
    ) -> Result<BufferedChannel> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(path)?;
        Ok(BufferedChannel::new(file, read_buffer, write_buffer)?)
    }

    fn check_open(&self) -> Result<()> {
        if self.data.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn create_or_get_index(&mut self, archive: u8) -> Result<&mut BufferedChannel> {
        if !self.indexes.contains_key(&archive) {
            let path = index_path(&self.root, archive);
            let channel = Self::open_channel(
                &path,
                true,
                self.config.index_read_buffer,
                self.config.index_write_buffer,
            )?;
            debug!("Created index for archive {}", archive);
            self.indexes.insert(archive, channel);
        }
        self.indexes
            .get_mut(&archive)
            .ok_or_else(|| StoreError::NotFound(format!("archive {archive}")))
    }

    fn get_index(&mut self, archive: u8) -> Result<&mut BufferedChannel> {
        self.check_open()?;
        self.indexes
            .get_mut(&archive)
            .ok_or_else(|| StoreError::NotFound(format!("archive {archive}")))
    }

    fn data_mut(&mut self) -> Result<&mut BufferedChannel> {
        self.data.as_mut().ok_or(StoreError::Closed)
    }

    fn read_block_header(&mut self, block: u32, group: u32) -> Result<Option<BlockHeader>> {
        let data = self.data_mut()?;
        let pos = block_pos(block);
        let len = BlockHeader::size_for(group);
        if pos + len as u64 > data.size() {
            return Ok(None);
        }
        let mut buf = [0u8; EXTENDED_HEADER_SIZE];
        data.read_at(pos, &mut buf[..len])?;
        BlockHeader::from_bytes(&buf[..len], group).map(Some)
    }

    /// Check that `block` holds block `num` of the group.
    ///
    /// Returns the block's next pointer when it does.
    fn validate_block(
        &mut self,
        archive: u8,
        group: u32,
        block: u32,
        num: u16,
    ) -> Result<Option<u32>> {
        if block == 0 {
            return Ok(None);
        }
        let Some(header) = self.read_block_header(block, group)? else {
            warn!(
                "Block {} of group {}/{} is outside the data file, allocating",
                block, archive, group
            );
            return Ok(None);
        };
        if let Some(reason) = header.mismatch(archive, group, num) {
            warn!(
                "Block {} of group {}/{} is not reusable ({}), allocating",
                block, archive, group, reason
            );
            return Ok(None);
        }
        Ok(Some(header.next))
    }

    fn allocate_block(&mut self) -> Result<u32> {
        let size = self.data_mut()?.size();
        let block = size.div_ceil(BLOCK_SIZE as u64).max(1);
        if block > u64::from(MAX_BLOCK) {
            return Err(StoreError::Full);
        }
        trace!("Allocated block {}", block);
        Ok(block as u32)
    }
}

fn index_path(root: &Path, archive: u8) -> PathBuf {
    root.join(format!("{INDEX_FILE_PREFIX}{archive}"))
}

fn block_pos(block: u32) -> u64 {
    u64::from(block) * BLOCK_SIZE as u64
}

fn entry_pos(group: u32) -> u64 {
    u64::from(group) * INDEX_ENTRY_SIZE as u64
}

fn read_index_entry(index: &mut BufferedChannel, group: u32) -> Result<Option<IndexEntry>> {
    let pos = entry_pos(group);
    if pos + INDEX_ENTRY_SIZE as u64 > index.size() {
        return Ok(None);
    }
    let mut buf = [0u8; INDEX_ENTRY_SIZE];
    index.read_at(pos, &mut buf)?;
    Ok(Some(IndexEntry::from_bytes(&buf)?))
}

impl Store for DiskStore {
    fn archive_exists(&self, archive: u8) -> Result<bool> {
        self.check_open()?;
        Ok(self.indexes.contains_key(&archive))
    }

    fn group_exists(&mut self, archive: u8, group: u32) -> Result<bool> {
        self.check_open()?;
        let Some(index) = self.indexes.get_mut(&archive) else {
            return Ok(false);
        };
        Ok(read_index_entry(index, group)?.is_some_and(IndexEntry::is_present))
    }

    fn list_archives(&self) -> Result<Vec<u8>> {
        self.check_open()?;
        Ok(self.indexes.keys().copied().collect())
    }

    fn list_groups(&mut self, archive: u8) -> Result<Vec<u32>> {
        let index = self.get_index(archive)?;
        let entries = index.size() / INDEX_ENTRY_SIZE as u64;
        let mut buf = vec![0u8; (entries as usize) * INDEX_ENTRY_SIZE];
        index.read_at(0, &mut buf)?;

        let mut groups = Vec::new();
        for (group, chunk) in buf.chunks_exact(INDEX_ENTRY_SIZE).enumerate() {
            let mut raw = [0u8; INDEX_ENTRY_SIZE];
            raw.copy_from_slice(chunk);
            if IndexEntry::from_bytes(&raw)?.is_present() {
                groups.push(group as u32);
            }
        }
        Ok(groups)
    }

    fn create_archive(&mut self, archive: u8) -> Result<()> {
        self.check_open()?;
        self.create_or_get_index(archive)?;
        Ok(())
    }

    fn read(&mut self, archive: u8, group: u32) -> Result<Vec<u8>> {
        let index = self.get_index(archive)?;
        let entry = read_index_entry(index, group)?
            .filter(|entry| entry.is_present())
            .ok_or_else(|| StoreError::NotFound(format!("group {archive}/{group}")))?;

        let header_size = BlockHeader::size_for(group);
        let payload = BlockHeader::payload_for(group);
        let data = self.data_mut()?;

        let mut out = vec![0u8; entry.size as usize];
        let mut header_buf = [0u8; EXTENDED_HEADER_SIZE];
        let mut block = entry.block;
        let mut num: u16 = 0;
        let mut offset = 0;

        loop {
            if block == 0 {
                return Err(StoreError::Corrupt("Group shorter than expected".to_string()));
            }

            let pos = block_pos(block);
            if pos + header_size as u64 > data.size() {
                return Err(StoreError::Corrupt(
                    "Next block is outside the data file".to_string(),
                ));
            }

            data.read_at(pos, &mut header_buf[..header_size])?;
            let header = BlockHeader::from_bytes(&header_buf[..header_size], group)?;
            if let Some(reason) = header.mismatch(archive, group, num) {
                return Err(StoreError::Corrupt(reason));
            }

            let len = (out.len() - offset).min(payload);
            let payload_pos = pos + header_size as u64;
            if payload_pos + len as u64 > data.size() {
                return Err(StoreError::Corrupt(
                    "Block data is outside the data file".to_string(),
                ));
            }
            data.read_at(payload_pos, &mut out[offset..offset + len])?;

            offset += len;
            block = header.next;
            num = num.wrapping_add(1);

            if offset >= out.len() {
                break;
            }
        }

        if block != 0 {
            return Err(StoreError::Corrupt("Group longer than expected".to_string()));
        }

        Ok(out)
    }

    fn write(&mut self, archive: u8, group: u32, data: &[u8]) -> Result<()> {
        check_group_size(data.len())?;
        self.check_open()?;

        let index = self.create_or_get_index(archive)?;
        let existing = read_index_entry(index, group)?.map_or(0, |entry| entry.block);

        let (mut block, mut next_existing, mut overwrite) =
            match self.validate_block(archive, group, existing, 0)? {
                Some(next) => (existing, next, true),
                None => (self.allocate_block()?, 0, false),
            };

        let entry = IndexEntry {
            size: data.len() as u32,
            block,
        };
        let entry_bytes = entry.to_bytes()?;
        self.create_or_get_index(archive)?
            .write_at(entry_pos(group), &entry_bytes)?;

        trace!(
            "Writing group {}/{} ({} bytes) from block {}, overwrite={}",
            archive,
            group,
            data.len(),
            block,
            overwrite
        );

        let payload = BlockHeader::payload_for(group);
        let mut out = Vec::with_capacity(BLOCK_SIZE);
        let mut num: u16 = 0;
        let mut offset = 0;

        loop {
            let remaining = data.len() - offset;
            let len = remaining.min(payload);

            let next = if remaining <= payload {
                0
            } else if overwrite {
                match self.validate_block(archive, group, next_existing, num.wrapping_add(1))? {
                    Some(after) => {
                        let reused = next_existing;
                        next_existing = after;
                        reused
                    }
                    None => {
                        overwrite = false;
                        self.allocate_block()?
                    }
                }
            } else {
                let next = block + 1;
                if next > MAX_BLOCK {
                    return Err(StoreError::Full);
                }
                next
            };

            out.clear();
            BlockHeader {
                group,
                num,
                next,
                archive,
            }
            .write_to(&mut out)?;
            out.extend_from_slice(&data[offset..offset + len]);
            self.data_mut()?.write_at(block_pos(block), &out)?;

            offset += len;
            block = next;
            num = num.wrapping_add(1);

            if offset >= data.len() {
                break;
            }
        }

        Ok(())
    }

    fn remove_archive(&mut self, archive: u8) -> Result<()> {
        self.check_open()?;
        if self.indexes.remove(&archive).is_none() {
            return Ok(());
        }
        match fs::remove_file(index_path(&self.root, archive)) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        debug!("Removed index for archive {}", archive);
        Ok(())
    }

    fn remove_group(&mut self, archive: u8, group: u32) -> Result<()> {
        self.check_open()?;
        let Some(index) = self.indexes.get_mut(&archive) else {
            return Ok(());
        };
        let pos = entry_pos(group);
        if pos + INDEX_ENTRY_SIZE as u64 <= index.size() {
            index.write_at(pos, &[0u8; INDEX_ENTRY_SIZE])?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.data_mut()?.flush()?;
        for index in self.indexes.values_mut() {
            index.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.data = None;
        self.indexes.clear();
        debug!("Closed disk store at {}", self.root.display());
        Ok(())
    }
}

impl Drop for DiskStore {
    fn drop(&mut self) {
        if self.data.is_some()
            && let Err(e) = self.flush()
        {
            warn!("Failed to flush disk store at {}: {}", self.root.display(), e);
        }
    }
}
