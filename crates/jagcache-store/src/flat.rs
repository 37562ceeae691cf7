//! One-file-per-group store
//!
//! Archive `a` is the directory `<root>/a` and group `g` is the file
//! `<root>/a/g.dat`. The layout diffs well under version control, at the cost
//! of one file per group.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{MAX_GROUP_SIZE, Result, Store, StoreError, check_group_size};

const GROUP_EXTENSION: &str = "dat";

/// Store keeping every group in its own file
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    root: PathBuf,
}

impl FlatFileStore {
    /// Open an existing store. The root directory must exist.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(StoreError::NotFound(format!(
                "store root {} does not exist",
                root.display()
            )));
        }
        info!("Opened flat file store at {}", root.display());
        Ok(Self { root })
    }

    /// Create a store, creating the root directory if needed
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("Created flat file store at {}", root.display());
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn archive_path(&self, archive: u8) -> PathBuf {
        self.root.join(archive.to_string())
    }

    fn group_path(&self, archive: u8, group: u32) -> PathBuf {
        self.archive_path(archive)
            .join(format!("{group}.{GROUP_EXTENSION}"))
    }

    /// Write a file atomically using a temp file
    fn write_file(path: &Path, data: &[u8]) -> Result<()> {
        let temp_path = path.with_extension("tmp");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(data)?;
            file.flush()?;
            // The rename must not reach the disk before the data does.
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        Ok(())
    }
}

/// Parse a canonical decimal id: digits only, no sign, no leading zeros.
fn parse_canonical<T: std::str::FromStr + ToString>(name: &str) -> Option<T> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = name.parse::<T>().ok()?;
    (value.to_string() == name).then_some(value)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

impl Store for FlatFileStore {
    fn archive_exists(&self, archive: u8) -> Result<bool> {
        Ok(self.archive_path(archive).is_dir())
    }

    fn group_exists(&mut self, archive: u8, group: u32) -> Result<bool> {
        Ok(self.group_path(archive, group).is_file())
    }

    fn list_archives(&self) -> Result<Vec<u8>> {
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(archive) = entry.file_name().to_str().and_then(parse_canonical::<u8>) {
                archives.push(archive);
            }
        }
        archives.sort_unstable();
        Ok(archives)
    }

    fn list_groups(&mut self, archive: u8) -> Result<Vec<u32>> {
        let path = self.archive_path(archive);
        if !path.is_dir() {
            return Err(StoreError::NotFound(format!("archive {archive}")));
        }

        let mut groups = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let group = name
                .to_str()
                .and_then(|name| name.strip_suffix(GROUP_EXTENSION))
                .and_then(|name| name.strip_suffix('.'))
                .and_then(parse_canonical::<u32>);
            if let Some(group) = group {
                groups.push(group);
            }
        }
        groups.sort_unstable();
        Ok(groups)
    }

    fn create_archive(&mut self, archive: u8) -> Result<()> {
        fs::create_dir_all(self.archive_path(archive))?;
        Ok(())
    }

    fn read(&mut self, archive: u8, group: u32) -> Result<Vec<u8>> {
        let path = self.group_path(archive, group);
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("group {archive}/{group}")));
        }

        let size = fs::metadata(&path)?.len();
        if size > MAX_GROUP_SIZE as u64 {
            return Err(StoreError::Corrupt("Group too large".to_string()));
        }

        Ok(fs::read(&path)?)
    }

    fn write(&mut self, archive: u8, group: u32, data: &[u8]) -> Result<()> {
        check_group_size(data.len())?;
        Self::write_file(&self.group_path(archive, group), data)
    }

    fn remove_archive(&mut self, archive: u8) -> Result<()> {
        let path = self.archive_path(archive);
        if !path.is_dir() {
            return Ok(());
        }

        for group in self.list_groups(archive)? {
            remove_if_exists(&self.group_path(archive, group))?;
        }

        // Fails if anything other than group files remains.
        match fs::remove_dir(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        debug!("Removed archive {} from {}", archive, self.root.display());
        Ok(())
    }

    fn remove_group(&mut self, archive: u8, group: u32) -> Result<()> {
        remove_if_exists(&self.group_path(archive, group))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
