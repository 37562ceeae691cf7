//! Per-archive catalog of groups and their files
//!
//! A catalog (the "index" of an archive) lists the archive's groups with
//! their checksums and versions, and the files packed inside each group.
//! It is itself stored as a container in the archive set.
//!
//! The layout is column-oriented: every per-group field is written for all
//! groups before the next field starts.
//!
//! ```text
//! protocol        u8             5 = original, 6 = versioned, 7 = smart
//! version         u32            versioned and smart only
//! flags           u8             names | digests | lengths | uncompressed checksums
//! group count     count
//! group ids       count * n      deltas from the previous id
//! name hashes     i32 * n        if names
//! checksums       u32 * n
//! uncompressed    u32 * n        if uncompressed checksums
//! digests         [u8; 64] * n   if digests
//! lengths         (u32, u32) * n if lengths
//! versions        u32 * n
//! file counts     count * n
//! file ids        count * files  deltas, restarting at 0 for each group
//! file names      i32 * files    if names
//! ```
//!
//! Counts are 2 bytes before the smart protocol and smart-encoded after.
//!
//! # Examples
//!
//! ```
//! use jagcache_formats::index::{Index, Protocol};
//!
//! let mut index = Index::new(Protocol::Versioned);
//! index.version = 42;
//! index.groups.create_or_get(3).checksum = 0x0123_4567;
//!
//! let bytes = index.write().expect("write");
//! let parsed = Index::read(&bytes).expect("read");
//! assert_eq!(parsed, index);
//! ```

mod error;
mod smart;

pub use error::{IndexError, IndexResult};
pub use smart::{SMART_MAX, SMART_SHORT_MAX, Smart};

use crate::CacheFormat;
use crate::collection::{NamedEntryCollection, UNNAMED};
use binrw::{BinReaderExt, BinWriterExt};
use smart::CountWidth;
use std::fmt;
use std::io::{Cursor, Read, Seek, Write};

/// Group name hashes are present
pub const FLAG_NAMES: u8 = 0x01;
/// Group digests are present
pub const FLAG_DIGESTS: u8 = 0x02;
/// Compressed and uncompressed group lengths are present
pub const FLAG_LENGTHS: u8 = 0x04;
/// Uncompressed group checksums are present
pub const FLAG_UNCOMPRESSED_CHECKSUMS: u8 = 0x08;

/// Length of a group digest
pub const DIGEST_LEN: usize = 64;

/// Group content digest
pub type Digest = [u8; DIGEST_LEN];

/// Catalog layout revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Protocol {
    /// No catalog version, 2-byte counts
    Original = 5,
    /// Catalog version, 2-byte counts
    Versioned = 6,
    /// Catalog version, smart counts
    Smart = 7,
}

impl Protocol {
    /// Parse a protocol from its id byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            5 => Some(Self::Original),
            6 => Some(Self::Versioned),
            7 => Some(Self::Smart),
            _ => None,
        }
    }

    /// Get the id byte
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Original => "original",
            Self::Versioned => "versioned",
            Self::Smart => "smart",
        };
        write!(f, "{name} ({})", self.as_byte())
    }
}

/// A file packed inside a group
///
/// Files carry nothing beyond the id and name hash held by their
/// [`Entry`](crate::collection::Entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct File;

/// A group listed in a catalog
///
/// Fields guarded by a catalog flag are only persisted when the flag is set
/// and read back as zero (or `None`) otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Group {
    /// Group version, incremented on every change
    pub version: u32,
    /// CRC-32 of the stored container
    pub checksum: u32,
    /// CRC-32 of the uncompressed payload
    pub uncompressed_checksum: u32,
    /// Stored container length
    pub length: u32,
    /// Uncompressed payload length
    pub uncompressed_length: u32,
    /// Content digest; written as zeroes when absent.
    ///
    /// Always `Some` after reading a catalog with digests, even when the
    /// stored digest is all zeroes.
    pub digest: Option<Digest>,
    /// Files packed in the group
    pub files: NamedEntryCollection<File>,
}

/// A catalog describing one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Layout revision
    pub protocol: Protocol,
    /// Catalog version; only persisted from [`Protocol::Versioned`] on
    pub version: u32,
    /// Whether group and file name hashes are persisted
    pub has_names: bool,
    /// Whether group digests are persisted
    pub has_digests: bool,
    /// Whether group lengths are persisted
    pub has_lengths: bool,
    /// Whether uncompressed group checksums are persisted
    pub has_uncompressed_checksums: bool,
    /// The archive's groups
    pub groups: NamedEntryCollection<Group>,
}

impl Index {
    /// Create an empty catalog
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            version: 0,
            has_names: false,
            has_digests: false,
            has_lengths: false,
            has_uncompressed_checksums: false,
            groups: NamedEntryCollection::new(),
        }
    }

    /// Flag byte for the catalog's optional columns
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.has_names {
            flags |= FLAG_NAMES;
        }
        if self.has_digests {
            flags |= FLAG_DIGESTS;
        }
        if self.has_lengths {
            flags |= FLAG_LENGTHS;
        }
        if self.has_uncompressed_checksums {
            flags |= FLAG_UNCOMPRESSED_CHECKSUMS;
        }
        flags
    }

    /// Set the optional columns from a flag byte
    pub fn set_flags(&mut self, flags: u8) {
        self.has_names = flags & FLAG_NAMES != 0;
        self.has_digests = flags & FLAG_DIGESTS != 0;
        self.has_lengths = flags & FLAG_LENGTHS != 0;
        self.has_uncompressed_checksums = flags & FLAG_UNCOMPRESSED_CHECKSUMS != 0;
    }

    /// Parse a catalog from its serialized form
    pub fn read(data: &[u8]) -> IndexResult<Self> {
        Self::read_from(&mut Cursor::new(data))
    }

    /// Parse a catalog from a reader
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> IndexResult<Self> {
        let number = reader.read_be::<u8>()?;
        let protocol =
            Protocol::from_byte(number).ok_or(IndexError::UnsupportedProtocol(number))?;
        let width = CountWidth::for_protocol(protocol);

        let mut index = Self::new(protocol);
        if protocol >= Protocol::Versioned {
            index.version = reader.read_be()?;
        }
        index.set_flags(reader.read_be()?);

        let size = width.read(reader)?;
        for id in read_ids(reader, width, size)? {
            index.groups.create_or_get(id);
        }

        if index.has_names {
            let ids: Vec<u32> = index.groups.ids().collect();
            for id in ids {
                let name_hash = reader.read_be::<i32>()?;
                if name_hash != UNNAMED {
                    index.groups.set_name_hash(id, Some(name_hash))?;
                }
            }
        }

        for group in &mut index.groups {
            group.checksum = reader.read_be()?;
        }

        if index.has_uncompressed_checksums {
            for group in &mut index.groups {
                group.uncompressed_checksum = reader.read_be()?;
            }
        }

        if index.has_digests {
            for group in &mut index.groups {
                let digest = reader.read_be::<Digest>()?;
                group.digest = Some(digest);
            }
        }

        if index.has_lengths {
            for group in &mut index.groups {
                group.length = reader.read_be()?;
                group.uncompressed_length = reader.read_be()?;
            }
        }

        for group in &mut index.groups {
            group.version = reader.read_be()?;
        }

        let mut file_counts = Vec::new();
        for _ in 0..index.groups.len() {
            file_counts.push(width.read(reader)?);
        }

        for (group, &count) in index.groups.iter_mut().zip(&file_counts) {
            for id in read_ids(reader, width, count)? {
                group.files.create_or_get(id);
            }
        }

        if index.has_names {
            for group in &mut index.groups {
                let ids: Vec<u32> = group.files.ids().collect();
                for id in ids {
                    let name_hash = reader.read_be::<i32>()?;
                    if name_hash != UNNAMED {
                        group.files.set_name_hash(id, Some(name_hash))?;
                    }
                }
            }
        }

        Ok(index)
    }

    /// Serialize the catalog
    pub fn write(&self) -> IndexResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Serialize the catalog to a writer
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> IndexResult<()> {
        let width = CountWidth::for_protocol(self.protocol);

        writer.write_be(&self.protocol.as_byte())?;
        if self.protocol >= Protocol::Versioned {
            writer.write_be(&self.version)?;
        }
        writer.write_be(&self.flags())?;

        width.write(writer, count(self.groups.len())?)?;
        write_ids(writer, width, self.groups.ids())?;

        if self.has_names {
            for group in &self.groups {
                writer.write_be(&group.name_hash().unwrap_or(UNNAMED))?;
            }
        }

        for group in &self.groups {
            writer.write_be(&group.checksum)?;
        }

        if self.has_uncompressed_checksums {
            for group in &self.groups {
                writer.write_be(&group.uncompressed_checksum)?;
            }
        }

        if self.has_digests {
            for group in &self.groups {
                writer.write_be(&group.digest.unwrap_or([0; DIGEST_LEN]))?;
            }
        }

        if self.has_lengths {
            for group in &self.groups {
                writer.write_be(&group.length)?;
                writer.write_be(&group.uncompressed_length)?;
            }
        }

        for group in &self.groups {
            writer.write_be(&group.version)?;
        }

        for group in &self.groups {
            width.write(writer, count(group.files.len())?)?;
        }

        for group in &self.groups {
            write_ids(writer, width, group.files.ids())?;
        }

        if self.has_names {
            for group in &self.groups {
                for file in &group.files {
                    writer.write_be(&file.name_hash().unwrap_or(UNNAMED))?;
                }
            }
        }

        Ok(())
    }
}

impl CacheFormat for Index {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(self.write()?)
    }
}

fn count(len: usize) -> IndexResult<u32> {
    u32::try_from(len).map_err(|_| IndexError::InvalidArgument(format!("{len} entries")))
}

/// Read `size` delta-encoded ids
fn read_ids<R: Read + Seek>(reader: &mut R, width: CountWidth, size: u32) -> IndexResult<Vec<u32>> {
    let mut ids = Vec::new();
    let mut prev = 0u32;

    for i in 0..size {
        let delta = width.read(reader)?;
        let id = prev.checked_add(delta).ok_or_else(|| {
            IndexError::InvalidArgument(format!("id overflows: {prev} + {delta}"))
        })?;
        if i > 0 && delta == 0 {
            return Err(IndexError::DuplicateId(id));
        }
        ids.push(id);
        prev = id;
    }

    Ok(ids)
}

/// Write ascending ids as deltas
fn write_ids<W: Write + Seek>(
    writer: &mut W,
    width: CountWidth,
    ids: impl Iterator<Item = u32>,
) -> IndexResult<()> {
    let mut prev = 0;
    for id in ids {
        width.write(writer, id - prev)?;
        prev = id;
    }
    Ok(())
}
