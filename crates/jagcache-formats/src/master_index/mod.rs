//! Cache-wide tables of archive checksums
//!
//! Clients compare these tables against their own copy to find out which
//! archives changed.
//!
//! [`MasterIndex`] describes the archive set: one entry per archive, holding
//! the CRC-32 of the archive's catalog container and the catalog's version.
//!
//! ```text
//! entries     (checksum u32, version u32) * n
//! ```
//!
//! [`ChecksumTable`] is the older form, used before catalogs existed: one
//! CRC-32 per group of archive 0, followed by a checksum over the entries.
//!
//! ```text
//! entries     u32 * n
//! checksum    u32          seed 1234, then (checksum << 1) + entry
//! ```
//!
//! Both tables are indexed by position, so ids missing from the source are
//! filled with zero entries.

mod error;

pub use error::{MasterIndexError, MasterIndexResult};

use crate::CacheFormat;
use crate::container::{split_version_trailer, uncompress};
use crate::index::Index;
use binrw::{BinRead, BinReaderExt, BinWrite, BinWriterExt};
use jagcache_crypto::XteaKey;
use std::io::Cursor;
use tracing::debug;

/// Length of one master index entry
pub const MASTER_INDEX_ENTRY_LEN: usize = 8;

/// Initial value of the checksum table's trailing checksum
pub const CHECKSUM_TABLE_SEED: u32 = 1234;

/// Checksum and version of one archive's catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, BinRead, BinWrite)]
#[brw(big)]
pub struct MasterIndexEntry {
    /// CRC-32 of the catalog container
    pub checksum: u32,
    /// Catalog version
    pub version: u32,
}

/// Per-archive catalog checksums and versions
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MasterIndex {
    /// Entries indexed by archive id
    pub entries: Vec<MasterIndexEntry>,
}

impl MasterIndex {
    /// Build the table from the stored catalogs of the archive set
    ///
    /// `catalogs` yields each archive id with its stored catalog group, in
    /// ascending archive order. A trailing version trailer is not part of
    /// the checksum.
    pub fn create<'a, I>(catalogs: I) -> MasterIndexResult<Self>
    where
        I: IntoIterator<Item = (u8, &'a [u8])>,
    {
        let mut index = Self::default();

        for (archive, group) in catalogs {
            let slot = usize::from(archive);
            if slot < index.entries.len() {
                return Err(MasterIndexError::InvalidArgument(format!(
                    "archive {archive} follows archive {}",
                    index.entries.len() - 1
                )));
            }

            let (container, _) = split_version_trailer(group)?;
            let catalog = Index::read(&uncompress(container, &XteaKey::ZERO)?)?;

            index.entries.resize(slot, MasterIndexEntry::default());
            index.entries.push(MasterIndexEntry {
                checksum: crc32(container),
                version: catalog.version,
            });
        }

        debug!("Built master index with {} entries", index.entries.len());
        Ok(index)
    }

    /// Parse a master index
    pub fn read(data: &[u8]) -> MasterIndexResult<Self> {
        if !data.len().is_multiple_of(MASTER_INDEX_ENTRY_LEN) {
            return Err(MasterIndexError::InvalidLength(data.len()));
        }

        let mut reader = Cursor::new(data);
        let mut entries = Vec::with_capacity(data.len() / MASTER_INDEX_ENTRY_LEN);
        for _ in 0..data.len() / MASTER_INDEX_ENTRY_LEN {
            entries.push(reader.read_be::<MasterIndexEntry>()?);
        }
        Ok(Self { entries })
    }

    /// Serialize the master index
    pub fn write(&self) -> MasterIndexResult<Vec<u8>> {
        let mut writer = Cursor::new(Vec::with_capacity(
            self.entries.len() * MASTER_INDEX_ENTRY_LEN,
        ));
        for entry in &self.entries {
            writer.write_be(entry)?;
        }
        Ok(writer.into_inner())
    }
}

impl CacheFormat for MasterIndex {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(self.write()?)
    }
}

/// Per-group CRC-32s of archive 0, with a trailing checksum
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChecksumTable {
    /// CRC-32s indexed by group id
    pub entries: Vec<u32>,
}

impl ChecksumTable {
    /// Build the table from archive 0's groups, in ascending group order
    pub fn create<'a, I>(groups: I) -> MasterIndexResult<Self>
    where
        I: IntoIterator<Item = (u32, &'a [u8])>,
    {
        let mut table = Self::default();

        for (group, data) in groups {
            let slot = usize::try_from(group).map_err(|_| {
                MasterIndexError::InvalidArgument(format!("group {group} out of range"))
            })?;
            if slot < table.entries.len() {
                return Err(MasterIndexError::InvalidArgument(format!(
                    "group {group} follows group {}",
                    table.entries.len() - 1
                )));
            }

            table.entries.resize(slot, 0);
            table.entries.push(crc32(data));
        }

        Ok(table)
    }

    /// Trailing checksum over the entries
    pub fn checksum(&self) -> u32 {
        self.entries
            .iter()
            .fold(CHECKSUM_TABLE_SEED, |acc, &entry| (acc << 1).wrapping_add(entry))
    }

    /// Parse a checksum table and verify its trailing checksum
    ///
    /// Entries are read while at least two words remain; the next word is
    /// the checksum.
    pub fn read(data: &[u8]) -> MasterIndexResult<Self> {
        let mut reader = Cursor::new(data);
        let mut table = Self::default();

        while data.len() - reader.position() as usize >= 8 {
            table.entries.push(reader.read_be()?);
        }

        let actual = reader.read_be::<u32>()?;
        let expected = table.checksum();
        if actual != expected {
            return Err(MasterIndexError::ChecksumMismatch { expected, actual });
        }

        Ok(table)
    }

    /// Serialize the table with its trailing checksum
    pub fn write(&self) -> MasterIndexResult<Vec<u8>> {
        let mut writer = Cursor::new(Vec::with_capacity((self.entries.len() + 1) * 4));
        for entry in &self.entries {
            writer.write_be(entry)?;
        }
        writer.write_be(&self.checksum())?;
        Ok(writer.into_inner())
    }
}

impl CacheFormat for ChecksumTable {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(self.write()?)
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::container::{CompressionType, append_version_trailer, compress};
    use crate::index::Protocol;
    use crate::test_utils::test_round_trip;
    use pretty_assertions::assert_eq;

    fn catalog(version: u32) -> Vec<u8> {
        let mut index = Index::new(Protocol::Versioned);
        index.version = version;
        index.groups.create_or_get(0).checksum = version;
        compress(&index.write().unwrap(), CompressionType::Gzip, &XteaKey::ZERO).unwrap()
    }

    #[test]
    fn test_crc32() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_master_index_layout() {
        let index = MasterIndex {
            entries: vec![
                MasterIndexEntry { checksum: 0x0102_0304, version: 5 },
                MasterIndexEntry { checksum: 0xFFFF_FFFF, version: 0 },
            ],
        };
        let expected = [1, 2, 3, 4, 0, 0, 0, 5, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];
        assert_eq!(index.write().unwrap(), expected.to_vec());
        assert_eq!(MasterIndex::read(&expected).unwrap(), index);
        test_round_trip(&index).unwrap();
    }

    #[test]
    fn test_master_index_invalid_length() {
        assert_eq!(MasterIndex::read(&[]).unwrap(), MasterIndex::default());
        assert!(matches!(
            MasterIndex::read(&[0; 7]),
            Err(MasterIndexError::InvalidLength(7))
        ));
    }

    #[test]
    fn test_master_index_from_catalogs() {
        let first = catalog(10);
        let mut third = catalog(30);
        let third_container = third.clone();
        append_version_trailer(&mut third, 3);

        let index = MasterIndex::create([(0, first.as_slice()), (2, third.as_slice())]).unwrap();
        assert_eq!(
            index.entries,
            vec![
                MasterIndexEntry { checksum: crc32(&first), version: 10 },
                MasterIndexEntry::default(),
                MasterIndexEntry { checksum: crc32(&third_container), version: 30 },
            ]
        );
    }

    #[test]
    fn test_master_index_rejects_bad_input() {
        let group = catalog(1);
        assert!(matches!(
            MasterIndex::create([(3, group.as_slice()), (3, group.as_slice())]),
            Err(MasterIndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            MasterIndex::create([(0, &[9u8, 0, 0, 0, 0][..])]),
            Err(MasterIndexError::Container(_))
        ));

        let not_a_catalog = compress(&[0xFF], CompressionType::None, &XteaKey::ZERO).unwrap();
        assert!(matches!(
            MasterIndex::create([(0, not_a_catalog.as_slice())]),
            Err(MasterIndexError::Index(_))
        ));
    }

    #[test]
    fn test_checksum_table_layout() {
        let table = ChecksumTable { entries: vec![1, 2] };
        // 1234 * 2 + 1 = 2469, 2469 * 2 + 2 = 4940
        assert_eq!(table.checksum(), 4940);
        let expected = [0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0x13, 0x4C];
        assert_eq!(table.write().unwrap(), expected.to_vec());
        assert_eq!(ChecksumTable::read(&expected).unwrap(), table);
    }

    #[test]
    fn test_checksum_table_empty() {
        let table = ChecksumTable::default();
        assert_eq!(table.write().unwrap(), vec![0, 0, 0x04, 0xD2]);
        assert_eq!(ChecksumTable::read(&[0, 0, 0x04, 0xD2]).unwrap(), table);
        assert!(matches!(ChecksumTable::read(&[0, 0]), Err(MasterIndexError::BinRw(_))));
    }

    #[test]
    fn test_checksum_table_mismatch() {
        let mut bytes = ChecksumTable { entries: vec![7, 8, 9] }.write().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        assert!(matches!(
            ChecksumTable::read(&bytes),
            Err(MasterIndexError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_checksum_table_wraps() {
        let table = ChecksumTable { entries: vec![0xFFFF_FFFF; 40] };
        test_round_trip(&table).unwrap();
    }

    #[test]
    fn test_checksum_table_from_groups() {
        let table = ChecksumTable::create([(1, &b"abc"[..]), (3, &b"123456789"[..])]).unwrap();
        assert_eq!(table.entries, vec![0, 0x3524_41C2, 0, 0xCBF4_3926]);

        assert!(matches!(
            ChecksumTable::create([(2, &b"a"[..]), (1, &b"b"[..])]),
            Err(MasterIndexError::InvalidArgument(_))
        ));
    }
}
