//! On-disk records of the block-allocated store
//!
//! Index entry (6 bytes, at `group * 6` in `main_file_cache.idx<archive>`):
//!
//! ```text
//! size:  u24 BE   group length in bytes
//! block: u24 BE   first block number, 0 if absent
//! ```
//!
//! Block header (at `block * 520` in `main_file_cache.dat2`), whose width
//! depends on the group it belongs to:
//!
//! ```text
//! group:   u16 BE (u32 BE if group > 0xFFFF)
//! num:     u16 BE   position of the block within the group's chain
//! next:    u24 BE   next block number, 0 at the end of the chain
//! archive: u8
//! ```

use binrw::{BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian};
use std::io::{Cursor, Read, Seek, Write};

use crate::{Result, StoreError};

/// Size of an index entry
pub const INDEX_ENTRY_SIZE: usize = 6;

/// Size of a block, header included
pub const BLOCK_SIZE: usize = 520;

/// Header size for groups up to `0xFFFF`
pub const HEADER_SIZE: usize = 8;

/// Header size for groups above `0xFFFF`
pub const EXTENDED_HEADER_SIZE: usize = 10;

/// Largest block number a 24-bit pointer can address
pub const MAX_BLOCK: u32 = (1 << 24) - 1;

/// Custom binrw parser for 24-bit big-endian integers
pub(crate) fn parse_u24<R: Read + Seek>(
    reader: &mut R,
    _endian: Endian,
    _args: (),
) -> BinResult<u32> {
    let bytes = reader.read_be::<[u8; 3]>()?;
    Ok(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
}

/// Custom binrw writer for 24-bit big-endian integers
pub(crate) fn write_u24<W: Write + Seek>(
    value: &u32,
    writer: &mut W,
    _endian: Endian,
    _args: (),
) -> BinResult<()> {
    let bytes = value.to_be_bytes();
    writer.write_be(&[bytes[1], bytes[2], bytes[3]])
}

/// Custom binrw parser for the block header's group field
fn parse_group<R: Read + Seek>(reader: &mut R, _endian: Endian, extended: bool) -> BinResult<u32> {
    if extended {
        reader.read_be::<u32>()
    } else {
        reader.read_be::<u16>().map(u32::from)
    }
}

/// Custom binrw writer for the block header's group field
fn write_group<W: Write + Seek>(
    value: &u32,
    writer: &mut W,
    _endian: Endian,
    extended: bool,
) -> BinResult<()> {
    if extended {
        return writer.write_be(value);
    }
    match u16::try_from(*value) {
        Ok(short) => writer.write_be(&short),
        Err(_) => Err(binrw::Error::AssertFail {
            pos: writer.stream_position()?,
            message: format!("group {value} needs an extended header"),
        }),
    }
}

/// Location and length of a group's block chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[brw(big)]
pub struct IndexEntry {
    /// Group length in bytes
    #[br(parse_with = parse_u24)]
    #[bw(write_with = write_u24)]
    pub size: u32,

    /// First block of the chain, 0 if the group is absent
    #[br(parse_with = parse_u24)]
    #[bw(write_with = write_u24)]
    pub block: u32,
}

impl IndexEntry {
    /// Parse an entry from its 6-byte form
    pub fn from_bytes(data: &[u8; INDEX_ENTRY_SIZE]) -> Result<Self> {
        Self::read(&mut Cursor::new(&data[..]))
            .map_err(|e| StoreError::Corrupt(format!("index entry: {e}")))
    }

    /// Serialize the entry to 6 bytes
    pub fn to_bytes(self) -> Result<[u8; INDEX_ENTRY_SIZE]> {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        self.write(&mut Cursor::new(&mut buf[..]))
            .map_err(|e| StoreError::InvalidArgument(format!("index entry: {e}")))?;
        Ok(buf)
    }

    /// Whether the entry points at a block chain
    pub const fn is_present(self) -> bool {
        self.block != 0
    }
}

/// Header preceding the payload of every block
///
/// Read and written with the header width as argument; see
/// [`BlockHeader::is_extended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big, import(extended: bool))]
pub struct BlockHeader {
    /// Owning group
    #[br(parse_with = parse_group, args_raw = extended)]
    #[bw(write_with = write_group, args_raw = extended)]
    pub group: u32,

    /// Sequence number within the chain
    pub num: u16,

    /// Next block, 0 at the end of the chain
    #[br(parse_with = parse_u24)]
    #[bw(write_with = write_u24)]
    pub next: u32,

    /// Owning archive
    pub archive: u8,
}

impl BlockHeader {
    /// Whether blocks of `group` use the 4-byte group field
    pub const fn is_extended(group: u32) -> bool {
        group > 0xFFFF
    }

    /// Header size for blocks of `group`
    pub const fn size_for(group: u32) -> usize {
        if Self::is_extended(group) {
            EXTENDED_HEADER_SIZE
        } else {
            HEADER_SIZE
        }
    }

    /// Payload bytes per block for `group`
    pub const fn payload_for(group: u32) -> usize {
        BLOCK_SIZE - Self::size_for(group)
    }

    /// Parse a header in the layout used for `group`
    pub fn from_bytes(data: &[u8], group: u32) -> Result<Self> {
        Self::read_args(&mut Cursor::new(data), (Self::is_extended(group),))
            .map_err(|e| StoreError::Corrupt(format!("block header: {e}")))
    }

    /// Append the header to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut writer = Cursor::new(out);
        writer.set_position(writer.get_ref().len() as u64);
        self.write_args(&mut writer, (Self::is_extended(self.group),))
            .map_err(|e| StoreError::InvalidArgument(format!("block header: {e}")))
    }

    /// Compare against the expected owner and position.
    ///
    /// Returns a description of the first mismatch.
    pub fn mismatch(&self, archive: u8, group: u32, num: u16) -> Option<String> {
        if self.group != group {
            Some(format!("Expecting group {group}, was {}", self.group))
        } else if self.num != num {
            Some(format!("Expecting block number {num}, was {}", self.num))
        } else if self.archive != archive {
            Some(format!("Expecting archive {archive}, was {}", self.archive))
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_index_entry_layout() {
        let entry = IndexEntry {
            size: 0x01_02_03,
            block: 0xAB_CD_EF,
        };
        let bytes = entry.to_bytes().expect("encode");
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0xAB, 0xCD, 0xEF]);
        assert_eq!(IndexEntry::from_bytes(&bytes).expect("decode"), entry);
        assert!(entry.is_present());
        assert!(!IndexEntry::default().is_present());
    }

    #[test]
    fn test_standard_header_layout() {
        let header = BlockHeader {
            group: 0xFFFF,
            num: 2,
            next: 0x12_34_56,
            archive: 7,
        };
        let mut out = Vec::new();
        header.write_to(&mut out).expect("encode");
        assert_eq!(out, [0xFF, 0xFF, 0x00, 0x02, 0x12, 0x34, 0x56, 0x07]);
        assert_eq!(BlockHeader::from_bytes(&out, 0xFFFF).expect("decode"), header);
        assert_eq!(BlockHeader::payload_for(0xFFFF), 512);
    }

    #[test]
    fn test_extended_header_layout() {
        let header = BlockHeader {
            group: 0x1_0000,
            num: 0,
            next: 1,
            archive: 255,
        };
        let mut out = Vec::new();
        header.write_to(&mut out).expect("encode");
        assert_eq!(
            out,
            [0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xFF]
        );
        assert_eq!(BlockHeader::from_bytes(&out, 0x1_0000).expect("decode"), header);
        assert_eq!(BlockHeader::payload_for(0x1_0000), 510);
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            BlockHeader::from_bytes(&[0; 7], 1),
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            BlockHeader::from_bytes(&[0; 9], 0x1_0000),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_header_appends_after_existing_bytes() {
        let mut out = vec![0xEE];
        let header = BlockHeader {
            group: 3,
            num: 1,
            next: 0,
            archive: 2,
        };
        header.write_to(&mut out).expect("encode");
        assert_eq!(out, [0xEE, 0x00, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_width_follows_expected_group() {
        // an extended header read as a standard one sees the high group bits
        let header = BlockHeader {
            group: 0x2_0001,
            num: 5,
            next: 9,
            archive: 1,
        };
        let mut out = Vec::new();
        header.write_to(&mut out).expect("encode");
        assert_eq!(out.len(), EXTENDED_HEADER_SIZE);

        let misread = BlockHeader::from_bytes(&out, 1).expect("decode");
        assert_eq!(misread.group, 2);
        assert!(misread.mismatch(1, 1, 5).is_some());
    }

    #[test]
    fn test_standard_header_rejects_wide_group() {
        let header = BlockHeader {
            group: 0x1_0000,
            num: 0,
            next: 0,
            archive: 0,
        };
        let mut out = Vec::<u8>::new();
        assert!(
            header
                .write_args(&mut Cursor::new(&mut out), (false,))
                .is_err()
        );
    }

    #[test]
    fn test_mismatch_order() {
        let header = BlockHeader {
            group: 1,
            num: 1,
            next: 0,
            archive: 1,
        };
        assert_eq!(header.mismatch(1, 1, 1), None);
        assert_eq!(
            header.mismatch(2, 2, 2).as_deref(),
            Some("Expecting group 2, was 1")
        );
        assert_eq!(
            header.mismatch(2, 1, 2).as_deref(),
            Some("Expecting block number 2, was 1")
        );
        assert_eq!(
            header.mismatch(2, 1, 1).as_deref(),
            Some("Expecting archive 2, was 1")
        );
    }
}
