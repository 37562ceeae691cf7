//! Count and id-delta encodings
//!
//! Catalogs before the smart protocol store counts and deltas as unsigned
//! 16-bit values. Smart catalogs use a variable-width form: values up to
//! `0x7FFF` take 2 bytes, larger values take 4 bytes with the top bit set.

use super::Protocol;
use super::error::{IndexError, IndexResult};
use binrw::{BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian};
use std::io::{Read, Seek, Write};

/// Largest value stored in the 2-byte smart form
pub const SMART_SHORT_MAX: u32 = 0x7FFF;

/// Largest value representable by the smart encoding
pub const SMART_MAX: u32 = 0x7FFF_FFFF;

/// Custom binrw parser for a smart value
pub(crate) fn parse_smart<R: Read + Seek>(
    reader: &mut R,
    _endian: Endian,
    _args: (),
) -> BinResult<u32> {
    let first = reader.read_be::<u8>()?;
    if first & 0x80 == 0 {
        let second = reader.read_be::<u8>()?;
        return Ok(u32::from(u16::from_be_bytes([first, second])));
    }

    let rest = reader.read_be::<[u8; 3]>()?;
    Ok(u32::from_be_bytes([first & 0x7F, rest[0], rest[1], rest[2]]))
}

/// Custom binrw writer for a smart value
pub(crate) fn write_smart<W: Write + Seek>(
    value: &u32,
    writer: &mut W,
    _endian: Endian,
    _args: (),
) -> BinResult<()> {
    if *value <= SMART_SHORT_MAX {
        writer.write_be(&(*value as u16))
    } else if *value <= SMART_MAX {
        writer.write_be(&(*value | 0x8000_0000))
    } else {
        Err(binrw::Error::AssertFail {
            pos: writer.stream_position()?,
            message: format!("{value} outside of smart range"),
        })
    }
}

/// A smart-encoded unsigned value
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct Smart(
    #[br(parse_with = parse_smart)]
    #[bw(write_with = write_smart)]
    pub u32,
);

/// How a catalog encodes its counts and id deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CountWidth {
    Short,
    Smart,
}

impl CountWidth {
    pub(crate) fn for_protocol(protocol: Protocol) -> Self {
        if protocol >= Protocol::Smart {
            Self::Smart
        } else {
            Self::Short
        }
    }

    pub(crate) fn max(self) -> u32 {
        match self {
            Self::Short => u32::from(u16::MAX),
            Self::Smart => SMART_MAX,
        }
    }

    pub(crate) fn read<R: Read + Seek>(self, reader: &mut R) -> BinResult<u32> {
        match self {
            Self::Short => Ok(u32::from(reader.read_be::<u16>()?)),
            Self::Smart => Ok(reader.read_be::<Smart>()?.0),
        }
    }

    pub(crate) fn write<W: Write + Seek>(self, writer: &mut W, value: u32) -> IndexResult<()> {
        if value > self.max() {
            return Err(IndexError::InvalidArgument(format!(
                "{value} outside of valid {} range",
                match self {
                    Self::Short => "non-smart",
                    Self::Smart => "smart",
                }
            )));
        }

        match self {
            Self::Short => writer.write_be(&(value as u16))?,
            Self::Smart => writer.write_be(&Smart(value))?,
        }
        Ok(())
    }
}
