//! Per-type compression codecs
//!
//! BZIP2 streams are stored without their `BZh1` file header and are always
//! produced at block size 1 (100k). LZMA streams carry the 5-byte properties
//! header but not the unpacked size, which the container supplies instead.

use super::error::{ContainerError, ContainerResult};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use lzma_rs::{compress, decompress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};

/// BZIP2 file header stripped from stored streams
pub(crate) const BZIP2_HEADER: &[u8; 4] = b"BZh1";

/// Upper bound on buffer space reserved up front from a declared length
///
/// Declared lengths come from untrusted (or wrongly decrypted) data, so
/// larger outputs grow on demand instead.
const MAX_PREALLOCATION: usize = 16 * 1024 * 1024;

/// Compression type tag stored in the first byte of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    /// Stored as-is
    None = 0,
    /// Headerless BZIP2
    Bzip2 = 1,
    /// GZIP with a standard header
    Gzip = 2,
    /// LZMA with properties header, without unpacked size
    Lzma = 3,
}

impl CompressionType {
    /// All compression types in tag order
    pub const ALL: [Self; 4] = [Self::None, Self::Bzip2, Self::Gzip, Self::Lzma];

    /// Parse a compression type from its tag byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::None),
            1 => Some(Self::Bzip2),
            2 => Some(Self::Gzip),
            3 => Some(Self::Lzma),
            _ => None,
        }
    }

    /// Get the tag byte
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether the payload goes through a compressor
    pub fn is_compressed(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Bzip2 => "bzip2",
            Self::Gzip => "gzip",
            Self::Lzma => "lzma",
        };
        f.write_str(name)
    }
}

/// Compress a payload with the given codec
pub(crate) fn compress_payload(data: &[u8], ty: CompressionType) -> ContainerResult<Vec<u8>> {
    match ty {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Bzip2 => {
            let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::new(1));
            encoder.write_all(data).map_err(|e| {
                ContainerError::Compression(format!("BZIP2 compression failed: {e}"))
            })?;
            let mut compressed = encoder.finish().map_err(|e| {
                ContainerError::Compression(format!("BZIP2 compression failed: {e}"))
            })?;

            if !compressed.starts_with(BZIP2_HEADER) {
                return Err(ContainerError::Compression(
                    "BZIP2 encoder produced an unexpected header".to_string(),
                ));
            }
            compressed.drain(..BZIP2_HEADER.len());
            Ok(compressed)
        }
        CompressionType::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(data).map_err(|e| {
                ContainerError::Compression(format!("GZIP compression failed: {e}"))
            })?;
            encoder
                .finish()
                .map_err(|e| ContainerError::Compression(format!("GZIP compression failed: {e}")))
        }
        CompressionType::Lzma => {
            let options = compress::Options {
                unpacked_size: compress::UnpackedSize::SkipWritingToHeader,
            };
            let mut compressed = Vec::new();
            lzma_rs::lzma_compress_with_options(&mut &data[..], &mut compressed, &options)
                .map_err(|e| {
                    ContainerError::Compression(format!("LZMA compression failed: {e}"))
                })?;
            Ok(compressed)
        }
    }
}

/// Decompress a payload, requiring exactly `expected` bytes of output
pub(crate) fn decompress_payload(
    compressed: &[u8],
    ty: CompressionType,
    expected: usize,
) -> ContainerResult<Vec<u8>> {
    match ty {
        CompressionType::None => read_exact_len(compressed, expected),
        CompressionType::Bzip2 => {
            let stream = (&BZIP2_HEADER[..]).chain(compressed);
            read_exact_len(BzDecoder::new(stream), expected)
        }
        CompressionType::Gzip => read_exact_len(GzDecoder::new(compressed), expected),
        CompressionType::Lzma => {
            let options = decompress::Options {
                unpacked_size: decompress::UnpackedSize::UseProvided(Some(expected as u64)),
                memlimit: None,
                allow_incomplete: false,
            };

            let mut output = Vec::with_capacity(expected.min(MAX_PREALLOCATION));
            match lzma_rs::lzma_decompress_with_options(&mut &compressed[..], &mut output, &options)
            {
                Ok(()) => {}
                Err(lzma_rs::error::Error::IoError(e))
                    if e.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    return Err(ContainerError::UnexpectedEndOfData {
                        expected,
                        actual: output.len(),
                    });
                }
                Err(e) => {
                    return Err(ContainerError::Compression(format!(
                        "LZMA decompression failed: {e}"
                    )));
                }
            }

            if output.len() != expected {
                return Err(ContainerError::UnexpectedEndOfData {
                    expected,
                    actual: output.len(),
                });
            }
            Ok(output)
        }
    }
}

/// Read exactly `expected` bytes and require the stream to end there
fn read_exact_len<R: Read>(reader: R, expected: usize) -> ContainerResult<Vec<u8>> {
    let mut output = Vec::with_capacity(expected.min(MAX_PREALLOCATION));
    let mut limited = reader.take(expected as u64);

    if let Err(e) = limited.read_to_end(&mut output) {
        return Err(map_read_error(&e, expected, output.len()));
    }

    if output.len() < expected {
        return Err(ContainerError::UnexpectedEndOfData {
            expected,
            actual: output.len(),
        });
    }

    let mut reader = limited.into_inner();
    let mut extra = [0u8; 1];
    match reader.read(&mut extra) {
        Ok(0) => Ok(output),
        Ok(_) => Err(ContainerError::InvalidFormat(
            "uncompressed data overflow".to_string(),
        )),
        Err(e) => Err(map_read_error(&e, expected, output.len())),
    }
}

fn map_read_error(error: &io::Error, expected: usize, actual: usize) -> ContainerError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        ContainerError::UnexpectedEndOfData { expected, actual }
    } else {
        ContainerError::Compression(format!("decompression failed: {error}"))
    }
}
