//! Compression and encryption envelope for group payloads
//!
//! Every group (and every catalog) is stored wrapped in a container:
//!
//! ```text
//! +------+----------+--------------------+------------------+
//! | type | len (BE) | uncompressed (BE)  | payload          |
//! | u8   | u32      | u32, if compressed | len bytes        |
//! +------+----------+--------------------+------------------+
//! ```
//!
//! When an XTEA key is supplied, everything after the `len` field is
//! encrypted in place (whole 8-byte blocks only). The `len` field itself is
//! never encrypted, so a container's extent can be found without the key.
//!
//! Groups stored on disk may be followed by a 2-byte version trailer, which
//! sits outside the container; see [`split_version_trailer`].
//!
//! # Examples
//!
//! ```
//! use jagcache_crypto::XteaKey;
//! use jagcache_formats::container::{self, CompressionType};
//!
//! let key = XteaKey::new(1, 2, 3, 4);
//! let packed = container::compress(b"hello world", CompressionType::Gzip, &key)
//!     .expect("compress");
//! let unpacked = container::uncompress(&packed, &key).expect("uncompress");
//! assert_eq!(unpacked, b"hello world");
//! ```

mod compression;
mod error;
mod key_check;

pub use compression::CompressionType;
pub use error::{ContainerError, ContainerResult};
pub use key_check::{is_key_valid, uncompress_if_key_valid, uncompress_unless_encrypted};

use jagcache_crypto::XteaKey;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Length of the type tag plus the `len` field
pub const HEADER_LEN: usize = 5;

/// Length of the uncompressed-length field present in compressed containers
pub const UNCOMPRESSED_LEN_FIELD: usize = 4;

/// Length of the optional version trailer following a container
pub const VERSION_TRAILER_LEN: usize = 2;

/// Policy for [`compress_best`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    /// Consider LZMA. Older clients cannot decode it.
    pub enable_lzma: bool,
    /// Consider the uncompressed type even when a key is given
    ///
    /// Some clients decrypt the version trailer along with the container,
    /// corrupting the last block of encrypted uncompressed groups. Leave
    /// this off for those clients.
    pub enable_uncompressed_encryption: bool,
}

impl CompressionOptions {
    /// Create options with everything disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable LZMA
    pub fn with_lzma(mut self, enable: bool) -> Self {
        self.enable_lzma = enable;
        self
    }

    /// Enable or disable encrypted uncompressed containers
    pub fn with_uncompressed_encryption(mut self, enable: bool) -> Self {
        self.enable_uncompressed_encryption = enable;
        self
    }

    /// Compression types tried by [`compress_best`], in order
    pub fn candidates(&self, key: &XteaKey) -> Vec<CompressionType> {
        let mut types = Vec::with_capacity(CompressionType::ALL.len());
        if key.is_zero() || self.enable_uncompressed_encryption {
            types.push(CompressionType::None);
        }
        types.push(CompressionType::Bzip2);
        types.push(CompressionType::Gzip);
        if self.enable_lzma {
            types.push(CompressionType::Lzma);
        }
        types
    }
}

/// Parsed unencrypted part of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Compression type tag
    pub compression: CompressionType,
    /// Length of the (possibly compressed) payload
    pub len: usize,
}

impl ContainerHeader {
    /// Parse the type tag and length field
    pub fn parse(container: &[u8]) -> ContainerResult<Self> {
        if container.len() < HEADER_LEN {
            return Err(ContainerError::InvalidFormat("missing header".to_string()));
        }

        let compression = CompressionType::from_byte(container[0]).ok_or_else(|| {
            ContainerError::InvalidFormat(format!("invalid compression type: {}", container[0]))
        })?;

        let len = i32::from_be_bytes([container[1], container[2], container[3], container[4]]);
        let len = usize::try_from(len)
            .map_err(|_| ContainerError::InvalidFormat(format!("length is negative: {len}")))?;

        Ok(Self { compression, len })
    }

    /// Bytes following the header that belong to this container
    ///
    /// This covers the uncompressed-length field for compressed types, which
    /// is also the span covered by encryption.
    pub fn body_len(&self) -> usize {
        if self.compression.is_compressed() {
            self.len + UNCOMPRESSED_LEN_FIELD
        } else {
            self.len
        }
    }

    /// Total container length including the header
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.body_len()
    }

    /// Slice of `container` holding the body, or an error if truncated
    pub(crate) fn body<'a>(&self, container: &'a [u8]) -> ContainerResult<&'a [u8]> {
        let available = container.len() - HEADER_LEN;
        let expected = self.body_len();
        if available < expected {
            let what = if self.compression.is_compressed() {
                "compressed data"
            } else {
                "data"
            };
            return Err(ContainerError::InvalidFormat(format!(
                "{what} truncated ({available} bytes, expecting {expected})"
            )));
        }
        Ok(&container[HEADER_LEN..HEADER_LEN + expected])
    }
}

/// Wrap `data` in a container of the given type, encrypting with `key`
/// unless it is [`XteaKey::ZERO`]
pub fn compress(data: &[u8], ty: CompressionType, key: &XteaKey) -> ContainerResult<Vec<u8>> {
    let uncompressed_len = i32::try_from(data.len()).map_err(|_| {
        ContainerError::InvalidFormat(format!("payload too large: {} bytes", data.len()))
    })?;

    let payload = compression::compress_payload(data, ty)?;
    let len = i32::try_from(payload.len()).map_err(|_| {
        ContainerError::InvalidFormat(format!("payload too large: {} bytes", payload.len()))
    })?;

    let mut output = Vec::with_capacity(HEADER_LEN + UNCOMPRESSED_LEN_FIELD + payload.len());
    output.push(ty.as_byte());
    output.extend_from_slice(&len.to_be_bytes());
    if ty.is_compressed() {
        output.extend_from_slice(&uncompressed_len.to_be_bytes());
    }
    output.extend_from_slice(&payload);

    if !key.is_zero() {
        key.encrypt(&mut output[HEADER_LEN..]);
    }

    Ok(output)
}

/// Compress `data` with every candidate type and keep the shortest result
///
/// Candidates come from [`CompressionOptions::candidates`]; a later candidate
/// only wins when strictly shorter, so ties favour the earlier type.
pub fn compress_best(
    data: &[u8],
    options: &CompressionOptions,
    key: &XteaKey,
) -> ContainerResult<Vec<u8>> {
    let mut best: Option<Vec<u8>> = None;

    for ty in options.candidates(key) {
        let output = compress(data, ty, key)?;
        trace!("{} container for {} bytes: {} bytes", ty, data.len(), output.len());

        if best.as_ref().is_none_or(|b| output.len() < b.len()) {
            best = Some(output);
        }
    }

    best.ok_or_else(|| ContainerError::Compression("no compression type enabled".to_string()))
}

/// Unwrap a container, decrypting with `key` unless it is [`XteaKey::ZERO`]
pub fn uncompress(container: &[u8], key: &XteaKey) -> ContainerResult<Vec<u8>> {
    let header = ContainerHeader::parse(container)?;
    let body = header.body(container)?;

    let mut plaintext = body.to_vec();
    if !key.is_zero() {
        key.decrypt(&mut plaintext);
    }

    if !header.compression.is_compressed() {
        return Ok(plaintext);
    }

    let uncompressed_len = read_uncompressed_len(&plaintext).ok_or_else(|| {
        ContainerError::InvalidFormat("uncompressed length is negative".to_string())
    })?;

    compression::decompress_payload(
        &plaintext[UNCOMPRESSED_LEN_FIELD..],
        header.compression,
        uncompressed_len,
    )
}

/// Split a stored group into its container and optional version trailer
pub fn split_version_trailer(group: &[u8]) -> ContainerResult<(&[u8], Option<u16>)> {
    let header = ContainerHeader::parse(group)?;
    header.body(group)?;

    let (container, trailer) = group.split_at(header.total_len());
    match trailer {
        [] => Ok((container, None)),
        [hi, lo] => Ok((container, Some(u16::from_be_bytes([*hi, *lo])))),
        _ => Err(ContainerError::InvalidFormat(format!(
            "unexpected {} bytes after container",
            trailer.len()
        ))),
    }
}

/// Append a version trailer to a container
pub fn append_version_trailer(container: &mut Vec<u8>, version: u16) {
    container.extend_from_slice(&version.to_be_bytes());
}

/// Read the big-endian uncompressed length at the start of a decrypted body
fn read_uncompressed_len(plaintext: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = plaintext.get(..UNCOMPRESSED_LEN_FIELD)?.try_into().ok()?;
    usize::try_from(i32::from_be_bytes(bytes)).ok()
}
