//! Cheap key-validity check
//!
//! Used when searching a key set for the one that opens a container. The
//! first two cipher blocks are decrypted and checked for a plausible
//! uncompressed length and the codec's stream signature; only containers
//! passing that filter are fully decompressed. A wrong key can still slip
//! through the header checks (LZMA has no magic number), which is why the
//! full decompression must also succeed with exactly the declared length.
//!
//! Uncompressed containers carry no signature to check, so they are assumed
//! to be unencrypted: checking one with a non-zero key reports it invalid.

use super::compression::{self, CompressionType};
use super::error::{ContainerError, ContainerResult};
use super::{ContainerHeader, UNCOMPRESSED_LEN_FIELD, read_uncompressed_len};
use jagcache_crypto::XteaKey;
use tracing::trace;

/// BZIP2 block magic (the digits of pi)
const BZIP2_BLOCK_MAGIC: [u8; 6] = [0x31, 0x41, 0x59, 0x26, 0x53, 0x59];

/// BZIP2 end-of-stream magic (the square root of pi), first in an empty stream
const BZIP2_EOS_MAGIC: [u8; 6] = [0x17, 0x72, 0x45, 0x38, 0x50, 0x90];

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const GZIP_METHOD_DEFLATE: u8 = 0x08;

const LZMA_PB_MAX: u8 = 4;

/// Largest LZMA dictionary accepted (the size used by the highest preset)
const LZMA_DICT_SIZE_MAX: u32 = 1 << 26;

/// Bytes decrypted by the header check: at most two XTEA blocks
const CHECK_LEN: usize = 16;

/// Smallest stream of any codec: an empty BZIP2 stream (end-of-stream magic
/// and CRC)
const MIN_STREAM_LEN: usize = 10;

/// Uncompress `container` if `key` decrypts it, or return `None`
///
/// Structural problems in the unencrypted part of the container (missing
/// header, unknown type, negative or truncated length) are errors no matter
/// which key is tried.
pub fn uncompress_if_key_valid(
    container: &[u8],
    key: &XteaKey,
) -> ContainerResult<Option<Vec<u8>>> {
    let header = ContainerHeader::parse(container)?;
    let body = header.body(container)?;

    if !header.compression.is_compressed() {
        if !key.is_zero() {
            return Ok(None);
        }
        return Ok(Some(body.to_vec()));
    }

    if body.len() < UNCOMPRESSED_LEN_FIELD + MIN_STREAM_LEN {
        return Err(ContainerError::InvalidFormat(format!(
            "compressed data shorter than any stream ({} bytes)",
            body.len()
        )));
    }

    // Only whole blocks are encrypted, so a short body keeps its plain tail.
    let len = body.len().min(CHECK_LEN);
    let mut head = [0u8; CHECK_LEN];
    head[..len].copy_from_slice(&body[..len]);
    if !key.is_zero() {
        key.decrypt(&mut head[..len]);
    }

    if !header_plausible(header.compression, &head[..len]) {
        trace!("key {} rejected by {} header check", key, header.compression);
        return Ok(None);
    }

    let mut plaintext = body.to_vec();
    if !key.is_zero() {
        key.decrypt(&mut plaintext);
    }

    let Some(uncompressed_len) = read_uncompressed_len(&plaintext) else {
        return Ok(None);
    };

    match compression::decompress_payload(
        &plaintext[UNCOMPRESSED_LEN_FIELD..],
        header.compression,
        uncompressed_len,
    ) {
        Ok(data) => Ok(Some(data)),
        Err(e) => {
            trace!("key {} rejected by decompression: {}", key, e);
            Ok(None)
        }
    }
}

/// Whether `key` decrypts `container` to a well-formed payload
pub fn is_key_valid(container: &[u8], key: &XteaKey) -> ContainerResult<bool> {
    Ok(uncompress_if_key_valid(container, key)?.is_some())
}

/// Uncompress `container` if it is not encrypted, or return `None`
pub fn uncompress_unless_encrypted(container: &[u8]) -> ContainerResult<Option<Vec<u8>>> {
    uncompress_if_key_valid(container, &XteaKey::ZERO)
}

/// Check the decrypted uncompressed length and codec signature
fn header_plausible(ty: CompressionType, head: &[u8]) -> bool {
    if read_uncompressed_len(head).is_none() {
        return false;
    }

    let stream = &head[UNCOMPRESSED_LEN_FIELD..];
    match ty {
        CompressionType::None => true,
        CompressionType::Bzip2 => {
            stream.starts_with(&BZIP2_BLOCK_MAGIC) || stream.starts_with(&BZIP2_EOS_MAGIC)
        }
        CompressionType::Gzip => {
            stream.starts_with(&GZIP_MAGIC) && stream.get(2) == Some(&GZIP_METHOD_DEFLATE)
        }
        CompressionType::Lzma => match stream {
            [props, d0, d1, d2, d3, ..] => {
                // lc and lp cannot be out of range given how the byte is packed
                let pb = props / 45;
                let dict_size = u32::from_le_bytes([*d0, *d1, *d2, *d3]);
                pb <= LZMA_PB_MAX && dict_size <= LZMA_DICT_SIZE_MAX
            }
            _ => false,
        },
    }
}
