//! XTEA block cipher used to protect container payloads
//!
//! Containers are encrypted in place. Only whole 8-byte blocks are
//! transformed; a trailing partial block is left as plaintext, which is what
//! lets the 2-byte version trailer of a group sit outside the cipher.
//!
//! Words are read big-endian, the cipher runs the standard 32 rounds with the
//! golden-ratio delta.

use crate::error::CryptoError;
use std::fmt;
use std::str::FromStr;

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 8;

/// Number of Feistel rounds
pub const ROUNDS: u32 = 32;

const GOLDEN_RATIO: u32 = 0x9E37_79B9;

/// 128-bit XTEA key
///
/// The all-zero key is reserved to mean "not encrypted": container routines
/// skip the cipher entirely when given [`XteaKey::ZERO`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct XteaKey {
    k: [u32; 4],
}

impl XteaKey {
    /// The all-zero key, meaning "no encryption"
    pub const ZERO: Self = Self { k: [0; 4] };

    /// Create a key from its four 32-bit words
    pub const fn new(k0: u32, k1: u32, k2: u32, k3: u32) -> Self {
        Self {
            k: [k0, k1, k2, k3],
        }
    }

    /// Create a key from a word array
    pub const fn from_words(k: [u32; 4]) -> Self {
        Self { k }
    }

    /// The key's four 32-bit words
    pub const fn words(&self) -> [u32; 4] {
        self.k
    }

    /// Whether this is the all-zero key
    pub const fn is_zero(&self) -> bool {
        self.k[0] == 0 && self.k[1] == 0 && self.k[2] == 0 && self.k[3] == 0
    }

    /// Parse a key from 32 hexadecimal characters
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyFormat` if the string is not exactly
    /// 32 hex digits.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        if s.len() != 32 {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "expected 32 hex characters, got {}",
                s.len()
            )));
        }

        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid hex: {e}")))?;

        let mut k = [0u32; 4];
        for (word, chunk) in k.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        Ok(Self { k })
    }

    /// Lowercase hexadecimal representation (32 characters)
    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    /// Encrypt `data` in place
    ///
    /// Trailing bytes that do not fill a whole block are left untouched.
    pub fn encrypt(&self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            let (mut v0, mut v1) = read_block(block);
            let mut sum = 0u32;

            for _ in 0..ROUNDS {
                v0 = v0.wrapping_add(
                    (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                        ^ sum.wrapping_add(self.k[(sum & 3) as usize]),
                );
                sum = sum.wrapping_add(GOLDEN_RATIO);
                v1 = v1.wrapping_add(
                    (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                        ^ sum.wrapping_add(self.k[((sum >> 11) & 3) as usize]),
                );
            }

            write_block(block, v0, v1);
        }
    }

    /// Decrypt `data` in place
    ///
    /// Trailing bytes that do not fill a whole block are left untouched.
    pub fn decrypt(&self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            let (mut v0, mut v1) = read_block(block);
            let mut sum = GOLDEN_RATIO.wrapping_mul(ROUNDS);

            for _ in 0..ROUNDS {
                v1 = v1.wrapping_sub(
                    (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                        ^ sum.wrapping_add(self.k[((sum >> 11) & 3) as usize]),
                );
                sum = sum.wrapping_sub(GOLDEN_RATIO);
                v0 = v0.wrapping_sub(
                    (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                        ^ sum.wrapping_add(self.k[(sum & 3) as usize]),
                );
            }

            write_block(block, v0, v1);
        }
    }
}

fn read_block(block: &[u8]) -> (u32, u32) {
    (
        u32::from_be_bytes([block[0], block[1], block[2], block[3]]),
        u32::from_be_bytes([block[4], block[5], block[6], block[7]]),
    )
}

fn write_block(block: &mut [u8], v0: u32, v1: u32) {
    block[..4].copy_from_slice(&v0.to_be_bytes());
    block[4..].copy_from_slice(&v1.to_be_bytes());
}

impl fmt::Display for XteaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}{:08x}{:08x}{:08x}",
            self.k[0], self.k[1], self.k[2], self.k[3]
        )
    }
}

impl FromStr for XteaKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    struct TestVector {
        key: &'static str,
        plaintext: &'static str,
        ciphertext: &'static str,
    }

    const TEST_VECTORS: &[TestVector] = &[
        // empty
        TestVector {
            key: "00000000000000000000000000000000",
            plaintext: "",
            ciphertext: "",
        },
        // standard single block vectors
        TestVector {
            key: "000102030405060708090a0b0c0d0e0f",
            plaintext: "4142434445464748",
            ciphertext: "497df3d072612cb5",
        },
        TestVector {
            key: "000102030405060708090a0b0c0d0e0f",
            plaintext: "4141414141414141",
            ciphertext: "e78f2d13744341d8",
        },
        TestVector {
            key: "000102030405060708090a0b0c0d0e0f",
            plaintext: "5a5b6e278948d77f",
            ciphertext: "4141414141414141",
        },
        TestVector {
            key: "00000000000000000000000000000000",
            plaintext: "4142434445464748",
            ciphertext: "a0390589f8b8efa5",
        },
        TestVector {
            key: "00000000000000000000000000000000",
            plaintext: "4141414141414141",
            ciphertext: "ed23375a821a8c2d",
        },
        TestVector {
            key: "00000000000000000000000000000000",
            plaintext: "70e1225d6e4e7655",
            ciphertext: "4141414141414141",
        },
        // two blocks
        TestVector {
            key: "00000000000000000000000000000000",
            plaintext: "70e1225d6e4e76554141414141414141",
            ciphertext: "4141414141414141ed23375a821a8c2d",
        },
    ];

    #[test]
    fn test_encrypt_vectors_with_offsets() {
        for vector in TEST_VECTORS {
            let key = XteaKey::from_hex(vector.key).expect("valid key");
            let plaintext = hex::decode(vector.plaintext).expect("valid hex");
            let ciphertext = hex::decode(vector.ciphertext).expect("valid hex");

            for trailer_len in 0..BLOCK_SIZE {
                let trailer: Vec<u8> = (0..trailer_len as u8).collect();

                let mut buffer = plaintext.clone();
                buffer.extend_from_slice(&trailer);
                key.encrypt(&mut buffer);

                let mut expected = ciphertext.clone();
                expected.extend_from_slice(&trailer);
                assert_eq!(expected, buffer, "key {}", vector.key);
            }
        }
    }

    #[test]
    fn test_decrypt_vectors_with_offsets() {
        for vector in TEST_VECTORS {
            let key = XteaKey::from_hex(vector.key).expect("valid key");
            let plaintext = hex::decode(vector.plaintext).expect("valid hex");
            let ciphertext = hex::decode(vector.ciphertext).expect("valid hex");

            for trailer_len in 0..BLOCK_SIZE {
                let trailer: Vec<u8> = (0..trailer_len as u8).collect();

                let mut buffer = ciphertext.clone();
                buffer.extend_from_slice(&trailer);
                key.decrypt(&mut buffer);

                let mut expected = plaintext.clone();
                expected.extend_from_slice(&trailer);
                assert_eq!(expected, buffer, "key {}", vector.key);
            }
        }
    }

    #[test]
    fn test_hex_round_trip() {
        let key = XteaKey::new(0x0001_0203, 0x0405_0607, 0x0809_0a0b, 0x0c0d_0e0f);
        assert_eq!(key.to_hex(), "000102030405060708090a0b0c0d0e0f");
        assert_eq!(
            "000102030405060708090a0b0c0d0e0f"
                .parse::<XteaKey>()
                .expect("valid key"),
            key
        );
    }

    #[test]
    fn test_invalid_hex() {
        assert!(XteaKey::from_hex("").is_err());
        assert!(XteaKey::from_hex("0001020304050607").is_err());
        assert!(XteaKey::from_hex("zz0102030405060708090a0b0c0d0e0f").is_err());
    }

    #[test]
    fn test_zero_key() {
        assert!(XteaKey::ZERO.is_zero());
        assert!(XteaKey::default().is_zero());
        assert!(!XteaKey::new(0, 0, 0, 1).is_zero());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decrypt_inverts_encrypt(
                words in prop::array::uniform4(any::<u32>()),
                data in prop::collection::vec(any::<u8>(), 0..256)
            ) {
                let key = XteaKey::from_words(words);
                let mut buffer = data.clone();
                key.encrypt(&mut buffer);
                key.decrypt(&mut buffer);
                prop_assert_eq!(buffer, data);
            }
        }
    }
}
