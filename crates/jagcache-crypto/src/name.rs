//! Name hashing for catalog entries
//!
//! Groups and files in a catalog are named by a 32-bit hash rather than a
//! string. The hash is the classic 31-multiplier polynomial over the name's
//! Windows-1252 bytes. Characters with no Windows-1252 encoding are hashed
//! as `?`.

/// Characters occupying bytes 0x80..0xA0 in Windows-1252 (NUL marks holes)
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\0', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\0', '\u{017D}', '\0',
    '\0', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\0', '\u{017E}', '\u{0178}',
];

const REPLACEMENT: u8 = b'?';

/// Encode a single character as a Windows-1252 byte
pub fn encode_cp1252(c: char) -> u8 {
    let unit = u32::from(c);
    match unit {
        0x01..=0x7F | 0xA0..=0xFF => unit as u8,
        _ => CP1252_HIGH
            .iter()
            .position(|&mapped| mapped != '\0' && mapped == c)
            .map_or(REPLACEMENT, |i| 0x80 + i as u8),
    }
}

/// Hash a group or file name
///
/// # Examples
///
/// ```
/// use jagcache_crypto::name_hash;
///
/// assert_eq!(name_hash("hello"), 99_162_322);
/// ```
pub fn name_hash(name: &str) -> i32 {
    name.chars().fold(0i32, |hash, c| {
        hash.wrapping_mul(31)
            .wrapping_add(i32::from(encode_cp1252(c)))
    })
}
