//! Test utilities for format round-trip testing

use crate::CacheFormat;
use std::fmt::Debug;

/// Test round-trip serialization for a format instance
///
/// Verifies that a format can be serialized and deserialized back
/// to an equivalent value, and that rebuilding the parsed value yields
/// identical bytes.
pub fn test_round_trip<T>(original: &T) -> Result<(), Box<dyn std::error::Error>>
where
    T: CacheFormat + PartialEq + Debug,
{
    let data = original.build()?;
    let parsed = T::parse(&data)?;

    if original != &parsed {
        return Err(format!(
            "Round-trip verification failed:\nOriginal: {original:?}\nParsed: {parsed:?}"
        )
        .into());
    }

    T::verify_round_trip(&data)
}
