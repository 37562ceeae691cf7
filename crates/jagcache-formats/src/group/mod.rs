//! Files packed inside a group
//!
//! A group holding a single file stores that file's bytes as they are. A
//! group holding several files splits each file into stripes and stores the
//! chunks stripe by stripe, followed by a trailer of chunk lengths:
//!
//! ```text
//! chunks          stripe 0 of every file, then stripe 1, ...
//! chunk lengths   i32 * files * stripes   delta from the previous chunk length in the stripe
//! stripes         u8
//! ```
//!
//! Files appear in ascending id order, matching the group's entry in the
//! archive catalog, which is the only place their ids are recorded.
//! [`pack`] writes a single stripe, or just a zero stripe count when every
//! file is empty.
//!
//! # Examples
//!
//! ```
//! use jagcache_formats::group::{self, Files};
//! use jagcache_formats::index::Group;
//!
//! let mut entry = Group::default();
//! entry.files.create_or_get(0);
//! entry.files.create_or_get(4);
//!
//! let files = Files::from([(0, b"first".to_vec()), (4, b"second".to_vec())]);
//! let packed = group::pack(&files).expect("pack");
//! assert_eq!(group::unpack(&packed, &entry).expect("unpack"), files);
//! ```

mod error;

pub use error::{GroupError, GroupResult};

use crate::index::Group;
use binrw::BinReaderExt;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::trace;

/// Length of one chunk length in the trailer
pub const CHUNK_LENGTH_LEN: usize = 4;

/// File contents keyed by file id
pub type Files = BTreeMap<u32, Vec<u8>>;

/// Split a group payload into the files listed in its catalog entry
pub fn unpack(data: &[u8], group: &Group) -> GroupResult<Files> {
    let ids: Vec<u32> = group.files.ids().collect();
    match ids.as_slice() {
        [] => return Err(GroupError::NoFiles),
        [id] => return Ok(Files::from([(*id, data.to_vec())])),
        _ => {}
    }

    let Some((&stripes, _)) = data.split_last() else {
        return Err(GroupError::Corrupt("missing stripe count".to_string()));
    };

    let trailer_len = usize::from(stripes) * ids.len() * CHUNK_LENGTH_LEN + 1;
    let payload_len = data.len().checked_sub(trailer_len).ok_or_else(|| {
        GroupError::Corrupt(format!(
            "trailer of {trailer_len} bytes exceeds group of {} bytes",
            data.len()
        ))
    })?;
    trace!("unpacking {} files from {} stripes", ids.len(), stripes);

    let mut trailer = Cursor::new(&data[payload_len..]);
    let mut contents = vec![Vec::new(); ids.len()];
    let mut pos = 0usize;

    for stripe in 0..stripes {
        let mut len = 0i32;
        for file in &mut contents {
            len = len.wrapping_add(trailer.read_be::<i32>()?);
            let chunk = usize::try_from(len).map_err(|_| {
                GroupError::Corrupt(format!("negative chunk length {len} in stripe {stripe}"))
            })?;
            let end = pos
                .checked_add(chunk)
                .filter(|&end| end <= payload_len)
                .ok_or_else(|| {
                    GroupError::Corrupt(format!(
                        "chunk of {chunk} bytes at {pos} overruns payload of {payload_len} bytes"
                    ))
                })?;
            file.extend_from_slice(&data[pos..end]);
            pos = end;
        }
    }

    if pos != payload_len {
        return Err(GroupError::Corrupt(format!(
            "chunks cover {pos} of {payload_len} payload bytes"
        )));
    }

    Ok(ids.into_iter().zip(contents).collect())
}

/// Pack files into a group payload
pub fn pack(files: &Files) -> GroupResult<Vec<u8>> {
    let contents: Vec<&Vec<u8>> = files.values().collect();
    match contents.as_slice() {
        [] => return Err(GroupError::NoFiles),
        [only] => return Ok(only.to_vec()),
        _ => {}
    }

    if contents.iter().all(|file| file.is_empty()) {
        return Ok(vec![0]);
    }

    let payload_len: usize = contents.iter().map(|file| file.len()).sum();
    let mut output = Vec::with_capacity(payload_len + contents.len() * CHUNK_LENGTH_LEN + 1);
    for file in &contents {
        output.extend_from_slice(file);
    }

    let mut prev = 0i32;
    for file in &contents {
        let len = i32::try_from(file.len()).map_err(|_| {
            GroupError::InvalidArgument(format!("file of {} bytes", file.len()))
        })?;
        output.extend_from_slice(&len.wrapping_sub(prev).to_be_bytes());
        prev = len;
    }
    output.push(1);

    Ok(output)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn entry(ids: &[u32]) -> Group {
        let mut group = Group::default();
        for &id in ids {
            group.files.create_or_get(id);
        }
        group
    }

    #[test]
    fn test_single_file_stored_verbatim() {
        let files = Files::from([(7, b"lonely".to_vec())]);
        let packed = pack(&files).unwrap();
        assert_eq!(packed, b"lonely");
        assert_eq!(unpack(&packed, &entry(&[7])).unwrap(), files);

        // no trailer is expected, even for empty data
        assert_eq!(unpack(&[], &entry(&[7])).unwrap(), Files::from([(7, Vec::new())]));
    }

    #[test]
    fn test_pack_layout() {
        let files = Files::from([(0, b"ab".to_vec()), (1, b"cde".to_vec())]);
        let expected = [
            b'a', b'b', b'c', b'd', b'e', // chunks
            0, 0, 0, 2, // first length
            0, 0, 0, 1, // delta to the second
            1, // stripes
        ];
        assert_eq!(pack(&files).unwrap(), expected.to_vec());
        assert_eq!(unpack(&expected, &entry(&[0, 1])).unwrap(), files);
    }

    #[test]
    fn test_shrinking_lengths_use_negative_deltas() {
        let files = Files::from([(2, vec![1; 300]), (9, vec![2; 5]), (10, Vec::new())]);
        let packed = pack(&files).unwrap();
        let trailer = &packed[305..];
        assert_eq!(&trailer[4..8], &(-295i32).to_be_bytes());
        assert_eq!(&trailer[8..12], &(-5i32).to_be_bytes());
        assert_eq!(unpack(&packed, &entry(&[2, 9, 10])).unwrap(), files);
    }

    #[test]
    fn test_all_empty_files() {
        let files = Files::from([(0, Vec::new()), (3, Vec::new())]);
        assert_eq!(pack(&files).unwrap(), vec![0]);
        assert_eq!(unpack(&[0], &entry(&[0, 3])).unwrap(), files);
    }

    #[test]
    fn test_multiple_stripes() {
        let data = [
            b'a', b'b', b'c', // stripe 0: "a", "bc"
            b'd', b'e', b'f', // stripe 1: "de", "f"
            0, 0, 0, 1, 0, 0, 0, 1, // stripe 0 lengths 1, 2
            0, 0, 0, 2, 0xFF, 0xFF, 0xFF, 0xFF, // stripe 1 lengths 2, 1
            2,
        ];
        let files = unpack(&data, &entry(&[4, 8])).unwrap();
        assert_eq!(files, Files::from([(4, b"ade".to_vec()), (8, b"bcf".to_vec())]));
    }

    #[test]
    fn test_no_files() {
        assert!(matches!(pack(&Files::new()), Err(GroupError::NoFiles)));
        assert!(matches!(unpack(b"data", &Group::default()), Err(GroupError::NoFiles)));
    }

    #[test]
    fn test_corrupt_trailers() {
        let group = entry(&[0, 1]);

        // nothing at all
        assert!(matches!(unpack(&[], &group), Err(GroupError::Corrupt(_))));
        // stripe count larger than the group
        assert!(matches!(unpack(&[1, 2, 3, 5], &group), Err(GroupError::Corrupt(_))));
        // negative first length
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 1];
        assert!(matches!(unpack(&data, &group), Err(GroupError::Corrupt(_))));
        // chunk past the trailer
        let data = [b'a', 0, 0, 0, 2, 0, 0, 0, 0, 1];
        assert!(matches!(unpack(&data, &group), Err(GroupError::Corrupt(_))));
        // payload bytes no chunk accounts for
        let data = [b'a', b'b', 0, 0, 0, 1, 0xFF, 0xFF, 0xFF, 0xFF, 1];
        assert!(matches!(unpack(&data, &group), Err(GroupError::Corrupt(_))));
    }

    proptest! {
        #[test]
        fn prop_pack_unpack(
            files in prop::collection::btree_map(any::<u32>(), prop::collection::vec(any::<u8>(), 0..64), 1..8),
        ) {
            let ids: Vec<u32> = files.keys().copied().collect();
            let packed = pack(&files).unwrap();
            prop_assert_eq!(unpack(&packed, &entry(&ids)).unwrap(), files);
        }
    }
}
