//! End-to-end tests combining catalogs with the container codec
//!
//! Catalogs are stored as containers, and encrypted groups are opened by
//! trying candidate keys. These tests exercise both flows through the
//! public API only.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use jagcache_crypto::XteaKey;
use jagcache_formats::container::{self, CompressionOptions, CompressionType};
use jagcache_formats::group::{self, Files};
use jagcache_formats::index::{Index, Protocol};
use jagcache_formats::master_index::MasterIndex;
use jagcache_formats::{CacheFormat, ContainerError};
use pretty_assertions::assert_eq;

fn sample_index() -> Index {
    let mut index = Index::new(Protocol::Smart);
    index.version = 1234;
    index.has_names = true;
    index.has_lengths = true;

    for name in ["loc", "npc", "obj", "seq"] {
        let group = index.groups.create_or_get_named_str(name).unwrap();
        group.checksum = jagcache_crypto::name_hash(name) as u32;
        group.version = 7;
        group.length = 100;
        group.uncompressed_length = 400;
        for file in 0..50 {
            group.files.create_or_get(file);
        }
    }

    index
}

#[test]
fn catalog_survives_every_container_type() {
    let index = sample_index();
    let bytes = index.write().unwrap();

    for ty in CompressionType::ALL {
        let packed = container::compress(&bytes, ty, &XteaKey::ZERO).unwrap();
        let unpacked = container::uncompress(&packed, &XteaKey::ZERO).unwrap();
        assert_eq!(Index::read(&unpacked).unwrap(), index, "{ty}");
    }
}

#[test]
fn catalog_bytes_verify_round_trip() {
    let bytes = sample_index().write().unwrap();
    Index::verify_round_trip(&bytes).unwrap();
}

#[test]
fn best_compression_shrinks_repetitive_catalog() {
    let bytes = sample_index().write().unwrap();
    let options = CompressionOptions::default().with_lzma(true);

    let best = container::compress_best(&bytes, &options, &XteaKey::ZERO).unwrap();
    let uncompressed = container::compress(&bytes, CompressionType::None, &XteaKey::ZERO).unwrap();

    assert!(best.len() < uncompressed.len());
    assert_eq!(container::uncompress(&best, &XteaKey::ZERO).unwrap(), bytes);
}

#[test]
fn key_search_finds_the_right_key() {
    let keys: Vec<XteaKey> = (1..=16).map(|i| XteaKey::new(i, i * 3, i * 5, i * 7)).collect();
    let secret = keys[11];

    let data = b"map region terrain data ".repeat(40);
    let options = CompressionOptions::default();
    let packed = container::compress_best(&data, &options, &secret).unwrap();
    assert_ne!(packed[0], CompressionType::None.as_byte());

    let found: Vec<XteaKey> = keys
        .iter()
        .copied()
        .filter(|key| container::is_key_valid(&packed, key).unwrap())
        .collect();
    assert_eq!(found, vec![secret]);

    assert_eq!(
        container::uncompress_if_key_valid(&packed, &secret).unwrap(),
        Some(data)
    );
}

#[test]
fn stored_group_with_version_trailer() {
    let key = XteaKey::from_hex("00112233445566778899aabbccddeeff").unwrap();
    let mut group = container::compress(b"payload", CompressionType::Bzip2, &key).unwrap();
    container::append_version_trailer(&mut group, 0x00FF);

    // the trailer is not part of the container
    let (packed, version) = container::split_version_trailer(&group).unwrap();
    assert_eq!(version, Some(0x00FF));
    assert_eq!(container::uncompress(packed, &key).unwrap(), b"payload");
}

#[test]
fn garbage_is_rejected() {
    let err = container::uncompress(b"\x07garbage", &XteaKey::ZERO).unwrap_err();
    assert!(matches!(err, ContainerError::InvalidFormat(_)));
    assert!(Index::read(b"\x02garbage").is_err());
}

#[test]
fn group_files_follow_the_catalog() {
    let mut index = sample_index();
    let files: Files = (0..50).map(|file| (file, format!("file {file}").into_bytes())).collect();
    let packed = group::pack(&files).unwrap();
    let stored = container::compress(&packed, CompressionType::Gzip, &XteaKey::ZERO).unwrap();

    let entry = index.groups.get_named_str("npc").unwrap();
    let unpacked = container::uncompress(&stored, &XteaKey::ZERO).unwrap();
    assert_eq!(group::unpack(&unpacked, entry).unwrap(), files);

    // a catalog listing fewer files no longer matches the trailer
    let id = entry.id();
    index.groups.get_mut(id).unwrap().files.remove(49);
    assert!(group::unpack(&unpacked, index.groups.get(id).unwrap()).is_err());
}

#[test]
fn master_index_tracks_catalog_versions() {
    let mut catalogs = Vec::new();
    for version in [3u32, 5] {
        let mut index = sample_index();
        index.version = version;
        let bytes = index.write().unwrap();
        catalogs.push(container::compress(&bytes, CompressionType::Bzip2, &XteaKey::ZERO).unwrap());
    }

    let master = MasterIndex::create([(0, catalogs[0].as_slice()), (1, catalogs[1].as_slice())])
        .unwrap();
    assert_eq!(master.entries.iter().map(|e| e.version).collect::<Vec<_>>(), vec![3, 5]);
    assert_ne!(master.entries[0].checksum, master.entries[1].checksum);
    MasterIndex::verify_round_trip(&master.write().unwrap()).unwrap();
}
