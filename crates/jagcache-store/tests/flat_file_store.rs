//! Integration tests for the flat-file store

#![allow(clippy::expect_used, clippy::unwrap_used)]

use jagcache_store::{FlatFileStore, MAX_GROUP_SIZE, Store, StoreError};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_open_requires_root() {
    let dir = TempDir::new().expect("temp dir");
    let result = FlatFileStore::open(dir.path().join("missing"));
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[test]
fn test_create_makes_root() {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path().join("nested").join("cache");
    let store = FlatFileStore::create(&root).expect("create");
    assert!(root.is_dir());
    assert_eq!(store.root(), root.as_path());
    assert!(store.list_archives().expect("list").is_empty());
}

#[test]
fn test_write_read_layout() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = FlatFileStore::create(dir.path()).expect("create");

    store.write(2, 40, b"contents").expect("write");

    let path = dir.path().join("2").join("40.dat");
    assert_eq!(fs::read(&path).expect("file"), b"contents");
    assert!(!dir.path().join("2").join("40.tmp").exists());
    assert!(store.archive_exists(2).expect("exists"));
    assert!(store.group_exists(2, 40).expect("exists"));
    assert_eq!(store.read(2, 40).expect("read"), b"contents");
}

#[test]
fn test_overwrite_replaces_contents() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = FlatFileStore::create(dir.path()).expect("create");

    store.write(0, 1, &[1; 5000]).expect("write");
    store.write(0, 1, &[2; 3]).expect("overwrite");
    assert_eq!(store.read(0, 1).expect("read"), vec![2; 3]);

    store.write(0, 1, &[]).expect("empty");
    assert_eq!(store.read(0, 1).expect("read"), Vec::<u8>::new());
}

#[test]
fn test_list_ignores_non_canonical_names() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = FlatFileStore::create(dir.path()).expect("create");

    store.write(10, 3, b"a").expect("write");
    store.write(10, 20, b"b").expect("write");
    store.write(2, 0, b"c").expect("write");
    store.create_archive(255).expect("create archive");

    fs::create_dir(dir.path().join("007")).expect("dir");
    fs::create_dir(dir.path().join("256")).expect("dir");
    fs::create_dir(dir.path().join("tmp")).expect("dir");
    fs::write(dir.path().join("5"), b"not a directory").expect("file");
    fs::write(dir.path().join("10").join("04.dat"), b"").expect("file");
    fs::write(dir.path().join("10").join("5.tmp"), b"").expect("file");
    fs::write(dir.path().join("10").join("x.dat"), b"").expect("file");
    fs::create_dir(dir.path().join("10").join("6.dat")).expect("dir");

    assert_eq!(store.list_archives().expect("list"), vec![2, 10, 255]);
    assert_eq!(store.list_groups(10).expect("list"), vec![3, 20]);
    assert!(store.list_groups(255).expect("list").is_empty());
    assert!(matches!(store.list_groups(4), Err(StoreError::NotFound(_))));
}

#[test]
fn test_missing_group() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = FlatFileStore::create(dir.path()).expect("create");

    assert!(!store.group_exists(1, 1).expect("exists"));
    assert!(matches!(store.read(1, 1), Err(StoreError::NotFound(_))));
    store.remove_group(1, 1).expect("remove missing");
    store.remove_archive(1).expect("remove missing archive");
}

#[test]
fn test_remove_group_and_archive() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = FlatFileStore::create(dir.path()).expect("create");

    store.write(3, 1, b"one").expect("write");
    store.write(3, 2, b"two").expect("write");

    store.remove_group(3, 1).expect("remove");
    assert!(!store.group_exists(3, 1).expect("exists"));
    assert_eq!(store.list_groups(3).expect("list"), vec![2]);

    store.remove_archive(3).expect("remove archive");
    assert!(!store.archive_exists(3).expect("exists"));
    assert!(!dir.path().join("3").exists());
}

#[test]
fn test_remove_archive_keeps_foreign_files() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = FlatFileStore::create(dir.path()).expect("create");

    store.write(3, 1, b"one").expect("write");
    fs::write(dir.path().join("3").join("notes.txt"), b"keep").expect("file");

    assert!(matches!(store.remove_archive(3), Err(StoreError::Io(_))));
    assert!(!store.group_exists(3, 1).expect("exists"));
    assert!(dir.path().join("3").join("notes.txt").is_file());
}

#[test]
fn test_oversized_group_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = FlatFileStore::create(dir.path()).expect("create");

    let data = vec![0u8; MAX_GROUP_SIZE + 1];
    assert!(matches!(
        store.write(0, 0, &data),
        Err(StoreError::InvalidArgument(_))
    ));

    // An oversized file placed by hand reads as corrupt.
    fs::create_dir(dir.path().join("0")).expect("dir");
    let file = fs::File::create(dir.path().join("0").join("0.dat")).expect("file");
    file.set_len(MAX_GROUP_SIZE as u64 + 1).expect("length");
    assert!(matches!(store.read(0, 0), Err(StoreError::Corrupt(_))));
}

#[test]
fn test_reopen_preserves_contents() {
    let dir = TempDir::new().expect("temp dir");
    {
        let mut store = FlatFileStore::create(dir.path()).expect("create");
        store.write(255, 70_000, b"catalog").expect("write");
        store.flush().expect("flush");
        store.close().expect("close");
    }

    let mut store = FlatFileStore::open(dir.path()).expect("open");
    assert_eq!(store.list_groups(255).expect("list"), vec![70_000]);
    assert_eq!(store.read(255, 70_000).expect("read"), b"catalog");
}
