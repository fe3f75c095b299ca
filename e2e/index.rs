//! E2E: sidecar index behaviors.
//!
//! The index is advisory: deleting it must not change the extracted
//! result (the scanner takes over and regenerates it), while a stale or
//! truncated index must fail loudly instead of extracting a subset.

mod common;

use common::{
    assert_trees_equal, build_tree, create_archive, extract_archive, test_opts,
    try_extract_archive,
};
use ptar::comm::SoloComm;
use ptar::index;
use tempfile::TempDir;

#[test]
fn extract_without_index_matches_indexed_extract() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(2, &root, &archive, &test_opts());

    let with_idx = dir.path().join("with");
    extract_archive(3, &archive, &with_idx, &test_opts());

    std::fs::remove_file(index::index_path(&archive)).unwrap();
    let without_idx = dir.path().join("without");
    extract_archive(3, &archive, &without_idx, &test_opts());

    assert_trees_equal(&with_idx, &without_idx);
    assert_trees_equal(&root, &without_idx);
}

#[test]
fn scan_extraction_regenerates_the_index() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(1, &root, &archive, &test_opts());

    let idx = index::index_path(&archive);
    let original = std::fs::read(&idx).unwrap();
    std::fs::remove_file(&idx).unwrap();

    let dest = dir.path().join("dest");
    extract_archive(2, &archive, &dest, &test_opts());

    // byte-for-byte identical index reappears
    assert_eq!(std::fs::read(&idx).unwrap(), original);
}

#[test]
fn rewriting_an_index_reads_back_identically() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("a.tar");
    let comm = SoloComm::new();
    let offsets: Vec<u64> = (0..64).map(|i| i * 1536).collect();
    index::write_index(&comm, &archive, &offsets).unwrap();
    let first = std::fs::read(index::index_path(&archive)).unwrap();

    let back = index::read_index(&comm, &archive).unwrap().unwrap();
    index::write_index(&comm, &archive, &back).unwrap();
    assert_eq!(std::fs::read(index::index_path(&archive)).unwrap(), first);
}

#[test]
fn truncated_index_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(2, &root, &archive, &test_opts());

    // Drop the last offset: the index now claims one entry fewer.
    let idx = index::index_path(&archive);
    let len = std::fs::metadata(&idx).unwrap().len();
    let f = std::fs::OpenOptions::new().write(true).open(&idx).unwrap();
    f.set_len(len - 8).unwrap();
    drop(f);

    let dest = dir.path().join("dest");
    let err = try_extract_archive(2, &archive, &dest, &test_opts()).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn misaligned_index_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(1, &root, &archive, &test_opts());

    let idx = index::index_path(&archive);
    let len = std::fs::metadata(&idx).unwrap().len();
    let f = std::fs::OpenOptions::new().write(true).open(&idx).unwrap();
    f.set_len(len - 3).unwrap();
    drop(f);

    let dest = dir.path().join("dest");
    let err = try_extract_archive(2, &archive, &dest, &test_opts()).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn index_count_matches_entry_count() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(3, &root, &archive, &test_opts());

    let entries = ptar::flist::walk(&[root.clone()]).unwrap();
    let idx_len = std::fs::metadata(index::index_path(&archive)).unwrap().len();
    assert_eq!(idx_len, entries.len() as u64 * 8);
}
