//! E2E: failure behavior.
//!
//! Errors must surface as clean, uniform failures on every rank — never a
//! hang, never a partial success reported as success.

mod common;

use common::{build_tree, test_opts, try_create_archive, try_extract_archive};
use std::io::ErrorKind;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn invalid_chunk_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("f"), b"x").unwrap();

    let opts = ptar::ArchiveOpts {
        chunk_size: 1000, // not a multiple of 512
        ..test_opts()
    };
    let err =
        try_create_archive(1, &root, &dir.path().join("out.tar"), &opts).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn create_into_missing_directory_fails_on_all_ranks() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("f"), b"x").unwrap();

    let archive = Path::new("/nonexistent/__ptar_e2e__/out.tar");
    let err = try_create_archive(3, &root, archive, &test_opts()).unwrap_err();
    assert!(err.to_string().contains("failed to open archive"));
}

#[test]
fn extract_of_missing_archive_fails() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("ghost.tar");
    let dest = dir.path().join("dest");
    let err = try_extract_archive(2, &archive, &dest, &test_opts()).unwrap_err();
    assert!(err.to_string().contains("failed to"));
}

#[test]
fn extract_of_garbage_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("junk.tar");
    std::fs::write(&archive, vec![0x5Au8; 4096]).unwrap();
    let dest = dir.path().join("dest");
    let err = try_extract_archive(2, &archive, &dest, &test_opts()).unwrap_err();
    // fails in the scan-extract fallback, uniformly on every rank
    assert!(err.to_string().contains("failed to"));
}

#[test]
fn truncated_archive_fails_extraction() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    common::create_archive(1, &root, &archive, &test_opts());

    // Chop off the trailer and the last entry's tail, keep the stale index.
    let len = std::fs::metadata(&archive).unwrap().len();
    let f = std::fs::OpenOptions::new().write(true).open(&archive).unwrap();
    f.set_len(len - 1536).unwrap();
    drop(f);

    let dest = dir.path().join("dest");
    let err = try_extract_archive(2, &archive, &dest, &test_opts()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn vanished_source_file_fails_create() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("stays.txt"), b"fine").unwrap();
    std::fs::write(root.join("goes.txt"), vec![1u8; 2048]).unwrap();

    // Walk first, delete afterwards: the copy phase hits a missing file.
    let entries = ptar::flist::walk(&[root.clone()]).unwrap();
    std::fs::remove_file(root.join("goes.txt")).unwrap();

    let comm = ptar::SoloComm::new();
    let archive = dir.path().join("out.tar");
    let err =
        ptar::archive_create(&comm, &entries, &archive, &root, &test_opts()).unwrap_err();
    assert!(err.to_string().contains("failed to write archive"));

    // Partial archive is left on disk for the caller to inspect or remove.
    assert!(archive.exists());
}

#[test]
fn shrunken_source_file_fails_create() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("shrinks.bin"), vec![1u8; 4096]).unwrap();

    let entries = ptar::flist::walk(&[root.clone()]).unwrap();
    // File loses data between layout and copy: a short read must fail the
    // rank rather than silently produce a hole.
    std::fs::write(root.join("shrinks.bin"), b"tiny").unwrap();

    let comm = ptar::SoloComm::new();
    let archive = dir.path().join("out.tar");
    let result = ptar::archive_create(&comm, &entries, &archive, &root, &test_opts());
    assert!(result.is_err());
}

#[test]
fn unsupported_entry_types_are_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("normal.txt"), b"data").unwrap();
    nix::unistd::mkfifo(&root.join("pipe"), nix::sys::stat::Mode::from_bits_truncate(0o644))
        .unwrap();

    let archive = dir.path().join("out.tar");
    common::create_archive(2, &root, &archive, &test_opts());

    let dest = dir.path().join("dest");
    common::extract_archive(2, &archive, &dest, &test_opts());
    assert!(dest.join("normal.txt").exists());
    assert!(!dest.join("pipe").exists());
}
