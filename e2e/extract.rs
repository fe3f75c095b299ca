//! E2E: extraction round trips.
//!
//! `extract(create(tree))` must reproduce the tree — contents, types,
//! symlink targets, modes, and timestamps — through the direct engine, the
//! codec engine, and repeated (idempotent) extraction.

mod common;

use common::{
    assert_trees_equal, build_tree, create_archive, extract_archive, test_opts,
};
use ptar::opts::ExtractMode;
use tempfile::TempDir;

fn roundtrip(ranks_create: usize, ranks_extract: usize, mode: ExtractMode) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(ranks_create, &root, &archive, &test_opts());

    let dest = dir.path().join("dest");
    let opts = ptar::ArchiveOpts {
        extract_mode: mode,
        ..test_opts()
    };
    extract_archive(ranks_extract, &archive, &dest, &opts);
    assert_trees_equal(&root, &dest);
}

#[test]
fn direct_extract_round_trip_solo() {
    roundtrip(1, 1, ExtractMode::Direct);
}

#[test]
fn direct_extract_round_trip_parallel() {
    roundtrip(4, 3, ExtractMode::Direct);
}

#[test]
fn codec_extract_round_trip_solo() {
    roundtrip(1, 1, ExtractMode::Codec);
}

#[test]
fn codec_extract_round_trip_parallel() {
    roundtrip(2, 4, ExtractMode::Codec);
}

#[test]
fn direct_and_codec_extract_agree() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(2, &root, &archive, &test_opts());

    let direct = dir.path().join("direct");
    let codec = dir.path().join("codec");
    extract_archive(3, &archive, &direct, &test_opts());
    let opts = ptar::ArchiveOpts {
        extract_mode: ExtractMode::Codec,
        ..test_opts()
    };
    extract_archive(3, &archive, &codec, &opts);
    assert_trees_equal(&direct, &codec);
}

#[test]
fn extract_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(2, &root, &archive, &test_opts());

    let dest = dir.path().join("dest");
    extract_archive(2, &archive, &dest, &test_opts());
    // Dirty one extracted file, then extract again over the top.
    std::fs::write(dest.join("hello.txt"), b"overwritten junk that is longer").unwrap();
    extract_archive(2, &archive, &dest, &test_opts());
    assert_trees_equal(&root, &dest);
}

#[test]
fn extract_preserves_exec_and_readonly_modes() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("tool.sh"), b"#!/bin/sh\n").unwrap();
    std::fs::set_permissions(root.join("tool.sh"), std::fs::Permissions::from_mode(0o755))
        .unwrap();
    std::fs::write(root.join("frozen.txt"), b"ro").unwrap();
    std::fs::set_permissions(
        root.join("frozen.txt"),
        std::fs::Permissions::from_mode(0o444),
    )
    .unwrap();

    let archive = dir.path().join("out.tar");
    create_archive(1, &root, &archive, &test_opts());
    let dest = dir.path().join("dest");
    extract_archive(2, &archive, &dest, &test_opts());

    let tool = std::fs::metadata(dest.join("tool.sh")).unwrap();
    assert_eq!(tool.permissions().mode() & 0o7777, 0o755);
    let frozen = std::fs::metadata(dest.join("frozen.txt")).unwrap();
    assert_eq!(frozen.permissions().mode() & 0o7777, 0o444);
}

#[test]
fn extract_restores_mtime() {
    use std::os::unix::fs::MetadataExt;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("old.txt"), b"ancient").unwrap();
    filetime::set_file_times(
        root.join("old.txt"),
        filetime::FileTime::from_unix_time(1_000_000_000, 123_456_789),
        filetime::FileTime::from_unix_time(1_000_000_000, 123_456_789),
    )
    .unwrap();

    let archive = dir.path().join("out.tar");
    create_archive(1, &root, &archive, &test_opts());
    let dest = dir.path().join("dest");
    extract_archive(1, &archive, &dest, &test_opts());

    let m = std::fs::metadata(dest.join("old.txt")).unwrap();
    assert_eq!(m.mtime(), 1_000_000_000);
    assert_eq!(m.mtime_nsec(), 123_456_789);
}

#[test]
fn more_ranks_than_entries_still_works() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("only.txt"), b"just me").unwrap();

    let archive = dir.path().join("out.tar");
    create_archive(8, &root, &archive, &test_opts());
    let dest = dir.path().join("dest");
    extract_archive(8, &archive, &dest, &test_opts());
    assert_trees_equal(&root, &dest);
}

#[test]
fn long_paths_survive_the_round_trip() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    let deep = root.join("d".repeat(120)).join("e".repeat(120));
    std::fs::create_dir_all(&deep).unwrap();
    std::fs::write(deep.join("buried.txt"), b"deep data").unwrap();

    let archive = dir.path().join("out.tar");
    create_archive(2, &root, &archive, &test_opts());
    let dest = dir.path().join("dest");
    extract_archive(2, &archive, &dest, &test_opts());
    assert_trees_equal(&root, &dest);
}
