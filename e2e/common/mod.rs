//! Shared helpers for the e2e suites.
#![allow(dead_code)] // each suite uses its own subset

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ptar::comm::{block_partition, Comm, ThreadComm};
use ptar::flist;
use ptar::opts::ArchiveOpts;

/// Quiet options suited to test runs: no progress chatter, small chunks so
/// multi-chunk paths are exercised even by small trees.
pub fn test_opts() -> ArchiveOpts {
    ptar::set_display_level(0);
    ArchiveOpts {
        chunk_size: 1024,
        buf_size: 512,
        progress_timeout: 0,
        ..ArchiveOpts::default()
    }
}

/// A tree with the shapes that matter: nested dirs, a multi-chunk file, an
/// exactly-512-multiple file, an empty file, and symlinks.
pub fn build_tree(root: &Path) {
    std::fs::create_dir_all(root.join("sub/deep")).unwrap();
    std::fs::write(root.join("hello.txt"), b"hello world!\n").unwrap();
    std::fs::write(root.join("empty.bin"), b"").unwrap();
    std::fs::write(root.join("block.bin"), vec![0x42u8; 1024]).unwrap();
    let big: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(root.join("sub/big.bin"), big).unwrap();
    std::fs::write(root.join("sub/deep/leaf.txt"), b"leaf").unwrap();
    std::os::unix::fs::symlink("hello.txt", root.join("link_rel")).unwrap();
    std::os::unix::fs::symlink("/etc/hostname", root.join("link_abs")).unwrap();
}

/// Create `archive` from `root` with an R-rank group; panics on failure.
pub fn create_archive(ranks: usize, root: &Path, archive: &Path, opts: &ArchiveOpts) {
    try_create_archive(ranks, root, archive, opts).unwrap();
}

pub fn try_create_archive(
    ranks: usize,
    root: &Path,
    archive: &Path,
    opts: &ArchiveOpts,
) -> std::io::Result<()> {
    let entries = Arc::new(flist::walk(&[root.to_path_buf()]).unwrap());
    let results = ThreadComm::run(ranks, |comm| {
        let (start, count) = block_partition(entries.len() as u64, comm.size(), comm.rank());
        let mine = &entries[start as usize..(start + count) as usize];
        ptar::archive_create(comm, mine, archive, root, opts)
    });
    results.into_iter().collect()
}

/// Extract `archive` into `dest` with an R-rank group; panics on failure.
pub fn extract_archive(ranks: usize, archive: &Path, dest: &Path, opts: &ArchiveOpts) {
    try_extract_archive(ranks, archive, dest, opts).unwrap();
}

pub fn try_extract_archive(
    ranks: usize,
    archive: &Path,
    dest: &Path,
    opts: &ArchiveOpts,
) -> std::io::Result<()> {
    std::fs::create_dir_all(dest).unwrap();
    let results =
        ThreadComm::run(ranks, |comm| ptar::archive_extract(comm, archive, dest, opts));
    results.into_iter().collect()
}

/// Collect the sorted relative paths under `root`.
pub fn list_tree(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap().path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    paths.sort();
    paths
}

/// Assert two trees are equivalent: same items, types, contents, symlink
/// targets, permission bits, and file mtimes (to nanosecond granularity).
pub fn assert_trees_equal(original: &Path, extracted: &Path) {
    use std::os::unix::fs::MetadataExt;

    let a = list_tree(original);
    let b = list_tree(extracted);
    assert_eq!(a, b, "tree shapes differ");

    for rel in &a {
        let src = original.join(rel);
        let dst = extracted.join(rel);
        let sm = std::fs::symlink_metadata(&src).unwrap();
        let dm = std::fs::symlink_metadata(&dst).unwrap();
        assert_eq!(
            sm.file_type().is_symlink(),
            dm.file_type().is_symlink(),
            "{rel:?}: symlink-ness differs"
        );
        if sm.file_type().is_symlink() {
            assert_eq!(
                std::fs::read_link(&src).unwrap(),
                std::fs::read_link(&dst).unwrap(),
                "{rel:?}: target differs"
            );
            continue;
        }
        assert_eq!(sm.is_dir(), dm.is_dir(), "{rel:?}: type differs");
        assert_eq!(
            sm.mode() & 0o7777,
            dm.mode() & 0o7777,
            "{rel:?}: mode differs"
        );
        if sm.is_file() {
            assert_eq!(
                std::fs::read(&src).unwrap(),
                std::fs::read(&dst).unwrap(),
                "{rel:?}: contents differ"
            );
            assert_eq!(sm.mtime(), dm.mtime(), "{rel:?}: mtime secs differ");
            assert_eq!(sm.mtime_nsec(), dm.mtime_nsec(), "{rel:?}: mtime nanos differ");
        }
    }
}
