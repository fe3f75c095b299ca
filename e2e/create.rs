//! E2E: archive creation.
//!
//! Validates the on-disk layout promises: block alignment, the size
//! formula, the zero trailer, the index contents, and the concrete tiny
//! scenarios (a 13-byte file plus an empty file, a file of exactly 1024
//! bytes, a lone symlink, an empty input list).

mod common;

use std::io::BufReader;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use common::{build_tree, create_archive, test_opts};
use ptar::Comm;
use ptar::comm::{SoloComm, ThreadComm};
use ptar::{codec, flist, index};
use tempfile::TempDir;

/// Read the index file back as offsets.
fn read_idx(archive: &Path) -> Vec<u64> {
    let comm = SoloComm::new();
    index::read_index(&comm, archive).unwrap().unwrap()
}

/// Walk the archive itself, returning (offset, name, entry_len) triples.
fn scan_entries(archive: &Path) -> Vec<(u64, String, u64)> {
    let file = std::fs::File::open(archive).unwrap();
    let mut reader = BufReader::new(file);
    let mut out = Vec::new();
    let mut pos = 0u64;
    while let Some(h) = codec::read_next_header(&mut reader).unwrap() {
        out.push((pos, h.name.clone(), h.entry_len()));
        let padded = h.padded_size();
        if padded > 0 {
            reader.seek_relative(padded as i64).unwrap();
        }
        pos += h.entry_len();
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tiny archive: files `a` (13 bytes) and `b` (0 bytes)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn tiny_archive_layout() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("src");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("a"), b"hello world!\n").unwrap();
    std::fs::write(root.join("b"), b"").unwrap();
    let archive = dir.path().join("tiny.tar");

    // Archive just the two files (not the containing directory).
    let entries = flist::walk(&[root.join("a"), root.join("b")]).unwrap();
    let comm = SoloComm::new();
    ptar::archive_create(&comm, &entries, &archive, &root, &test_opts()).unwrap();

    let scanned = scan_entries(&archive);
    assert_eq!(scanned.len(), 2);
    assert_eq!(scanned[0].1, "a");
    assert_eq!(scanned[1].1, "b");

    let hdr_a = scanned[0].2 - 512; // entry a = header + one content block
    let offsets = read_idx(&archive);
    assert_eq!(offsets, vec![0, hdr_a + 512]);

    // size = hdr(a) + 512 + hdr(b) + 0 + 1024
    let bytes = std::fs::read(&archive).unwrap();
    assert_eq!(bytes.len() as u64, scanned[0].2 + scanned[1].2 + 1024);
    assert!(bytes[bytes.len() - 1024..].iter().all(|&b| b == 0));
}

// ─────────────────────────────────────────────────────────────────────────────
// Pad boundary: one file of exactly 1024 bytes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn content_multiple_of_block_needs_no_padding() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("src");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("c"), vec![7u8; 1024]).unwrap();
    let archive = dir.path().join("pad.tar");

    let entries = flist::walk(&[root.join("c")]).unwrap();
    let comm = SoloComm::new();
    ptar::archive_create(&comm, &entries, &archive, &root, &test_opts()).unwrap();

    let scanned = scan_entries(&archive);
    let hdr_c = scanned[0].2 - 1024;
    let bytes = std::fs::read(&archive).unwrap();
    assert_eq!(bytes.len() as u64, hdr_c + 1024 + 1024);

    // the content region is exactly the file bytes, unpadded
    let content = &bytes[hdr_c as usize..(hdr_c + 1024) as usize];
    assert!(content.iter().all(|&b| b == 7));
}

// ─────────────────────────────────────────────────────────────────────────────
// Symlink: one header entry, no content bytes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn symlink_entry_has_no_content() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("src");
    std::fs::create_dir(&root).unwrap();
    std::os::unix::fs::symlink("/etc/hostname", root.join("l")).unwrap();
    let archive = dir.path().join("sym.tar");

    let entries = flist::walk(&[root.join("l")]).unwrap();
    let comm = SoloComm::new();
    ptar::archive_create(&comm, &entries, &archive, &root, &test_opts()).unwrap();

    let file = std::fs::File::open(&archive).unwrap();
    let mut reader = BufReader::new(file);
    let h = codec::read_next_header(&mut reader).unwrap().unwrap();
    assert_eq!(h.target.as_deref(), Some("/etc/hostname"));
    assert_eq!(h.padded_size(), 0);
    assert!(codec::read_next_header(&mut reader).unwrap().is_none());

    let bytes = std::fs::read(&archive).unwrap();
    assert_eq!(bytes.len() as u64, h.header_len + 1024);
}

// ─────────────────────────────────────────────────────────────────────────────
// Empty input list
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn empty_list_is_just_the_trailer() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("empty.tar");

    let results = ThreadComm::run(2, |comm| {
        ptar::archive_create(comm, &[], &archive, dir.path(), &test_opts())
    });
    for r in results {
        r.unwrap();
    }

    let bytes = std::fs::read(&archive).unwrap();
    assert_eq!(bytes.len(), 1024);
    assert!(bytes.iter().all(|&b| b == 0));
    assert!(read_idx(&archive).is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Structural invariants over a real tree
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn every_entry_starts_on_a_block_boundary() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("tree.tar");
    create_archive(2, &root, &archive, &test_opts());

    let offsets = read_idx(&archive);
    let scanned = scan_entries(&archive);
    assert_eq!(offsets.len(), scanned.len());
    for (idx_off, (scan_off, _, entry_len)) in offsets.iter().zip(scanned.iter()) {
        assert_eq!(idx_off, scan_off);
        assert_eq!(idx_off % 512, 0);
        assert_eq!(entry_len % 512, 0);
    }

    let total: u64 = scanned.iter().map(|(_, _, len)| len).sum();
    assert_eq!(std::fs::metadata(&archive).unwrap().len(), total + 1024);
}

#[test]
fn index_offsets_each_address_a_readable_header() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("tree.tar");
    create_archive(3, &root, &archive, &test_opts());

    // Entry order is the sorted walk order.
    let entries = flist::walk(&[root.clone()]).unwrap();
    let offsets = read_idx(&archive);
    assert_eq!(offsets.len(), entries.len());

    let mut file = std::fs::File::open(&archive).unwrap();
    for (entry, off) in entries.iter().zip(offsets.iter()) {
        file.seek(std::io::SeekFrom::Start(*off)).unwrap();
        let h = codec::read_next_header(&mut BufReader::new(&file))
            .unwrap()
            .unwrap();
        let expect = flist::relative_path(&entry.path, &root);
        assert_eq!(h.name, expect.to_string_lossy());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Overwrite semantics
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn recreate_truncates_previous_archive() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");

    create_archive(2, &root, &archive, &test_opts());
    let first = std::fs::metadata(&archive).unwrap().len();

    // Shrink the tree and recreate; no stale tail may survive.
    std::fs::remove_file(root.join("sub/big.bin")).unwrap();
    create_archive(2, &root, &archive, &test_opts());
    let second = std::fs::metadata(&archive).unwrap().len();
    assert!(second < first);

    let bytes = std::fs::read(&archive).unwrap();
    assert!(bytes[bytes.len() - 1024..].iter().all(|&b| b == 0));
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared-list helper: all ranks see the same entries
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn list_broadcast_matches_local_walk() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);

    let entries = flist::walk(&[root.clone()]).unwrap();
    let encoded = Arc::new(flist::encode_list(&entries));
    let counts = ThreadComm::run(4, |comm| {
        let bytes = if comm.rank() == 0 {
            encoded.as_ref().clone()
        } else {
            Vec::new()
        };
        let bytes = comm.broadcast_bytes(0, bytes);
        flist::decode_list(&bytes).unwrap().len()
    });
    for c in counts {
        assert_eq!(c, entries.len());
    }
}
