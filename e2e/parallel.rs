//! E2E: parallel determinism.
//!
//! The archive is a pure function of the input list: any rank count and
//! either copy engine must produce byte-identical output, and extraction
//! must not depend on the rank count either.

mod common;

use common::{assert_trees_equal, build_tree, create_archive, extract_archive, test_opts};
use ptar::opts::CreateEngine;
use tempfile::TempDir;

#[test]
fn archive_bytes_identical_across_rank_counts() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);

    let reference = dir.path().join("r1.tar");
    create_archive(1, &root, &reference, &test_opts());
    let reference_bytes = std::fs::read(&reference).unwrap();

    for ranks in [2, 4, 8] {
        let archive = dir.path().join(format!("r{ranks}.tar"));
        create_archive(ranks, &root, &archive, &test_opts());
        assert_eq!(
            std::fs::read(&archive).unwrap(),
            reference_bytes,
            "rank count {ranks} changed the archive bytes"
        );
    }
}

#[test]
fn engines_produce_identical_archives() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);

    let st = dir.path().join("static.tar");
    create_archive(3, &root, &st, &test_opts());

    let dynamic_opts = ptar::ArchiveOpts {
        engine: CreateEngine::Dynamic,
        ..test_opts()
    };
    let dy = dir.path().join("dynamic.tar");
    create_archive(3, &root, &dy, &dynamic_opts);

    assert_eq!(std::fs::read(&st).unwrap(), std::fs::read(&dy).unwrap());
}

#[test]
fn dynamic_engine_round_trips() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);

    let opts = ptar::ArchiveOpts {
        engine: CreateEngine::Dynamic,
        ..test_opts()
    };
    let archive = dir.path().join("out.tar");
    create_archive(4, &root, &archive, &opts);

    let dest = dir.path().join("dest");
    extract_archive(4, &archive, &dest, &test_opts());
    assert_trees_equal(&root, &dest);
}

#[test]
fn extract_output_identical_across_rank_counts() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);
    let archive = dir.path().join("out.tar");
    create_archive(2, &root, &archive, &test_opts());

    let d1 = dir.path().join("d1");
    extract_archive(1, &archive, &d1, &test_opts());
    for ranks in [2, 5, 8] {
        let dn = dir.path().join(format!("d{ranks}"));
        extract_archive(ranks, &archive, &dn, &test_opts());
        assert_trees_equal(&d1, &dn);
    }
}

#[test]
fn engine_env_override_is_byte_transparent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);

    let plain = dir.path().join("plain.tar");
    create_archive(2, &root, &plain, &test_opts());

    // Both recognized values must yield the same bytes as the default.
    for value in ["LIBCIRCLE", "CHUNK"] {
        std::env::set_var(ptar::opts::CREATE_ENGINE_ENV, value);
        let archive = dir.path().join(format!("{value}.tar"));
        create_archive(2, &root, &archive, &test_opts());
        std::env::remove_var(ptar::opts::CREATE_ENGINE_ENV);
        assert_eq!(
            std::fs::read(&archive).unwrap(),
            std::fs::read(&plain).unwrap(),
            "env value {value} changed the archive bytes"
        );
    }
}

#[test]
fn small_chunk_sizes_do_not_change_bytes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    build_tree(&root);

    let coarse = dir.path().join("coarse.tar");
    let coarse_opts = ptar::ArchiveOpts {
        chunk_size: 1024 * 1024,
        ..test_opts()
    };
    create_archive(2, &root, &coarse, &coarse_opts);

    let fine = dir.path().join("fine.tar");
    let fine_opts = ptar::ArchiveOpts {
        chunk_size: 512,
        buf_size: 100,
        ..test_opts()
    };
    create_archive(2, &root, &fine, &fine_opts);

    assert_eq!(std::fs::read(&coarse).unwrap(), std::fs::read(&fine).unwrap());
}
