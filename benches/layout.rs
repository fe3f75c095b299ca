//! Criterion bench: layout planning throughput.
//!
//! Header encoding dominates the layout pass, so this measures entries/sec
//! through `compute_layout` over a synthetic list. Run with
//! `cargo bench --bench layout`.

use std::path::{Path, PathBuf};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ptar::comm::SoloComm;
use ptar::flist::{Entry, EntryType};
use ptar::layout::compute_layout;

fn synthetic_entries(count: usize) -> Vec<Entry> {
    (0..count)
        .map(|i| Entry {
            path: PathBuf::from(format!("/data/project/dir{:02}/file{i:06}.bin", i % 37)),
            etype: if i % 11 == 0 {
                EntryType::Dir
            } else {
                EntryType::File
            },
            size: (i as u64 % 1000) * 731,
            mode: 0o644,
            uid: 1000,
            gid: 1000,
            uname: "bench".into(),
            gname: "bench".into(),
            atime: 1_700_000_000 + i as i64,
            atime_nsec: 42,
            mtime: 1_700_000_000 + i as i64,
            mtime_nsec: 43,
            ctime: 1_700_000_000 + i as i64,
            ctime_nsec: 44,
            target: None,
        })
        .collect()
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    for count in [100usize, 1000, 10_000] {
        let entries = synthetic_entries(count);
        let comm = SoloComm::new();
        let mut scratch = vec![0u8; 64 * 1024];
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &entries, |b, entries| {
            b.iter(|| compute_layout(&comm, entries, Path::new("/data"), &mut scratch).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_layout);
criterion_main!(benches);
