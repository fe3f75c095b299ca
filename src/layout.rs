//! Offset layout: where every entry lands in the archive.
//!
//! Each rank sizes the headers of its own entries by encoding them to
//! memory, pads file contents to 512, accumulates running local offsets,
//! and then a prefix-sum scan over per-rank totals turns those into global
//! byte offsets. The same arithmetic on every rank is what lets all ranks
//! write concurrently without ever overlapping.

use std::io;
use std::path::Path;

use crate::codec;
use crate::comm::Comm;
use crate::displayln;
use crate::flist::{relative_path, Entry, EntryType};

/// Per-rank result of the layout pass. Vectors are indexed by the rank's
/// local entry index.
pub struct Layout {
    /// Bytes the codec emits for each entry's header.
    pub header_sizes: Vec<u64>,
    /// Header plus padded content per entry.
    pub entry_sizes: Vec<u64>,
    /// Global byte offset of each entry's header.
    pub offsets: Vec<u64>,
    /// Global byte offset of each entry's first data byte.
    pub data_offsets: Vec<u64>,
    /// Sum of entry sizes over all ranks; the trailer is not included.
    pub archive_size: u64,
    /// Padded data bytes over all ranks; the progress denominator.
    pub total_bytes: u64,
    /// Total entries over all ranks.
    pub total_items: u64,
}

/// Compute the layout of this rank's `entries` (a contiguous block of the
/// globally sorted list). `scratch` receives trial header encodings and must
/// be large enough for the worst entry.
pub fn compute_layout(
    comm: &dyn Comm,
    entries: &[Entry],
    cwd: &Path,
    scratch: &mut [u8],
) -> io::Result<Layout> {
    let mut header_sizes = vec![0u64; entries.len()];
    let mut entry_sizes = vec![0u64; entries.len()];
    let mut offsets = vec![0u64; entries.len()];

    let mut err = false;
    let mut local_total = 0u64;
    let mut data_bytes = 0u64;
    for (idx, entry) in entries.iter().enumerate() {
        match entry.etype {
            EntryType::Dir | EntryType::Symlink | EntryType::File => {
                let relname = relative_path(&entry.path, cwd);
                match codec::encode_header(entry, &relname, scratch) {
                    Ok(n) => {
                        header_sizes[idx] = n as u64;
                        entry_sizes[idx] = n as u64;
                        if entry.etype == EntryType::File {
                            let padded = codec::pad512(entry.size);
                            entry_sizes[idx] += padded;
                            data_bytes += padded;
                        }
                    }
                    Err(e) => {
                        displayln!(
                            1,
                            "ptar: failed to encode header for '{}': {e}",
                            entry.path.display()
                        );
                        err = true;
                    }
                }
            }
            EntryType::Other => {
                displayln!(
                    2,
                    "ptar: unsupported type, cannot archive '{}'",
                    entry.path.display()
                );
            }
        }
        offsets[idx] = local_total;
        local_total += entry_sizes[idx];
    }

    let total_items = comm.allreduce_sum(entries.len() as u64);
    let total_bytes = comm.allreduce_sum(data_bytes);
    let archive_size = comm.allreduce_sum(local_total);
    let base = comm.scan_sum(local_total) - local_total;
    for off in &mut offsets {
        *off += base;
    }
    let data_offsets: Vec<u64> = offsets
        .iter()
        .zip(header_sizes.iter())
        .map(|(o, h)| o + h)
        .collect();

    if !comm.alltrue(!err) {
        return Err(io::Error::other("failed to encode entry headers"));
    }

    Ok(Layout {
        header_sizes,
        entry_sizes,
        offsets,
        data_offsets,
        archive_size,
        total_bytes,
        total_items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{block_partition, SoloComm, ThreadComm};
    use crate::flist;
    use std::fs;
    use tempfile::TempDir;

    fn make_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), b"hello world!\n").unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();
        dir
    }

    #[test]
    fn offsets_are_block_aligned_and_cumulative() {
        let dir = make_tree();
        let entries = flist::walk(&[dir.path().to_path_buf()]).unwrap();
        let comm = SoloComm::new();
        let mut scratch = vec![0u8; 64 * 1024];
        let layout = compute_layout(&comm, &entries, dir.path(), &mut scratch).unwrap();

        assert_eq!(layout.total_items, 3); // root dir, a, b
        let mut expected = 0;
        for i in 0..entries.len() {
            assert_eq!(layout.offsets[i], expected);
            assert_eq!(layout.offsets[i] % 512, 0);
            assert_eq!(layout.entry_sizes[i] % 512, 0);
            assert_eq!(
                layout.data_offsets[i],
                layout.offsets[i] + layout.header_sizes[i]
            );
            expected += layout.entry_sizes[i];
        }
        assert_eq!(layout.archive_size, expected);
    }

    #[test]
    fn file_content_padding_counted() {
        let dir = make_tree();
        let entries = flist::walk(&[dir.path().to_path_buf()]).unwrap();
        let comm = SoloComm::new();
        let mut scratch = vec![0u8; 64 * 1024];
        let layout = compute_layout(&comm, &entries, dir.path(), &mut scratch).unwrap();

        // "a" is 13 bytes → 512 padded; "b" is empty → 0.
        let a = entries.iter().position(|e| e.path.ends_with("a")).unwrap();
        let b = entries.iter().position(|e| e.path.ends_with("b")).unwrap();
        assert_eq!(layout.entry_sizes[a], layout.header_sizes[a] + 512);
        assert_eq!(layout.entry_sizes[b], layout.header_sizes[b]);
        assert_eq!(layout.total_bytes, 512);
    }

    #[test]
    fn multi_rank_layout_matches_single_rank() {
        let dir = make_tree();
        fs::write(dir.path().join("c"), vec![7u8; 1024]).unwrap();
        let entries = flist::walk(&[dir.path().to_path_buf()]).unwrap();

        let solo = SoloComm::new();
        let mut scratch = vec![0u8; 64 * 1024];
        let single = compute_layout(&solo, &entries, dir.path(), &mut scratch).unwrap();

        let cwd = dir.path().to_path_buf();
        let all = ThreadComm::run(3, |comm| {
            let (start, count) =
                block_partition(entries.len() as u64, comm.size(), comm.rank());
            let mine = &entries[start as usize..(start + count) as usize];
            let mut scratch = vec![0u8; 64 * 1024];
            let layout = compute_layout(comm, mine, &cwd, &mut scratch).unwrap();
            (start as usize, layout)
        });

        for (start, layout) in &all {
            assert_eq!(layout.archive_size, single.archive_size);
            assert_eq!(layout.total_bytes, single.total_bytes);
            for (i, off) in layout.offsets.iter().enumerate() {
                assert_eq!(*off, single.offsets[start + i]);
            }
        }
    }

    #[test]
    fn empty_list_layout() {
        let comm = SoloComm::new();
        let mut scratch = vec![0u8; 4096];
        let layout =
            compute_layout(&comm, &[], Path::new("/tmp"), &mut scratch).unwrap();
        assert_eq!(layout.archive_size, 0);
        assert_eq!(layout.total_items, 0);
        assert_eq!(layout.total_bytes, 0);
    }
}
