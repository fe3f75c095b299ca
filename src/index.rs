//! Sidecar entry index: `<archive>.idx`.
//!
//! The index is an array of big-endian u64 byte offsets, one per entry, in
//! entry order. It is advisory: extraction works without it (the scanner
//! rebuilds the offsets), but when present it must match the archive.
//! Counts and displacements are 64-bit throughout, so entry counts are
//! bounded only by the format itself.

use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::comm::Comm;
use crate::displayln;

/// Index file permissions.
const INDEX_MODE: u32 = 0o660;

/// Path of the index belonging to `archive`.
pub fn index_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".idx");
    PathBuf::from(name)
}

/// Gather every rank's entry offsets (each rank passes its contiguous block,
/// in rank order) and have rank 0 write the index file.
pub fn write_index(comm: &dyn Comm, archive: &Path, offsets: &[u64]) -> io::Result<()> {
    let path = index_path(archive);
    if comm.rank() == 0 {
        displayln!(3, "Writing index to {}", path.display());
    }

    let all = comm.allgatherv_u64(offsets);

    let mut ok = true;
    if comm.rank() == 0 {
        let mut packed = Vec::with_capacity(all.len() * 8);
        for off in &all {
            packed.extend_from_slice(&off.to_be_bytes());
        }
        let result = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(INDEX_MODE)
            .open(&path)
            .and_then(|mut f| f.write_all(&packed));
        if let Err(e) = result {
            displayln!(1, "ptar: failed to write index '{}': {e}", path.display());
            ok = false;
        }
    }

    if !comm.alltrue(ok) {
        return Err(io::Error::other(format!(
            "failed to write index '{}'",
            path.display()
        )));
    }
    Ok(())
}

/// Try to read the index belonging to `archive`.
///
/// Returns `Ok(None)` when no index file exists — the caller falls back to
/// scanning. A present-but-damaged index (length not a multiple of 8, or a
/// short read) is an `InvalidData` error on every rank.
pub fn read_index(comm: &dyn Comm, archive: &Path) -> io::Result<Option<Vec<u64>>> {
    let path = index_path(archive);

    // 0 = absent, 1 = readable, 2 = damaged
    let mut state = 0u64;
    let mut offsets = Vec::new();
    if comm.rank() == 0 {
        match std::fs::metadata(&path) {
            Ok(meta) => {
                let size = meta.len();
                if size % 8 != 0 {
                    displayln!(
                        1,
                        "ptar: index '{}' has invalid size {size}",
                        path.display()
                    );
                    state = 2;
                } else {
                    match read_offsets(&path, size) {
                        Ok(offs) => {
                            offsets = offs;
                            state = 1;
                        }
                        Err(e) => {
                            displayln!(
                                1,
                                "ptar: failed to read index '{}': {e}",
                                path.display()
                            );
                            state = 2;
                        }
                    }
                }
            }
            // Likely created by another tool without an index; not an error.
            Err(_) => state = 0,
        }
    }

    match comm.broadcast_u64(0, state) {
        0 => Ok(None),
        1 => {
            if comm.rank() == 0 {
                displayln!(3, "Read index {}", path.display());
            }
            Ok(Some(comm.broadcast_u64s(0, offsets)))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("index '{}' is damaged", path.display()),
        )),
    }
}

fn read_offsets(path: &Path, size: u64) -> io::Result<Vec<u64>> {
    let mut bytes = Vec::with_capacity(size as usize);
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() as u64 != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "short read",
        ));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| u64::from_be_bytes(c.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{block_partition, SoloComm, ThreadComm};
    use tempfile::TempDir;

    #[test]
    fn index_path_appends_suffix() {
        assert_eq!(
            index_path(Path::new("/x/out.tar")),
            PathBuf::from("/x/out.tar.idx")
        );
    }

    #[test]
    fn write_read_round_trip_solo() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.tar");
        let comm = SoloComm::new();
        let offsets = vec![0u64, 1024, 4096, 123_456_789_000];
        write_index(&comm, &archive, &offsets).unwrap();

        let back = read_index(&comm, &archive).unwrap().unwrap();
        assert_eq!(back, offsets);
    }

    #[test]
    fn on_disk_format_is_big_endian() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.tar");
        let comm = SoloComm::new();
        write_index(&comm, &archive, &[0x0102030405060708]).unwrap();
        let bytes = std::fs::read(index_path(&archive)).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn missing_index_is_none() {
        let dir = TempDir::new().unwrap();
        let comm = SoloComm::new();
        let res = read_index(&comm, &dir.path().join("none.tar")).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn unaligned_index_is_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.tar");
        std::fs::write(index_path(&archive), vec![0u8; 12]).unwrap();
        let comm = SoloComm::new();
        let err = read_index(&comm, &archive).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn multi_rank_gather_preserves_entry_order() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.tar");
        let archive2 = archive.clone();

        // 7 offsets split over 3 ranks as contiguous blocks.
        let offsets: Vec<u64> = (0..7).map(|i| i * 512).collect();
        let offs = offsets.clone();
        ThreadComm::run(3, move |comm| {
            let (start, count) = block_partition(7, comm.size(), comm.rank());
            let mine = &offs[start as usize..(start + count) as usize];
            write_index(comm, &archive2, mine).unwrap();
            let back = read_index(comm, &archive2).unwrap().unwrap();
            assert_eq!(back, offs);
        });
    }
}
