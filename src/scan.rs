//! Fallback indexer: scan the archive to recover entry offsets.
//!
//! When no `<archive>.idx` exists, rank 0 walks the archive header by
//! header, recording each entry's byte position, and broadcasts the result.
//! Only plain (uncompressed) pax/ustar archives can be scanned; a parse
//! failure reports `None` so the caller can decide how to proceed.

use std::io::{self, BufReader};
use std::path::Path;
use std::time::Instant;

use crate::codec;
use crate::comm::Comm;
use crate::displayln;

/// Scan `archive` on rank 0 and broadcast the per-entry byte offsets.
/// Returns `Ok(None)` when the archive cannot be parsed as plain tar.
pub fn index_archive(
    comm: &dyn Comm,
    archive: &Path,
    progress_timeout: u64,
) -> io::Result<Option<Vec<u64>>> {
    let mut ok = true;
    let mut offsets: Vec<u64> = Vec::with_capacity(1024);

    if comm.rank() == 0 {
        displayln!(2, "Indexing archive");
        ok = scan_offsets(archive, progress_timeout, &mut offsets).is_ok();
    }

    if !comm.broadcast_bool(0, ok) {
        return Ok(None);
    }
    Ok(Some(comm.broadcast_u64s(0, offsets)))
}

fn scan_offsets(
    archive: &Path,
    progress_timeout: u64,
    offsets: &mut Vec<u64>,
) -> io::Result<()> {
    let file = std::fs::File::open(archive).map_err(|e| {
        displayln!(1, "ptar: failed to open archive '{}': {e}", archive.display());
        e
    })?;
    let filesize = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut reader = BufReader::new(file);

    let started = Instant::now();
    let mut last = started;
    let mut printed = false;
    let mut pos = 0u64;
    loop {
        let header = match codec::read_next_header(&mut reader) {
            Ok(Some(h)) => h,
            Ok(None) => break,
            Err(e) => {
                displayln!(
                    1,
                    "ptar: failed to read entry at offset {pos} in '{}': {e}",
                    archive.display()
                );
                return Err(e);
            }
        };
        offsets.push(pos);
        pos += header.entry_len();
        let padded = header.padded_size();
        if padded > 0 {
            reader.seek_relative(padded as i64)?;
        }

        if progress_timeout > 0
            && filesize > 0
            && last.elapsed().as_secs() >= progress_timeout
        {
            let percent = pos as f64 * 100.0 / filesize as f64;
            let secs = started.elapsed().as_secs_f64();
            let remaining = if percent > 0.0 {
                (100.0 - percent) * secs / percent
            } else {
                0.0
            };
            displayln!(
                3,
                "Indexed {} items in {secs:.3} secs ({percent:.0}%) {remaining:.0} secs left ...",
                offsets.len()
            );
            printed = true;
            last = Instant::now();
        }
    }

    if printed {
        displayln!(
            3,
            "Indexed {} items in {:.3} secs (100%) done",
            offsets.len(),
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SoloComm;
    use crate::flist::{Entry, EntryType};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn file_entry(name: &str, data_len: u64) -> Entry {
        Entry {
            path: PathBuf::from(format!("/src/{name}")),
            etype: EntryType::File,
            size: data_len,
            mode: 0o644,
            uid: 0,
            gid: 0,
            uname: "root".into(),
            gname: "root".into(),
            atime: 1_700_000_000,
            atime_nsec: 0,
            mtime: 1_700_000_000,
            mtime_nsec: 0,
            ctime: 1_700_000_000,
            ctime_nsec: 0,
            target: None,
        }
    }

    fn write_archive(path: &Path, entries: &[(Entry, Vec<u8>)]) -> Vec<u64> {
        let mut file = std::fs::File::create(path).unwrap();
        let mut scratch = vec![0u8; 64 * 1024];
        let mut offsets = Vec::new();
        let mut pos = 0u64;
        for (entry, data) in entries {
            let n = codec::encode_header(
                entry,
                Path::new(entry.path.file_name().unwrap()),
                &mut scratch,
            )
            .unwrap();
            file.write_all(&scratch[..n]).unwrap();
            offsets.push(pos);
            pos += n as u64;
            if !data.is_empty() {
                file.write_all(data).unwrap();
                let padded = codec::pad512(data.len() as u64);
                file.write_all(&vec![0u8; (padded - data.len() as u64) as usize])
                    .unwrap();
                pos += padded;
            }
        }
        file.write_all(&[0u8; 1024]).unwrap();
        offsets
    }

    #[test]
    fn scan_recovers_entry_offsets() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("t.tar");
        let entries = vec![
            (file_entry("a", 13), b"hello world!\n".to_vec()),
            (file_entry("b", 0), Vec::new()),
            (file_entry("c", 600), vec![9u8; 600]),
        ];
        let expected = write_archive(&archive, &entries);

        let comm = SoloComm::new();
        let got = index_archive(&comm, &archive, 0).unwrap().unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn scan_of_garbage_returns_none() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("junk.tar");
        std::fs::write(&archive, vec![0xAAu8; 2048]).unwrap();
        let comm = SoloComm::new();
        crate::display::set_display_level(0);
        assert!(index_archive(&comm, &archive, 0).unwrap().is_none());
    }

    #[test]
    fn scan_of_empty_archive_is_empty() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("empty.tar");
        std::fs::write(&archive, vec![0u8; 1024]).unwrap();
        let comm = SoloComm::new();
        let got = index_archive(&comm, &archive, 0).unwrap().unwrap();
        assert!(got.is_empty());
    }
}
