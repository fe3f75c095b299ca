//! Data-copy engines.
//!
//! Both engines move file bytes between user files and pre-assigned archive
//! regions in `chunk_size` units, reading and writing through a caller
//! buffer of `buf_size` bytes:
//!
//! - the *static* engine walks every file entry in global order, emits one
//!   chunk per `chunk_size` bytes, and round-robins chunks across ranks by
//!   chunk index — deterministic distribution, no coordination;
//! - the *dynamic* engine turns the same chunks into typed [`CopyTask`]s in
//!   the group's shared work pool, so whichever rank is free next executes
//!   the next task — better under file-size skew.
//!
//! Writes are pairwise disjoint by construction; only the phase barrier in
//! the caller establishes cross-rank visibility.

use std::fs::File;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::comm::{Comm, CopyTask, WorkPool};
use crate::displayln;
use crate::flist::Entry;
use crate::progress::Progress;

use super::writer::ArchiveWriter;

/// One fixed-size slice of one user file, bound to its archive data region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChunk {
    /// The user file (source on create, destination on extract).
    pub path: PathBuf,
    /// Offset of this chunk within the user file.
    pub offset: u64,
    /// Bytes in this chunk; 0 only for zero-byte files.
    pub length: u64,
    /// Archive offset of the file's first data byte.
    pub archive_offset: u64,
}

/// Number of chunks a file of `size` bytes occupies; zero-byte files still
/// occupy one.
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size).max(1)
}

/// Build this rank's share of the global chunk list.
///
/// Each rank contributes its local file entries (paths, sizes, and archive
/// data offsets); the gathered sequence is walked identically everywhere,
/// and chunk `k` belongs to rank `k % R`.
pub fn chunk_list(
    comm: &dyn Comm,
    entries: &[Entry],
    data_offsets: &[u64],
    chunk_size: u64,
) -> io::Result<Vec<FileChunk>> {
    // Encode (path, size, data_offset) for every local regular file.
    let mut local = Vec::new();
    for (entry, doff) in entries.iter().zip(data_offsets.iter()) {
        if !entry.is_file() {
            continue;
        }
        let path = entry.path.as_os_str().as_bytes();
        local.extend_from_slice(&(path.len() as u32).to_le_bytes());
        local.extend_from_slice(path);
        local.extend_from_slice(&entry.size.to_le_bytes());
        local.extend_from_slice(&doff.to_le_bytes());
    }

    let gathered = comm.allgatherv_bytes(&local);

    let rank = comm.rank() as u64;
    let ranks = comm.size() as u64;
    let mut chunks = Vec::new();
    let mut next_chunk = 0u64;
    for blob in &gathered {
        let mut pos = 0usize;
        while pos < blob.len() {
            let (path, size, doff) = decode_file_record(blob, &mut pos)?;
            for k in 0..chunk_count(size, chunk_size) {
                if next_chunk % ranks == rank {
                    let offset = k * chunk_size;
                    chunks.push(FileChunk {
                        path: path.clone(),
                        offset,
                        length: (size - offset).min(chunk_size),
                        archive_offset: doff,
                    });
                }
                next_chunk += 1;
            }
        }
    }
    Ok(chunks)
}

fn decode_file_record(blob: &[u8], pos: &mut usize) -> io::Result<(PathBuf, u64, u64)> {
    use std::ffi::OsStr;
    let bad = || io::Error::new(io::ErrorKind::InvalidData, "truncated chunk record");
    let need = |pos: usize, n: usize| {
        if pos + n > blob.len() {
            Err(bad())
        } else {
            Ok(())
        }
    };
    need(*pos, 4)?;
    let len = u32::from_le_bytes(blob[*pos..*pos + 4].try_into().unwrap()) as usize;
    *pos += 4;
    need(*pos, len + 16)?;
    let path = PathBuf::from(OsStr::from_bytes(&blob[*pos..*pos + len]));
    *pos += len;
    let size = u64::from_le_bytes(blob[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    let doff = u64::from_le_bytes(blob[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    Ok((path, size, doff))
}

// ─── Static engine: create ───────────────────────────────────────────────────

/// Copy this rank's chunks from their source files into the archive.
/// Returns false if any chunk failed; the padding bytes between a file's
/// end and the next 512 boundary stay zero from preallocation.
pub fn archive_chunks(
    writer: &ArchiveWriter,
    chunks: &[FileChunk],
    buf: &mut [u8],
    progress: &mut Progress<'_>,
) -> bool {
    for chunk in chunks {
        let src = match File::open(&chunk.path) {
            Ok(f) => f,
            Err(e) => {
                displayln!(
                    1,
                    "ptar: failed to open source file '{}': {e}",
                    chunk.path.display()
                );
                return false;
            }
        };
        let mut copied = 0u64;
        while copied < chunk.length {
            let step = (buf.len() as u64).min(chunk.length - copied) as usize;
            let read_pos = chunk.offset + copied;
            if let Err(e) = src.read_exact_at(&mut buf[..step], read_pos) {
                displayln!(
                    1,
                    "ptar: failed to read source file '{}' at offset {read_pos}: {e}",
                    chunk.path.display()
                );
                return false;
            }
            if let Err(e) = writer.write_at(&buf[..step], chunk.archive_offset + read_pos) {
                displayln!(1, "ptar: {e}");
                return false;
            }
            copied += step as u64;
            progress.update(step as u64, 0);
        }
    }
    true
}

// ─── Static engine: extract ──────────────────────────────────────────────────

/// Copy this rank's chunks out of the archive into their pre-created
/// destination files.
pub fn extract_chunks(
    archive: &File,
    archive_path: &Path,
    chunks: &[FileChunk],
    buf: &mut [u8],
    progress: &mut Progress<'_>,
) -> bool {
    for chunk in chunks {
        let dst = match std::fs::OpenOptions::new().write(true).open(&chunk.path) {
            Ok(f) => f,
            Err(e) => {
                displayln!(
                    1,
                    "ptar: failed to open destination file '{}': {e}",
                    chunk.path.display()
                );
                return false;
            }
        };
        let mut copied = 0u64;
        while copied < chunk.length {
            let step = (buf.len() as u64).min(chunk.length - copied) as usize;
            let read_pos = chunk.archive_offset + chunk.offset + copied;
            if let Err(e) = archive.read_exact_at(&mut buf[..step], read_pos) {
                displayln!(
                    1,
                    "ptar: failed to read archive '{}' at offset {read_pos}: {e}",
                    archive_path.display()
                );
                return false;
            }
            if let Err(e) = dst.write_all_at(&buf[..step], chunk.offset + copied) {
                displayln!(
                    1,
                    "ptar: failed to write to destination file '{}': {e}",
                    chunk.path.display()
                );
                return false;
            }
            copied += step as u64;
            progress.update(step as u64, 0);
        }
    }
    true
}

// ─── Dynamic engine ──────────────────────────────────────────────────────────

/// Enqueue one [`CopyTask`] per chunk of every local regular file.
pub fn enqueue_file_tasks(
    pool: &mut dyn WorkPool,
    entries: &[Entry],
    data_offsets: &[u64],
    chunk_size: u64,
) {
    for (entry, doff) in entries.iter().zip(data_offsets.iter()) {
        if !entry.is_file() {
            continue;
        }
        for chunk_index in 0..chunk_count(entry.size, chunk_size) {
            pool.enqueue(CopyTask {
                path: entry.path.clone(),
                file_size: entry.size,
                chunk_index,
                data_offset: *doff,
            });
        }
    }
}

/// One-slot descriptor cache: consecutive chunks of the same file reuse the
/// open descriptor instead of paying open/close per chunk.
struct SrcCache {
    slot: Option<(PathBuf, File)>,
}

impl SrcCache {
    fn open(&mut self, path: &Path) -> io::Result<&File> {
        let hit = matches!(&self.slot, Some((p, _)) if p == path);
        if !hit {
            self.slot = Some((path.to_path_buf(), File::open(path)?));
        }
        Ok(&self.slot.as_ref().unwrap().1)
    }
}

/// Drain the sealed work pool, executing every task this rank manages to
/// steal. Per-task failures are logged and flagged but the pool keeps
/// draining, so one bad file does not strand tasks. Returns false if any
/// task failed.
pub fn drain_tasks(
    pool: &mut dyn WorkPool,
    writer: &ArchiveWriter,
    chunk_size: u64,
    buf: &mut [u8],
    progress: &mut Progress<'_>,
) -> bool {
    let mut ok = true;
    let mut cache = SrcCache { slot: None };
    while let Some(task) = pool.dequeue() {
        if !run_task(&task, &mut cache, writer, chunk_size, buf, progress) {
            ok = false;
        }
    }
    ok
}

fn run_task(
    task: &CopyTask,
    cache: &mut SrcCache,
    writer: &ArchiveWriter,
    chunk_size: u64,
    buf: &mut [u8],
    progress: &mut Progress<'_>,
) -> bool {
    let src = match cache.open(&task.path) {
        Ok(f) => f,
        Err(e) => {
            displayln!(
                1,
                "ptar: failed to open source file '{}': {e}",
                task.path.display()
            );
            return false;
        }
    };

    let in_offset = task.chunk_index * chunk_size;
    let length = (task.file_size - in_offset).min(chunk_size);
    let mut copied = 0u64;
    while copied < length {
        let step = (buf.len() as u64).min(length - copied) as usize;
        let read_pos = in_offset + copied;
        if let Err(e) = src.read_exact_at(&mut buf[..step], read_pos) {
            displayln!(
                1,
                "ptar: failed to read all bytes of '{}': {e}",
                task.path.display()
            );
            return false;
        }
        if let Err(e) = writer.write_at(&buf[..step], task.data_offset + read_pos) {
            displayln!(1, "ptar: {e}");
            return false;
        }
        copied += step as u64;
        progress.update(step as u64, 0);
    }

    // The rank that finishes the file also writes its 512-alignment padding.
    let last_chunk = chunk_count(task.file_size, chunk_size) - 1;
    if task.chunk_index == last_chunk {
        let pad = (512 - (task.file_size % 512)) % 512;
        if pad > 0 {
            let zeros = [0u8; 512];
            if let Err(e) = writer.write_at(&zeros[..pad as usize], task.data_offset + task.file_size)
            {
                displayln!(1, "ptar: {e}");
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SoloComm, ThreadComm};
    use crate::flist::{Entry, EntryType};
    use tempfile::TempDir;

    fn file_entry(path: &Path, size: u64) -> Entry {
        Entry {
            path: path.to_path_buf(),
            etype: EntryType::File,
            size,
            mode: 0o644,
            uid: 0,
            gid: 0,
            uname: String::new(),
            gname: String::new(),
            atime: 0,
            atime_nsec: 0,
            mtime: 0,
            mtime_nsec: 0,
            ctime: 0,
            ctime_nsec: 0,
            target: None,
        }
    }

    #[test]
    fn chunk_count_minimum_is_one() {
        assert_eq!(chunk_count(0, 1024), 1);
        assert_eq!(chunk_count(1, 1024), 1);
        assert_eq!(chunk_count(1024, 1024), 1);
        assert_eq!(chunk_count(1025, 1024), 2);
        assert_eq!(chunk_count(5000, 1024), 5);
    }

    #[test]
    fn solo_chunk_list_covers_every_byte() {
        let comm = SoloComm::new();
        let entries = vec![
            file_entry(Path::new("/a"), 2500),
            file_entry(Path::new("/b"), 0),
            file_entry(Path::new("/c"), 1024),
        ];
        let doffs = vec![100, 5000, 6000];
        let chunks = chunk_list(&comm, &entries, &doffs, 1024).unwrap();
        // /a: 3 chunks (1024, 1024, 452); /b: 1 zero chunk; /c: 1 chunk
        assert_eq!(chunks.len(), 5);
        let a: Vec<&FileChunk> = chunks.iter().filter(|c| c.path == Path::new("/a")).collect();
        assert_eq!(a.iter().map(|c| c.length).sum::<u64>(), 2500);
        assert_eq!(a[2].length, 452);
        let b = chunks.iter().find(|c| c.path == Path::new("/b")).unwrap();
        assert_eq!(b.length, 0);
        assert_eq!(b.archive_offset, 5000);
    }

    #[test]
    fn multi_rank_chunks_partition_round_robin() {
        let results = ThreadComm::run(3, |comm| {
            // rank r owns one file of 3000 bytes at data offset 1000*r
            let path = PathBuf::from(format!("/file{}", comm.rank()));
            let entries = vec![file_entry(&path, 3000)];
            let doffs = vec![1000 * comm.rank() as u64];
            chunk_list(comm, &entries, &doffs, 1024).unwrap()
        });
        // 3 files x 3 chunks = 9 chunks, each rank gets 3
        let mut all: Vec<FileChunk> = Vec::new();
        for r in &results {
            assert_eq!(r.len(), 3);
            all.extend(r.iter().cloned());
        }
        // every (file, chunk offset) pair appears exactly once
        all.sort_by(|x, y| (&x.path, x.offset).cmp(&(&y.path, y.offset)));
        for f in 0..3 {
            for k in 0..3u64 {
                let want_path = PathBuf::from(format!("/file{f}"));
                assert!(all
                    .iter()
                    .any(|c| c.path == want_path && c.offset == k * 1024));
            }
        }
    }

    #[test]
    fn dynamic_engine_pads_last_chunk() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        std::fs::write(&src, vec![0xABu8; 700]).unwrap();
        let archive = dir.path().join("out.tar");
        let writer = ArchiveWriter::create(&archive).unwrap();
        writer.preallocate(2048).unwrap();
        // dirty the padding region to prove the engine rewrites it
        writer.write_at(&[0xFFu8; 1024], 512).unwrap();

        let comm = SoloComm::new();
        let entries = vec![file_entry(&src, 700)];
        let doffs = vec![512u64];
        let mut pool = comm.work_pool();
        enqueue_file_tasks(&mut *pool, &entries, &doffs, 512);
        pool.seal();
        let mut buf = vec![0u8; 256];
        let mut progress = Progress::start(&comm, "Tarred", false, 700, 0);
        assert!(drain_tasks(&mut *pool, &writer, 512, &mut buf, &mut progress));
        progress.complete();
        drop(writer);

        let bytes = std::fs::read(&archive).unwrap();
        assert!(bytes[512..1212].iter().all(|&b| b == 0xAB));
        // padding out to the 512 boundary was explicitly zeroed
        assert!(bytes[1212..1536].iter().all(|&b| b == 0));
    }

    #[test]
    fn static_engine_round_trips_bytes() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &payload).unwrap();

        let archive = dir.path().join("out.tar");
        let writer = ArchiveWriter::create(&archive).unwrap();
        writer.preallocate(4096).unwrap();

        let comm = SoloComm::new();
        let entries = vec![file_entry(&src, 3000)];
        let chunks = chunk_list(&comm, &entries, &[512], 1024).unwrap();
        let mut buf = vec![0u8; 300];
        let mut progress = Progress::start(&comm, "Tarred", false, 3000, 0);
        assert!(archive_chunks(&writer, &chunks, &mut buf, &mut progress));
        progress.complete();
        drop(writer);

        let bytes = std::fs::read(&archive).unwrap();
        assert_eq!(&bytes[512..3512], &payload[..]);

        // now extract the same region back out through the extract engine
        let dst = dir.path().join("back.bin");
        std::fs::write(&dst, vec![0u8; 3000]).unwrap();
        let out_entries = vec![file_entry(&dst, 3000)];
        let out_chunks = chunk_list(&comm, &out_entries, &[512], 1024).unwrap();
        let f = File::open(&archive).unwrap();
        let mut progress = Progress::start(&comm, "Extracted", false, 3000, 0);
        assert!(extract_chunks(
            &f,
            &archive,
            &out_chunks,
            &mut buf,
            &mut progress
        ));
        progress.complete();
        assert_eq!(std::fs::read(&dst).unwrap(), payload);
    }
}
