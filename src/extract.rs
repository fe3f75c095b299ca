//! Parallel extraction.
//!
//! Offsets come from the sidecar index when present, from a leader-side
//! scan otherwise; with offsets in hand every rank seeks straight to its
//! contiguous block of entries. Without offsets (unreadable index paths)
//! each rank streams the archive from the start and takes entries
//! round-robin.
//!
//! Work proceeds in phases separated by group collectives: directories
//! first (children must find their parents), then file data, then
//! symlinks, then timestamps and permissions — directories last, because
//! writing children disturbs parent mtimes.

use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Instant;

use filetime::FileTime;

use crate::archive::engine;
use crate::codec;
use crate::comm::{block_partition, Comm};
use crate::display::{format_bw, format_bytes};
use crate::displayln;
use crate::flist::{Entry, EntryType};
use crate::index;
use crate::opts::{ArchiveOpts, ExtractMode};
use crate::progress::Progress;
use crate::scan;

/// Extract `archive` into `cwd`.
pub fn archive_extract(
    comm: &dyn Comm,
    archive: &Path,
    cwd: &Path,
    opts: &ArchiveOpts,
) -> io::Result<()> {
    opts.validate()?;
    let started = Instant::now();
    if comm.rank() == 0 {
        displayln!(2, "Extracting {}", archive.display());
    }

    // Offsets: index file first, scan fallback second.
    let mut have_index = false;
    let offsets = match index::read_index(comm, archive)? {
        Some(offs) => {
            verify_index(comm, archive, &offs)?;
            have_index = true;
            Some(offs)
        }
        None => scan::index_archive(comm, archive, opts.progress_timeout)?,
    };

    let mut items = 0u64;
    let mut bytes = 0u64;
    let result = match &offsets {
        Some(offs) => extract_with_offsets(
            comm, archive, cwd, opts, offs, have_index, &mut items, &mut bytes,
        ),
        None => extract_by_scan(comm, archive, cwd, opts, &mut items, &mut bytes),
    };

    let agg_items = comm.allreduce_sum(items);
    let agg_bytes = comm.allreduce_sum(bytes);
    if comm.rank() == 0 {
        let secs = started.elapsed().as_secs_f64();
        let (bv, bu) = format_bytes(agg_bytes);
        let (rv, ru) = format_bw(agg_bytes as f64 / secs.max(1e-9));
        displayln!(2, "Seconds: {secs:.3}");
        displayln!(2, "Items: {agg_items}");
        displayln!(2, "Data: {bv:.3} {bu} ({agg_bytes} bytes)");
        displayln!(2, "Rate: {rv:.3} {ru} ({agg_bytes} bytes in {secs:.3} seconds)");
    }
    result
}

/// Uniform phase exit: every rank reports, every rank agrees on the result.
fn phase_done(comm: &dyn Comm, ok: bool, what: &str) -> io::Result<()> {
    if comm.alltrue(ok) {
        Ok(())
    } else {
        Err(io::Error::other(format!("failed to {what}")))
    }
}

// ─── Index verification ──────────────────────────────────────────────────────

/// A present index is authoritative, so a stale or truncated one must fail
/// loudly rather than silently extract a subset: after the last indexed
/// entry the archive must terminate.
fn verify_index(comm: &dyn Comm, archive: &Path, offsets: &[u64]) -> io::Result<()> {
    let mut ok = true;
    if comm.rank() == 0 {
        ok = index_matches_tail(archive, offsets).unwrap_or(false);
        if !ok {
            displayln!(
                1,
                "ptar: index '{}' does not match archive contents",
                index::index_path(archive).display()
            );
        }
    }
    if !comm.broadcast_bool(0, ok) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "index '{}' does not match archive contents",
                index::index_path(archive).display()
            ),
        ));
    }
    Ok(())
}

fn index_matches_tail(archive: &Path, offsets: &[u64]) -> io::Result<bool> {
    let file = File::open(archive)?;
    let end = match offsets.last() {
        Some(&last) => {
            let mut f = &file;
            f.seek(SeekFrom::Start(last))?;
            match codec::read_next_header(&mut BufReader::new(f))? {
                Some(h) => last + h.entry_len(),
                None => return Ok(false),
            }
        }
        None => 0,
    };
    let mut f = &file;
    f.seek(SeekFrom::Start(end))?;
    Ok(codec::read_next_header(&mut BufReader::new(f))?.is_none())
}

// ─── Offset-driven extraction ────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn extract_with_offsets(
    comm: &dyn Comm,
    archive: &Path,
    cwd: &Path,
    opts: &ArchiveOpts,
    offsets: &[u64],
    have_index: bool,
    items: &mut u64,
    bytes: &mut u64,
) -> io::Result<()> {
    let (start, count) = block_partition(offsets.len() as u64, comm.size(), comm.rank());

    if comm.rank() == 0 {
        displayln!(2, "Extracting metadata");
    }
    let (flist, doffsets) = build_flist_indexed(comm, archive, cwd, offsets, start, count)?;

    let local_bytes: u64 = flist.iter().filter(|e| e.is_file()).map(|e| e.size).sum();
    let total_bytes = comm.allreduce_sum(local_bytes);

    create_directories(comm, &flist)?;

    match opts.extract_mode {
        ExtractMode::Codec => {
            extract_entries_codec(
                comm, archive, opts, offsets, start, &flist, total_bytes, items, bytes,
            )?;
            apply_dir_metadata(comm, &flist)?;
        }
        ExtractMode::Direct => {
            create_files(comm, &flist, items)?;
            extract_data_chunks(comm, archive, opts, &flist, &doffsets, total_bytes, bytes)?;
            extract_symlinks(comm, archive, offsets, start, &flist, items)?;
            apply_metadata(comm, &flist)?;
        }
    }

    // A successful scan is worth saving for the next extraction.
    if !have_index {
        let mine = &offsets[start as usize..(start + count) as usize];
        if index::write_index(comm, archive, mine).is_err() {
            displayln!(2, "ptar: failed to save index");
        }
    }
    Ok(())
}

/// Seek to each owned entry, read its header, and record both the list
/// entry and the offset where its data begins.
fn build_flist_indexed(
    comm: &dyn Comm,
    archive: &Path,
    cwd: &Path,
    offsets: &[u64],
    start: u64,
    count: u64,
) -> io::Result<(Vec<Entry>, Vec<u64>)> {
    let mut ok = true;
    let mut flist = Vec::with_capacity(count as usize);
    let mut doffsets = Vec::with_capacity(count as usize);

    let file = match File::open(archive) {
        Ok(f) => Some(f),
        Err(e) => {
            displayln!(1, "ptar: failed to open archive '{}': {e}", archive.display());
            ok = false;
            None
        }
    };
    if let Some(file) = &file {
        for i in 0..count {
            let idx = (start + i) as usize;
            let off = offsets[idx];
            let mut f = file;
            if let Err(e) = f.seek(SeekFrom::Start(off)) {
                displayln!(1, "ptar: failed to seek to offset {off}: {e}");
                ok = false;
                break;
            }
            // One-shot reader per entry so no parse state leaks between
            // non-adjacent entries.
            match codec::read_next_header(&mut BufReader::new(f)) {
                Ok(Some(h)) => {
                    doffsets.push(off + h.header_len);
                    flist.push(h.to_entry(cwd));
                }
                Ok(None) => {
                    displayln!(
                        1,
                        "ptar: unexpected end of archive, read {i} of {count} entries"
                    );
                    ok = false;
                    break;
                }
                Err(e) => {
                    displayln!(
                        1,
                        "ptar: failed to read entry {idx} at offset {off} in '{}': {e}",
                        archive.display()
                    );
                    ok = false;
                    break;
                }
            }
        }
    }
    phase_done(comm, ok, "extract metadata")?;
    Ok((flist, doffsets))
}

/// Codec-mediated extraction: seek to each owned entry and let the codec
/// write it (header and data) to disk.
#[allow(clippy::too_many_arguments)]
fn extract_entries_codec(
    comm: &dyn Comm,
    archive: &Path,
    opts: &ArchiveOpts,
    offsets: &[u64],
    start: u64,
    flist: &[Entry],
    total_bytes: u64,
    items: &mut u64,
    bytes: &mut u64,
) -> io::Result<()> {
    if comm.rank() == 0 {
        displayln!(2, "Extracting items");
    }
    let mut ok = true;
    let file = match File::open(archive) {
        Ok(f) => Some(f),
        Err(e) => {
            displayln!(1, "ptar: failed to open archive '{}': {e}", archive.display());
            ok = false;
            None
        }
    };

    let mut buf = vec![0u8; opts.buf_size];
    let mut progress = Progress::start(comm, "Extracted", true, total_bytes, opts.progress_timeout);
    if let Some(file) = &file {
        for (i, entry) in flist.iter().enumerate() {
            let off = offsets[(start + i as u64) as usize];
            let mut f = file;
            if let Err(e) = f.seek(SeekFrom::Start(off)) {
                displayln!(1, "ptar: failed to seek to offset {off}: {e}");
                ok = false;
                break;
            }
            let mut reader = BufReader::new(f);
            match codec::read_next_header(&mut reader) {
                Ok(Some(h)) => {
                    if h.etype == EntryType::Other {
                        displayln!(2, "ptar: unsupported type, skipping '{}'", h.name);
                        continue;
                    }
                    match codec::write_entry_to_disk(&h, &mut reader, &entry.path, &mut buf) {
                        Ok(n) => {
                            *bytes += n;
                            *items += 1;
                            progress.update(n, 1);
                        }
                        Err(e) => {
                            displayln!(1, "ptar: failed to extract '{}': {e}", h.name);
                            ok = false;
                            break;
                        }
                    }
                }
                Ok(None) | Err(_) => {
                    displayln!(1, "ptar: failed to read entry at offset {off}");
                    ok = false;
                    break;
                }
            }
        }
    }
    comm.barrier();
    progress.complete();
    phase_done(comm, ok, "extract items")
}

/// Pre-create every owned regular file (empty, writable) so that the data
/// phase can open them from any rank.
fn create_files(comm: &dyn Comm, flist: &[Entry], items: &mut u64) -> io::Result<()> {
    if comm.rank() == 0 {
        displayln!(2, "Creating files");
    }
    let mut ok = true;
    for entry in flist.iter().filter(|e| e.is_file()) {
        if let Some(parent) = entry.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                displayln!(1, "ptar: failed to create '{}': {e}", parent.display());
                ok = false;
                continue;
            }
        }
        // Owner-writable scratch mode; the real bits land in the metadata
        // phase, after every rank is done writing into the file.
        let created = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&entry.path);
        match created {
            Ok(_) => *items += 1,
            Err(e) => {
                displayln!(1, "ptar: failed to create file '{}': {e}", entry.path.display());
                ok = false;
            }
        }
    }
    phase_done(comm, ok, "create files")
}

/// Direct data phase: distribute chunks of every file round-robin and copy
/// archive bytes straight into the destination files.
fn extract_data_chunks(
    comm: &dyn Comm,
    archive: &Path,
    opts: &ArchiveOpts,
    flist: &[Entry],
    doffsets: &[u64],
    total_bytes: u64,
    bytes: &mut u64,
) -> io::Result<()> {
    if comm.rank() == 0 {
        displayln!(2, "Extracting items");
    }
    let chunks = engine::chunk_list(comm, flist, doffsets, opts.chunk_size)?;

    let mut ok = true;
    let file = match File::open(archive) {
        Ok(f) => Some(f),
        Err(e) => {
            displayln!(1, "ptar: failed to open archive '{}': {e}", archive.display());
            ok = false;
            None
        }
    };

    let mut buf = vec![0u8; opts.buf_size];
    let mut progress = Progress::start(comm, "Extracted", false, total_bytes, opts.progress_timeout);
    if let Some(file) = &file {
        if engine::extract_chunks(file, archive, &chunks, &mut buf, &mut progress) {
            *bytes += chunks.iter().map(|c| c.length).sum::<u64>();
        } else {
            ok = false;
        }
    }
    comm.barrier();
    progress.complete();
    phase_done(comm, ok, "extract file data")
}

/// Second pass for symlinks: re-read each owned symlink's header to get
/// its target, then create the link.
fn extract_symlinks(
    comm: &dyn Comm,
    archive: &Path,
    offsets: &[u64],
    start: u64,
    flist: &[Entry],
    items: &mut u64,
) -> io::Result<()> {
    let mut ok = true;
    let file = match File::open(archive) {
        Ok(f) => Some(f),
        Err(e) => {
            displayln!(1, "ptar: failed to open archive '{}': {e}", archive.display());
            ok = false;
            None
        }
    };
    if let Some(file) = &file {
        for (i, entry) in flist.iter().enumerate() {
            if entry.etype != EntryType::Symlink {
                continue;
            }
            let off = offsets[(start + i as u64) as usize];
            let mut f = file;
            let header = f
                .seek(SeekFrom::Start(off))
                .and_then(|_| codec::read_next_header(&mut BufReader::new(f)));
            let target = match header {
                Ok(Some(h)) => h.target,
                _ => None,
            };
            let Some(target) = target else {
                displayln!(
                    1,
                    "ptar: item is not a symlink as expected '{}'",
                    entry.path.display()
                );
                ok = false;
                continue;
            };
            match std::fs::remove_file(&entry.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    displayln!(1, "ptar: failed to replace '{}': {e}", entry.path.display());
                    ok = false;
                    continue;
                }
            }
            if let Err(e) = std::os::unix::fs::symlink(&target, &entry.path) {
                displayln!(1, "ptar: failed to create symlink '{}': {e}", entry.path.display());
                ok = false;
                continue;
            }
            *items += 1;
        }
    }
    phase_done(comm, ok, "extract symlinks")
}

// ─── Shared phases ───────────────────────────────────────────────────────────

/// Phase 1: every rank creates its owned directories. Creation is
/// idempotent, and the closing collective guarantees all directories exist
/// before anyone creates a child item.
fn create_directories(comm: &dyn Comm, flist: &[Entry]) -> io::Result<()> {
    if comm.rank() == 0 {
        displayln!(2, "Creating directories");
    }
    let mut ok = true;
    for entry in flist.iter().filter(|e| e.etype == EntryType::Dir) {
        if let Err(e) = std::fs::create_dir_all(&entry.path) {
            displayln!(
                1,
                "ptar: failed to create directory '{}': {e}",
                entry.path.display()
            );
            ok = false;
        }
    }
    phase_done(comm, ok, "create directories")
}

/// Final phase of the direct path: timestamps and permissions on files and
/// symlinks, then — after everyone is done disturbing parents — on the
/// directories themselves.
fn apply_metadata(comm: &dyn Comm, flist: &[Entry]) -> io::Result<()> {
    if comm.rank() == 0 {
        displayln!(2, "Updating timestamps and permissions");
    }
    comm.barrier();
    let mut ok = true;
    for entry in flist {
        match entry.etype {
            EntryType::File => {
                if let Err(e) = set_file_metadata(entry) {
                    displayln!(1, "ptar: failed to set metadata on '{}': {e}", entry.path.display());
                    ok = false;
                }
            }
            EntryType::Symlink => {
                let res = filetime::set_symlink_file_times(
                    &entry.path,
                    FileTime::from_unix_time(entry.atime, entry.atime_nsec),
                    FileTime::from_unix_time(entry.mtime, entry.mtime_nsec),
                );
                if let Err(e) = res {
                    displayln!(1, "ptar: failed to set times on '{}': {e}", entry.path.display());
                    ok = false;
                }
            }
            EntryType::Dir | EntryType::Other => {}
        }
    }
    if !dir_metadata_pass(comm, flist) {
        ok = false;
    }
    phase_done(comm, ok, "apply metadata")
}

/// Directory-only metadata pass, used alone by the codec paths (files were
/// already stamped as they were written).
fn apply_dir_metadata(comm: &dyn Comm, flist: &[Entry]) -> io::Result<()> {
    if comm.rank() == 0 {
        displayln!(2, "Updating timestamps and permissions");
    }
    let ok = dir_metadata_pass(comm, flist);
    phase_done(comm, ok, "apply directory metadata")
}

fn dir_metadata_pass(comm: &dyn Comm, flist: &[Entry]) -> bool {
    // Children must be in place first: creating them updates parent mtimes.
    comm.barrier();
    let mut ok = true;
    for entry in flist.iter().filter(|e| e.etype == EntryType::Dir) {
        if let Err(e) = set_file_metadata(entry) {
            displayln!(1, "ptar: failed to set metadata on '{}': {e}", entry.path.display());
            ok = false;
        }
    }
    ok
}

fn set_file_metadata(entry: &Entry) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&entry.path, std::fs::Permissions::from_mode(entry.mode & 0o7777))?;
    filetime::set_file_times(
        &entry.path,
        FileTime::from_unix_time(entry.atime, entry.atime_nsec),
        FileTime::from_unix_time(entry.mtime, entry.mtime_nsec),
    )
}

// ─── Scan-driven extraction ──────────────────────────────────────────────────

/// No offsets at all: every rank streams the archive from the beginning and
/// writes the entries whose index is congruent to its rank.
fn extract_by_scan(
    comm: &dyn Comm,
    archive: &Path,
    cwd: &Path,
    opts: &ArchiveOpts,
    items: &mut u64,
    bytes: &mut u64,
) -> io::Result<()> {
    if comm.rank() == 0 {
        displayln!(2, "Extracting metadata");
    }
    let flist = build_flist_scan(comm, archive, cwd)?;

    let local_bytes: u64 = flist.iter().filter(|e| e.is_file()).map(|e| e.size).sum();
    let total_bytes = comm.allreduce_sum(local_bytes);

    create_directories(comm, &flist)?;

    if comm.rank() == 0 {
        displayln!(2, "Extracting items");
    }
    let ranks = comm.size() as u64;
    let rank = comm.rank() as u64;
    let mut ok = true;
    let file = match File::open(archive) {
        Ok(f) => Some(f),
        Err(e) => {
            displayln!(1, "ptar: failed to open archive '{}': {e}", archive.display());
            ok = false;
            None
        }
    };

    let mut buf = vec![0u8; opts.buf_size];
    let mut progress = Progress::start(comm, "Extracted", true, total_bytes, opts.progress_timeout);
    if let Some(file) = file {
        let mut reader = BufReader::new(file);
        let mut idx = 0u64;
        loop {
            let header = match codec::read_next_header(&mut reader) {
                Ok(Some(h)) => h,
                Ok(None) => break,
                Err(e) => {
                    displayln!(1, "ptar: failed to read entry {idx}: {e}");
                    ok = false;
                    break;
                }
            };
            let mine = idx % ranks == rank;
            idx += 1;
            if mine && header.etype != EntryType::Other {
                let dest = crate::flist::prepend_prefix(cwd, &header.name);
                match codec::write_entry_to_disk(&header, &mut reader, &dest, &mut buf) {
                    Ok(n) => {
                        *bytes += n;
                        *items += 1;
                        progress.update(n, 1);
                    }
                    Err(e) => {
                        displayln!(1, "ptar: failed to extract '{}': {e}", header.name);
                        ok = false;
                        break;
                    }
                }
            } else {
                if mine {
                    displayln!(2, "ptar: unsupported type, skipping '{}'", header.name);
                }
                let padded = header.padded_size();
                if padded > 0 {
                    if let Err(e) = reader.seek_relative(padded as i64) {
                        displayln!(1, "ptar: failed to skip entry data: {e}");
                        ok = false;
                        break;
                    }
                }
            }
        }
    }
    comm.barrier();
    progress.complete();
    phase_done(comm, ok, "extract items")?;

    apply_dir_metadata(comm, &flist)
}

/// Build the round-robin file list by streaming every header.
fn build_flist_scan(comm: &dyn Comm, archive: &Path, cwd: &Path) -> io::Result<Vec<Entry>> {
    let mut ok = true;
    let mut flist = Vec::new();
    match File::open(archive) {
        Ok(file) => {
            let ranks = comm.size() as u64;
            let rank = comm.rank() as u64;
            let mut reader = BufReader::new(file);
            let mut idx = 0u64;
            loop {
                match codec::read_next_header(&mut reader) {
                    Ok(Some(h)) => {
                        if idx % ranks == rank {
                            flist.push(h.to_entry(cwd));
                        }
                        let padded = h.padded_size();
                        if padded > 0 {
                            if let Err(e) = reader.seek_relative(padded as i64) {
                                displayln!(1, "ptar: failed to skip entry data: {e}");
                                ok = false;
                                break;
                            }
                        }
                        idx += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        displayln!(1, "ptar: failed to read entry {idx}: {e}");
                        ok = false;
                        break;
                    }
                }
            }
        }
        Err(e) => {
            displayln!(1, "ptar: failed to open archive '{}': {e}", archive.display());
            ok = false;
        }
    }
    phase_done(comm, ok, "extract metadata")?;
    Ok(flist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SoloComm;
    use crate::flist::{Entry, EntryType};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn entry(name: &str, etype: EntryType, size: u64) -> Entry {
        Entry {
            path: PathBuf::from(format!("/src/{name}")),
            etype,
            size,
            mode: 0o644,
            uid: 0,
            gid: 0,
            uname: String::new(),
            gname: String::new(),
            atime: 1_700_000_000,
            atime_nsec: 0,
            mtime: 1_700_000_000,
            mtime_nsec: 0,
            ctime: 1_700_000_000,
            ctime_nsec: 0,
            target: None,
        }
    }

    /// Hand-roll a two-entry archive and return the entry offsets.
    fn tiny_archive(path: &Path) -> Vec<u64> {
        let mut scratch = vec![0u8; 64 * 1024];
        let mut file = std::fs::File::create(path).unwrap();
        let mut offsets = Vec::new();
        let mut pos = 0u64;

        let a = entry("a", EntryType::File, 13);
        let n = codec::encode_header(&a, Path::new("a"), &mut scratch).unwrap();
        file.write_all(&scratch[..n]).unwrap();
        file.write_all(b"hello world!\n").unwrap();
        file.write_all(&vec![0u8; 512 - 13]).unwrap();
        offsets.push(pos);
        pos += n as u64 + 512;

        let b = entry("b", EntryType::File, 0);
        let n = codec::encode_header(&b, Path::new("b"), &mut scratch).unwrap();
        file.write_all(&scratch[..n]).unwrap();
        offsets.push(pos);

        file.write_all(&[0u8; 1024]).unwrap();
        offsets
    }

    #[test]
    fn verify_index_accepts_matching_offsets() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("t.tar");
        let offsets = tiny_archive(&archive);
        let comm = SoloComm::new();
        verify_index(&comm, &archive, &offsets).unwrap();
    }

    #[test]
    fn verify_index_rejects_truncated_offsets() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("t.tar");
        let mut offsets = tiny_archive(&archive);
        offsets.pop(); // the stale index misses the last entry
        let comm = SoloComm::new();
        crate::display::set_display_level(0);
        let err = verify_index(&comm, &archive, &offsets).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn verify_index_rejects_garbage_offsets() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("t.tar");
        let _ = tiny_archive(&archive);
        let comm = SoloComm::new();
        crate::display::set_display_level(0);
        let err = verify_index(&comm, &archive, &[7]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn scan_extraction_writes_every_entry() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("t.tar");
        tiny_archive(&archive);
        let dest = dir.path().join("dest");
        std::fs::create_dir(&dest).unwrap();

        let comm = SoloComm::new();
        let opts = ArchiveOpts {
            progress_timeout: 0,
            ..ArchiveOpts::default()
        };
        let mut items = 0;
        let mut bytes = 0;
        extract_by_scan(&comm, &archive, &dest, &opts, &mut items, &mut bytes).unwrap();
        assert_eq!(items, 2);
        assert_eq!(bytes, 13);
        assert_eq!(std::fs::read(dest.join("a")).unwrap(), b"hello world!\n");
        assert_eq!(std::fs::read(dest.join("b")).unwrap(), b"");
    }

    #[test]
    fn verify_index_empty_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("empty.tar");
        std::fs::write(&archive, [0u8; 1024]).unwrap();
        let comm = SoloComm::new();
        verify_index(&comm, &archive, &[]).unwrap();
    }
}
