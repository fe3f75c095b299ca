//! Archive creation: layout, header writes, data copy, trailer.
//!
//! Control flow on every rank:
//! layout → index → preallocate → headers → barrier → data engine →
//! barrier → trailer (rank 0) → error all-reduce.
//!
//! All writes land at offsets the layout proved disjoint, so ranks never
//! coordinate inside a phase; only the barriers between phases matter.

pub mod engine;
pub mod writer;

use std::io;
use std::path::Path;
use std::time::Instant;

use crate::codec;
use crate::comm::Comm;
use crate::display::{format_bw, format_bytes};
use crate::displayln;
use crate::flist::{relative_path, Entry, EntryType};
use crate::layout::compute_layout;
use crate::opts::{ArchiveOpts, CreateEngine};
use crate::progress::Progress;

pub use writer::ArchiveWriter;

/// Write `entries` (this rank's contiguous block of the globally sorted
/// list) into `archive`. Entry names are stored relative to `cwd`.
pub fn archive_create(
    comm: &dyn Comm,
    entries: &[Entry],
    archive: &Path,
    cwd: &Path,
    opts: &ArchiveOpts,
) -> io::Result<()> {
    opts.validate()?;
    let create_engine = opts.effective_engine();
    let started = Instant::now();

    if comm.rank() == 0 {
        displayln!(3, "Writing archive to {}", archive.display());
    }

    let mut scratch = vec![0u8; codec::HEADER_SCRATCH];
    let layout = compute_layout(comm, entries, cwd, &mut scratch)?;

    // The index lists only entries that actually land in the archive, so a
    // skipped unsupported item never poisons it. It is advisory; failing to
    // write it costs a scan on extract, not the archive.
    let written_offsets: Vec<u64> = entries
        .iter()
        .zip(layout.offsets.iter())
        .filter(|(e, _)| e.etype != EntryType::Other)
        .map(|(_, off)| *off)
        .collect();
    if crate::index::write_index(comm, archive, &written_offsets).is_err() && comm.rank() == 0 {
        displayln!(2, "ptar: index write failed; extraction will scan");
    }

    // Optional filesystem tuning (e.g. striping) before any data lands.
    if comm.rank() == 0 {
        if let Some(hook) = opts.stripe {
            if let Err(e) = hook(archive) {
                displayln!(2, "ptar: stripe hook for '{}' failed: {e}", archive.display());
            }
        }
    }
    comm.barrier();

    let mut err = false;
    let writer = match ArchiveWriter::create(archive) {
        Ok(w) => Some(w),
        Err(e) => {
            displayln!(1, "ptar: {e}");
            None
        }
    };
    let opened = comm.alltrue(writer.is_some());
    let Some(writer) = writer.filter(|_| opened) else {
        return Err(io::Error::other(format!(
            "failed to open archive '{}'",
            archive.display()
        )));
    };

    if comm.rank() == 0 {
        displayln!(3, "Truncating archive");
        if let Err(e) = writer.preallocate(layout.archive_size + 1024) {
            displayln!(
                1,
                "ptar: failed to truncate archive '{}': {e}",
                archive.display()
            );
            err = true;
        }
    }
    comm.barrier();

    if comm.rank() == 0 {
        displayln!(3, "Writing entry headers");
    }
    for (idx, entry) in entries.iter().enumerate() {
        if entry.etype == EntryType::Other {
            continue;
        }
        let relname = relative_path(&entry.path, cwd);
        match codec::encode_header(entry, &relname, &mut scratch) {
            Ok(n) => {
                if let Err(e) = writer.write_at(&scratch[..n], layout.offsets[idx]) {
                    displayln!(
                        1,
                        "ptar: failed to write header for '{}': {e}",
                        entry.path.display()
                    );
                    err = true;
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
    comm.barrier();

    if comm.rank() == 0 {
        displayln!(3, "Copying file data");
    }
    let mut buf = vec![0u8; opts.buf_size];
    let mut progress = Progress::start(
        comm,
        "Tarred",
        false,
        layout.total_bytes,
        opts.progress_timeout,
    );
    match create_engine {
        CreateEngine::Static => {
            let chunks =
                engine::chunk_list(comm, entries, &layout.data_offsets, opts.chunk_size)?;
            if !engine::archive_chunks(&writer, &chunks, &mut buf, &mut progress) {
                err = true;
            }
        }
        CreateEngine::Dynamic => {
            let mut pool = comm.work_pool();
            engine::enqueue_file_tasks(
                &mut *pool,
                entries,
                &layout.data_offsets,
                opts.chunk_size,
            );
            pool.seal();
            if !engine::drain_tasks(&mut *pool, &writer, opts.chunk_size, &mut buf, &mut progress)
            {
                err = true;
            }
        }
    }
    comm.barrier();
    progress.complete();

    if comm.rank() == 0 {
        if let Err(e) = writer.write_trailer(layout.archive_size) {
            displayln!(1, "ptar: {e}");
            err = true;
        }
    }
    drop(writer);

    let ok = comm.alltrue(!err);
    if comm.rank() == 0 {
        let secs = started.elapsed().as_secs_f64();
        let final_size = layout.archive_size + 1024;
        let (sv, su) = format_bytes(final_size);
        let (rv, ru) = format_bw(final_size as f64 / secs.max(1e-9));
        displayln!(2, "Seconds: {secs:.3}");
        displayln!(2, "Archive size: {sv:.3} {su}");
        displayln!(2, "Rate: {rv:.3} {ru} ({final_size} bytes in {secs:.3} seconds)");
    }
    if !ok {
        return Err(io::Error::other(format!(
            "failed to write archive '{}'",
            archive.display()
        )));
    }
    Ok(())
}
