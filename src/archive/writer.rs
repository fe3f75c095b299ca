//! The shared archive file during create.
//!
//! Every rank holds its own descriptor onto the same file and writes only
//! at offsets the layout assigned to it, so no locking is needed. Rank 0
//! owns truncation, preallocation, and the terminating zero blocks.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::displayln;

#[derive(Debug)]
pub struct ArchiveWriter {
    path: PathBuf,
    file: File,
}

impl ArchiveWriter {
    /// Open (creating if needed) the archive for positional writes.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .custom_flags(libc::O_CLOEXEC | libc::O_LARGEFILE)
            .mode(0o664)
            .open(path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("failed to open archive '{}': {e}", path.display()),
                )
            })?;
        Ok(ArchiveWriter {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty the file, extend it to its final size, and ask the filesystem
    /// to reserve the blocks. Rank 0 only; the zero-filled tail is what
    /// makes 512-padding implicit for the chunked engines.
    pub fn preallocate(&self, final_size: u64) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.set_len(final_size)?;
        // Block reservation is best-effort; not every filesystem supports it.
        // SAFETY: the descriptor is owned and valid for the call.
        let rc = unsafe {
            libc::posix_fallocate(self.file.as_raw_fd(), 0, final_size as libc::off_t)
        };
        if rc != 0 {
            displayln!(
                4,
                "ptar: preallocation of '{}' not supported (rc={rc})",
                self.path.display()
            );
        }
        Ok(())
    }

    /// Positional write of a fully-owned region.
    pub fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.file.write_all_at(buf, offset).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "failed to write to archive '{}' at offset {offset}: {e}",
                    self.path.display()
                ),
            )
        })
    }

    /// Two 512-byte zero blocks terminate the archive. Rank 0, after the
    /// data barrier.
    pub fn write_trailer(&self, archive_size: u64) -> io::Result<()> {
        self.write_at(&[0u8; 1024], archive_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn preallocate_zero_fills() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tar");
        std::fs::write(&path, b"stale contents that must vanish").unwrap();

        let w = ArchiveWriter::create(&path).unwrap();
        w.preallocate(2048).unwrap();
        drop(w);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 2048);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn disjoint_writes_land_at_their_offsets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tar");
        let w = ArchiveWriter::create(&path).unwrap();
        w.preallocate(1536).unwrap();
        w.write_at(b"xxxx", 512).unwrap();
        w.write_at(b"yy", 0).unwrap();
        drop(w);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], b"yy");
        assert_eq!(&bytes[512..516], b"xxxx");
        assert_eq!(bytes[2], 0);
    }

    #[test]
    fn trailer_is_two_zero_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tar");
        let w = ArchiveWriter::create(&path).unwrap();
        w.preallocate(512 + 1024).unwrap();
        w.write_at(&[1u8; 512], 0).unwrap();
        w.write_trailer(512).unwrap();
        drop(w);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 1536);
        assert!(bytes[512..].iter().all(|&b| b == 0));
    }

    #[test]
    fn create_in_missing_directory_fails() {
        let err = ArchiveWriter::create(Path::new("/nonexistent/__ptar__/a.tar")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
