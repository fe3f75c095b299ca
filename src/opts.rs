//! Archive operation options.
//!
//! [`ArchiveOpts`] is a plain value type owned by the caller; there is no
//! hidden global configuration. The create engine can additionally be forced
//! through the `MFU_FLIST_ARCHIVE_CREATE` environment variable, which takes
//! precedence over the field when set to a recognized value.

use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`ArchiveOpts::engine`].
/// Recognized values: `LIBCIRCLE` (dynamic work stealing) and `CHUNK`
/// (static chunk list).
pub const CREATE_ENGINE_ENV: &str = "MFU_FLIST_ARCHIVE_CREATE";

/// How file data is copied into the archive during create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateEngine {
    /// Deterministic chunk list, round-robined across ranks. Default.
    Static,
    /// Shared work pool with work stealing; handles size skew better.
    Dynamic,
}

/// How entry data leaves the archive during extract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractMode {
    /// Pre-create files, then copy data with positional reads/writes. Default.
    Direct,
    /// Let the codec write each whole entry (header + data) to disk.
    Codec,
}

/// Tunable parameters for archive create and extract operations.
#[derive(Clone, Debug)]
pub struct ArchiveOpts {
    /// Reserved for ACL/xattr/file-flag preservation passes.
    /// Permission bits and timestamps are always applied.
    pub preserve: bool,
    /// Granularity of data-copy work units, in bytes.
    /// Must be a positive multiple of 512.
    pub chunk_size: u64,
    /// I/O buffer size for each read/write call, in bytes.
    pub buf_size: usize,
    /// Data-copy engine used during create.
    pub engine: CreateEngine,
    /// Extraction strategy when entry offsets are known.
    pub extract_mode: ExtractMode,
    /// Target path: the archive file on create, the working directory on
    /// extract. Recorded by the caller for reporting; the operations take
    /// explicit path arguments.
    pub dest_path: Option<PathBuf>,
    /// Seconds between progress reports; 0 disables progress output.
    pub progress_timeout: u64,
    /// Optional hook run by rank 0 on the archive path before preallocation,
    /// e.g. to configure filesystem striping. Failures are warnings only.
    pub stripe: Option<fn(&Path) -> io::Result<()>>,
}

impl Default for ArchiveOpts {
    fn default() -> Self {
        ArchiveOpts {
            preserve: false,
            chunk_size: 1024 * 1024,
            buf_size: 1024 * 1024,
            engine: CreateEngine::Static,
            extract_mode: ExtractMode::Direct,
            dest_path: None,
            progress_timeout: 10,
            stripe: None,
        }
    }
}

impl ArchiveOpts {
    /// Check option values that would corrupt the archive layout.
    pub fn validate(&self) -> io::Result<()> {
        if self.chunk_size == 0 || self.chunk_size % 512 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "chunk_size must be a positive multiple of 512, got {}",
                    self.chunk_size
                ),
            ));
        }
        if self.buf_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buf_size must be positive",
            ));
        }
        Ok(())
    }

    /// The create engine after applying the environment override.
    pub fn effective_engine(&self) -> CreateEngine {
        match std::env::var(CREATE_ENGINE_ENV) {
            Ok(v) if v == "LIBCIRCLE" => CreateEngine::Dynamic,
            Ok(v) if v == "CHUNK" => CreateEngine::Static,
            Ok(v) => {
                crate::displayln!(2, "{}: unknown value: {}", CREATE_ENGINE_ENV, v);
                self.engine
            }
            Err(_) => self.engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_size_is_valid() {
        let opts = ArchiveOpts::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.engine, CreateEngine::Static);
        assert_eq!(opts.extract_mode, ExtractMode::Direct);
    }

    #[test]
    fn unaligned_chunk_size_rejected() {
        let opts = ArchiveOpts {
            chunk_size: 1000,
            ..ArchiveOpts::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let opts = ArchiveOpts {
            chunk_size: 0,
            ..ArchiveOpts::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn zero_buf_size_rejected() {
        let opts = ArchiveOpts {
            buf_size: 0,
            ..ArchiveOpts::default()
        };
        assert!(opts.validate().is_err());
    }
}
