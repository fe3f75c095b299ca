// ptar — parallel pax/ustar archiver

pub mod archive;
pub mod codec;
pub mod comm;
pub mod display;
pub mod extract;
pub mod flist;
pub mod index;
pub mod layout;
pub mod opts;
pub mod progress;
pub mod scan;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level convenience re-exports for the most common API entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// Create one archive from this rank's block of the sorted file list.
pub use archive::archive_create;

/// Extract an archive into a destination directory.
pub use extract::archive_extract;

/// The collective interface every parallel operation is written against.
pub use comm::Comm;

/// Single-rank group.
pub use comm::SoloComm;

/// Thread-backed R-rank group; `ThreadComm::run` spawns and joins it.
pub use comm::ThreadComm;

/// Contiguous block partition of entries over ranks.
pub use comm::block_partition;

/// Options record for create and extract.
pub use opts::{ArchiveOpts, CreateEngine, ExtractMode};

/// Set the process-global notification level (0 silent … 4 verbose).
pub use display::set_display_level;

pub const PTAR_VERSION_STRING: &str = env!("CARGO_PKG_VERSION");
