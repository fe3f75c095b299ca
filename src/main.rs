//! Binary entry point for the `ptar` command-line tool.
//!
//! Validates inputs, builds the sorted file list on the leader, spawns the
//! worker group, and dispatches to archive create or extract. All heap
//! allocations are released by RAII; the process exit code is 0 on success
//! and non-zero when any rank reports failure.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nix::unistd::{access, AccessFlags};

use ptar::comm::{block_partition, Comm, ThreadComm};
use ptar::displayln;
use ptar::flist;
use ptar::opts::{ArchiveOpts, CreateEngine, ExtractMode};

#[derive(Parser)]
#[command(name = "ptar", version, about = "Parallel pax/ustar archiver")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Number of worker ranks (default: one per CPU)
    #[arg(long, global = true)]
    ranks: Option<usize>,

    /// Increase verbosity (repeatable)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only
    #[arg(short = 'q', long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create an archive from a set of paths
    Create(CreateArgs),
    /// Extract an archive into a directory
    Extract(ExtractArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    /// Deterministic chunk list (default)
    Static,
    /// Work-stealing pool
    Dynamic,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Positional reads and writes (default)
    Direct,
    /// Codec writes whole entries
    Codec,
}

#[derive(Args)]
struct CreateArgs {
    /// Archive file to write
    #[arg(short = 'f', long = "file")]
    archive: PathBuf,

    /// Paths to archive
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Data-copy unit; positive multiple of 512 (suffixes K/M/G)
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    chunk_size: u64,

    /// I/O buffer per read/write call (suffixes K/M/G)
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    buf_size: u64,

    /// Data-copy engine
    #[arg(long, value_enum, default_value = "static")]
    engine: EngineArg,

    /// Seconds between progress lines; 0 disables
    #[arg(long, default_value_t = 10)]
    progress: u64,

    /// Reserved: carry ACLs/xattrs where supported
    #[arg(long)]
    preserve: bool,
}

#[derive(Args)]
struct ExtractArgs {
    /// Archive file to read
    #[arg(short = 'f', long = "file")]
    archive: PathBuf,

    /// Destination directory
    #[arg(short = 'C', long = "directory", default_value = ".")]
    dir: PathBuf,

    /// Data-copy unit; positive multiple of 512 (suffixes K/M/G)
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    chunk_size: u64,

    /// I/O buffer per read/write call (suffixes K/M/G)
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    buf_size: u64,

    /// Extraction strategy when entry offsets are known
    #[arg(long, value_enum, default_value = "direct")]
    mode: ModeArg,

    /// Seconds between progress lines; 0 disables
    #[arg(long, default_value_t = 10)]
    progress: u64,

    /// Reserved: carry ACLs/xattrs where supported
    #[arg(long)]
    preserve: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        1
    } else {
        2 + i32::from(cli.verbose)
    };
    ptar::set_display_level(level);

    let ranks = cli.ranks.unwrap_or_else(num_cpus::get).max(1);
    let result = match cli.command {
        Command::Create(args) => run_create(args, ranks),
        Command::Extract(args) => run_extract(args, ranks),
    };
    if let Err(e) = result {
        eprintln!("ptar: {e:#}");
        std::process::exit(1);
    }
}

// ─── Argument helpers ────────────────────────────────────────────────────────

/// Parse a byte count with an optional binary suffix: `4096`, `64K`, `1M`, `2G`.
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let (digits, shift) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 10),
        Some('m') | Some('M') => (&s[..s.len() - 1], 20),
        Some('g') | Some('G') => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{s}'"))?;
    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size '{s}' overflows"))
}

/// Absolute, `.`/`..`-free rendition of `path` relative to `cwd`.
fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    let mut out = PathBuf::new();
    for part in joined.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

// ─── Create ──────────────────────────────────────────────────────────────────

fn run_create(args: CreateArgs, ranks: usize) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;

    // At least one readable source, or the whole run is pointless.
    let mut readable = 0;
    for src in &args.sources {
        if access(src.as_path(), AccessFlags::R_OK).is_ok() {
            readable += 1;
        } else {
            displayln!(1, "ptar: could not read '{}'", src.display());
        }
    }
    if readable == 0 {
        bail!("at least one valid source must be specified");
    }

    let archive = absolutize(&cwd, &args.archive);
    if archive.exists() {
        displayln!(2, "ptar: destination target exists, we will overwrite");
    } else {
        let parent = archive.parent().unwrap_or(Path::new("/"));
        if access(parent, AccessFlags::W_OK).is_err() {
            bail!(
                "destination parent directory is not writable: '{}'",
                parent.display()
            );
        }
    }

    let sources: Vec<PathBuf> = args.sources.iter().map(|s| absolutize(&cwd, s)).collect();
    let entries = flist::walk(&sources).context("failed to build file list")?;
    displayln!(3, "Walked {} items", entries.len());
    let encoded = Arc::new(flist::encode_list(&entries));
    drop(entries);

    let opts = ArchiveOpts {
        preserve: args.preserve,
        chunk_size: args.chunk_size,
        buf_size: args.buf_size as usize,
        engine: match args.engine {
            EngineArg::Static => CreateEngine::Static,
            EngineArg::Dynamic => CreateEngine::Dynamic,
        },
        extract_mode: ExtractMode::Direct,
        dest_path: Some(archive.clone()),
        progress_timeout: args.progress,
        stripe: None,
    };

    let results = ThreadComm::run(ranks, |comm| -> std::io::Result<()> {
        let bytes = if comm.rank() == 0 {
            encoded.as_ref().clone()
        } else {
            Vec::new()
        };
        let bytes = comm.broadcast_bytes(0, bytes);
        let all = flist::decode_list(&bytes)?;
        let (start, count) = block_partition(all.len() as u64, comm.size(), comm.rank());
        let mine = &all[start as usize..(start + count) as usize];
        ptar::archive_create(comm, mine, &archive, &cwd, &opts)
    });
    for r in results {
        r.with_context(|| format!("create '{}' failed", archive.display()))?;
    }
    Ok(())
}

// ─── Extract ─────────────────────────────────────────────────────────────────

fn run_extract(args: ExtractArgs, ranks: usize) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let archive = absolutize(&cwd, &args.archive);
    if access(archive.as_path(), AccessFlags::R_OK).is_err() {
        bail!("cannot read archive '{}'", archive.display());
    }

    let dest = absolutize(&cwd, &args.dir);
    std::fs::create_dir_all(&dest)
        .with_context(|| format!("cannot create destination '{}'", dest.display()))?;

    let opts = ArchiveOpts {
        preserve: args.preserve,
        chunk_size: args.chunk_size,
        buf_size: args.buf_size as usize,
        engine: CreateEngine::Static,
        extract_mode: match args.mode {
            ModeArg::Direct => ExtractMode::Direct,
            ModeArg::Codec => ExtractMode::Codec,
        },
        dest_path: Some(dest.clone()),
        progress_timeout: args.progress,
        stripe: None,
    };

    let results =
        ThreadComm::run(ranks, |comm| ptar::archive_extract(comm, &archive, &dest, &opts));
    for r in results {
        r.with_context(|| format!("extract '{}' failed", archive.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_accepts_suffixes() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_size("abc").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn absolutize_normalizes() {
        let cwd = Path::new("/work/dir");
        assert_eq!(
            absolutize(cwd, Path::new("x.tar")),
            PathBuf::from("/work/dir/x.tar")
        );
        assert_eq!(
            absolutize(cwd, Path::new("./a/../b")),
            PathBuf::from("/work/dir/b")
        );
        assert_eq!(absolutize(cwd, Path::new("/abs/p")), PathBuf::from("/abs/p"));
    }

    #[test]
    fn cli_parses_create_and_extract() {
        let cli = Cli::try_parse_from([
            "ptar", "create", "-f", "out.tar", "--engine", "dynamic", "src",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Create(_)));

        let cli = Cli::try_parse_from([
            "ptar", "--ranks", "4", "extract", "-f", "out.tar", "-C", "dest",
        ])
        .unwrap();
        assert_eq!(cli.ranks, Some(4));
        assert!(matches!(cli.command, Command::Extract(_)));
    }
}
