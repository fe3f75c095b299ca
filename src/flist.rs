//! File list construction and the entry model.
//!
//! A [`FileList`] is an ordered collection of [`Entry`] records: one per
//! filesystem item headed into (or out of) an archive, carrying the metadata
//! the archive header needs. Lists are built by [`walk`], which expands a
//! mixed set of file and directory inputs recursively with the [`walkdir`]
//! crate, never follows symlinks, and sorts the result by path so parent
//! directories precede their children.
//!
//! Entries serialize to a compact length-prefixed binary form so whole lists
//! can cross the collective interface.

use std::collections::HashMap;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Filesystem item kind, as archived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryType {
    File,
    Dir,
    Symlink,
    /// Sockets, fifos, devices. Warned about and skipped, never archived.
    Other,
}

impl EntryType {
    pub fn from_mode(st_mode: u32) -> Self {
        match st_mode & libc::S_IFMT {
            libc::S_IFREG => EntryType::File,
            libc::S_IFDIR => EntryType::Dir,
            libc::S_IFLNK => EntryType::Symlink,
            _ => EntryType::Other,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EntryType::File => 0,
            EntryType::Dir => 1,
            EntryType::Symlink => 2,
            EntryType::Other => 3,
        }
    }

    fn from_u8(v: u8) -> io::Result<Self> {
        match v {
            0 => Ok(EntryType::File),
            1 => Ok(EntryType::Dir),
            2 => Ok(EntryType::Symlink),
            3 => Ok(EntryType::Other),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad entry type tag {v}"),
            )),
        }
    }
}

/// One item in a file list.
#[derive(Clone, Debug)]
pub struct Entry {
    /// Absolute path of the item.
    pub path: PathBuf,
    pub etype: EntryType,
    /// Size in bytes; meaningful for regular files only.
    pub size: u64,
    /// Permission bits (lower 12 bits of st_mode).
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub uname: String,
    pub gname: String,
    pub atime: i64,
    pub atime_nsec: u32,
    pub mtime: i64,
    pub mtime_nsec: u32,
    pub ctime: i64,
    pub ctime_nsec: u32,
    /// Symlink target; `None` for everything else.
    pub target: Option<PathBuf>,
}

impl Entry {
    pub fn is_file(&self) -> bool {
        self.etype == EntryType::File
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        put_bytes(out, self.path.as_os_str().as_bytes());
        out.push(self.etype.as_u8());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.mode.to_le_bytes());
        out.extend_from_slice(&self.uid.to_le_bytes());
        out.extend_from_slice(&self.gid.to_le_bytes());
        put_bytes(out, self.uname.as_bytes());
        put_bytes(out, self.gname.as_bytes());
        for (secs, nsec) in [
            (self.atime, self.atime_nsec),
            (self.mtime, self.mtime_nsec),
            (self.ctime, self.ctime_nsec),
        ] {
            out.extend_from_slice(&secs.to_le_bytes());
            out.extend_from_slice(&nsec.to_le_bytes());
        }
        match &self.target {
            Some(t) => {
                out.push(1);
                put_bytes(out, t.as_os_str().as_bytes());
            }
            None => out.push(0),
        }
    }

    pub fn decode_from(cur: &mut Cursor<'_>) -> io::Result<Entry> {
        use std::ffi::OsStr;
        let path = PathBuf::from(OsStr::from_bytes(&cur.bytes()?));
        let etype = EntryType::from_u8(cur.u8()?)?;
        let size = cur.u64()?;
        let mode = cur.u32()?;
        let uid = cur.u32()?;
        let gid = cur.u32()?;
        let uname = String::from_utf8_lossy(&cur.bytes()?).into_owned();
        let gname = String::from_utf8_lossy(&cur.bytes()?).into_owned();
        let mut times = [(0i64, 0u32); 3];
        for t in &mut times {
            t.0 = cur.i64()?;
            t.1 = cur.u32()?;
        }
        let target = if cur.u8()? != 0 {
            Some(PathBuf::from(OsStr::from_bytes(&cur.bytes()?)))
        } else {
            None
        };
        Ok(Entry {
            path,
            etype,
            size,
            mode,
            uid,
            gid,
            uname,
            gname,
            atime: times[0].0,
            atime_nsec: times[0].1,
            mtime: times[1].0,
            mtime_nsec: times[1].1,
            ctime: times[2].0,
            ctime_nsec: times[2].1,
            target,
        })
    }
}

/// Serialize a list of entries (count-prefixed).
pub fn encode_list(entries: &[Entry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for e in entries {
        e.encode_into(&mut out);
    }
    out
}

/// Deserialize a list produced by [`encode_list`].
pub fn decode_list(bytes: &[u8]) -> io::Result<Vec<Entry>> {
    let mut cur = Cursor { buf: bytes, pos: 0 };
    let count = cur.u64()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(Entry::decode_from(&mut cur)?);
    }
    Ok(entries)
}

// ─── Binary cursor helpers ───────────────────────────────────────────────────

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated entry record",
            ));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }
    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }
    fn u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn u64(&mut self) -> io::Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn i64(&mut self) -> io::Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn bytes(&mut self) -> io::Result<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

// ─── Stat and walk ───────────────────────────────────────────────────────────

/// Cache of uid/gid → name lookups; user databases are slow and archives
/// tend to repeat a handful of owners.
#[derive(Default)]
pub struct NameCache {
    users: HashMap<u32, String>,
    groups: HashMap<u32, String>,
}

impl NameCache {
    fn user(&mut self, uid: u32) -> String {
        self.users
            .entry(uid)
            .or_insert_with(|| {
                nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
                    .ok()
                    .flatten()
                    .map(|u| u.name)
                    .unwrap_or_default()
            })
            .clone()
    }

    fn group(&mut self, gid: u32) -> String {
        self.groups
            .entry(gid)
            .or_insert_with(|| {
                nix::unistd::Group::from_gid(nix::unistd::Gid::from_raw(gid))
                    .ok()
                    .flatten()
                    .map(|g| g.name)
                    .unwrap_or_default()
            })
            .clone()
    }
}

/// Symlink targets must fit a path buffer on extraction; longer targets fail
/// the entry rather than being truncated.
pub fn check_target_len(path: &Path, target: &Path) -> io::Result<()> {
    let max = libc::PATH_MAX as usize;
    if target.as_os_str().as_bytes().len() >= max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Link target of '{}' exceeds buffer size {}",
                path.display(),
                max
            ),
        ));
    }
    Ok(())
}

/// lstat one path into an [`Entry`]. Symlinks are described, not followed.
pub fn stat_entry(path: &Path, names: &mut NameCache) -> io::Result<Entry> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| {
        io::Error::new(e.kind(), format!("Could not stat '{}': {e}", path.display()))
    })?;
    let etype = EntryType::from_mode(meta.mode());
    let target = if etype == EntryType::Symlink {
        let t = std::fs::read_link(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to read link '{}': {e}", path.display()),
            )
        })?;
        check_target_len(path, &t)?;
        Some(t)
    } else {
        None
    };
    Ok(Entry {
        path: path.to_path_buf(),
        etype,
        size: if etype == EntryType::File { meta.size() } else { 0 },
        mode: meta.mode() & 0o7777,
        uid: meta.uid(),
        gid: meta.gid(),
        uname: names.user(meta.uid()),
        gname: names.group(meta.gid()),
        atime: meta.atime(),
        atime_nsec: meta.atime_nsec() as u32,
        mtime: meta.mtime(),
        mtime_nsec: meta.mtime_nsec() as u32,
        ctime: meta.ctime(),
        ctime_nsec: meta.ctime_nsec() as u32,
        target,
    })
}

/// Expand a mixed list of inputs into a flat entry list, sorted by path.
///
/// Directories are walked recursively (the directory entry itself included);
/// symlinks are recorded but never followed. Any unreadable item aborts the
/// walk with an error.
pub fn walk(inputs: &[PathBuf]) -> io::Result<Vec<Entry>> {
    let mut names = NameCache::default();
    let mut entries = Vec::new();
    for input in inputs {
        let meta = std::fs::symlink_metadata(input).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Could not read '{}': {e}", input.display()),
            )
        })?;
        if meta.is_dir() {
            for item in WalkDir::new(input) {
                let item = item.map_err(|e| {
                    e.io_error()
                        .map(|io| io::Error::new(io.kind(), e.to_string()))
                        .unwrap_or_else(|| io::Error::other(e.to_string()))
                })?;
                entries.push(stat_entry(item.path(), &mut names)?);
            }
        } else {
            entries.push(stat_entry(input, &mut names)?);
        }
    }
    // Alphabetical path order places parent directories before children,
    // which the extract directory phase relies on.
    entries.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
    Ok(entries)
}

// ─── Path arithmetic ─────────────────────────────────────────────────────────

/// Relative path from `base` to `item`; both should be absolute.
/// Returns `.` when they are equal.
pub fn relative_path(item: &Path, base: &Path) -> PathBuf {
    let item_parts: Vec<Component<'_>> = item.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = item_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &item_parts[common..] {
        out.push(part);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Join an archive-relative name onto a prefix and normalize away `.` and
/// `..` components, the way the extractor turns stored names into
/// destination paths.
pub fn prepend_prefix(prefix: &Path, name: &str) -> PathBuf {
    let mut out = PathBuf::from(prefix);
    for part in Path::new(name).components() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"alpha").unwrap();
        fs::write(root.join("sub/b.txt"), b"beta").unwrap();
        std::os::unix::fs::symlink("a.txt", root.join("sub/link")).unwrap();
        dir
    }

    #[test]
    fn walk_includes_dirs_files_and_symlinks() {
        let dir = make_tree();
        let entries = walk(&[dir.path().to_path_buf()]).unwrap();
        // root dir, a.txt, sub, sub/b.txt, sub/link
        assert_eq!(entries.len(), 5);
        let types: Vec<EntryType> = entries.iter().map(|e| e.etype).collect();
        assert_eq!(
            types,
            vec![
                EntryType::Dir,
                EntryType::File,
                EntryType::Dir,
                EntryType::File,
                EntryType::Symlink
            ]
        );
    }

    #[test]
    fn walk_sorts_parents_before_children() {
        let dir = make_tree();
        let entries = walk(&[dir.path().to_path_buf()]).unwrap();
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        for (a, b) in entries.iter().zip(sorted.iter()) {
            assert_eq!(a.path, b.path);
        }
    }

    #[test]
    fn walk_records_symlink_target() {
        let dir = make_tree();
        let entries = walk(&[dir.path().to_path_buf()]).unwrap();
        let link = entries
            .iter()
            .find(|e| e.etype == EntryType::Symlink)
            .unwrap();
        assert_eq!(link.target.as_deref(), Some(Path::new("a.txt")));
        assert_eq!(link.size, 0);
    }

    #[test]
    fn walk_missing_input_is_error() {
        let err = walk(&[PathBuf::from("/nonexistent/__ptar_walk__")]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn list_encode_decode_round_trip() {
        let dir = make_tree();
        let entries = walk(&[dir.path().to_path_buf()]).unwrap();
        let bytes = encode_list(&entries);
        let back = decode_list(&bytes).unwrap();
        assert_eq!(back.len(), entries.len());
        for (a, b) in entries.iter().zip(back.iter()) {
            assert_eq!(a.path, b.path);
            assert_eq!(a.etype, b.etype);
            assert_eq!(a.size, b.size);
            assert_eq!(a.mode, b.mode);
            assert_eq!(a.mtime, b.mtime);
            assert_eq!(a.mtime_nsec, b.mtime_nsec);
            assert_eq!(a.target, b.target);
            assert_eq!(a.uname, b.uname);
        }
    }

    #[test]
    fn decode_truncated_list_is_error() {
        let dir = make_tree();
        let entries = walk(&[dir.path().to_path_buf()]).unwrap();
        let bytes = encode_list(&entries);
        let err = decode_list(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn relative_path_descends() {
        assert_eq!(
            relative_path(Path::new("/a/b/c.txt"), Path::new("/a")),
            PathBuf::from("b/c.txt")
        );
    }

    #[test]
    fn relative_path_climbs() {
        assert_eq!(
            relative_path(Path::new("/a/x.txt"), Path::new("/a/b/c")),
            PathBuf::from("../../x.txt")
        );
    }

    #[test]
    fn relative_path_equal_is_dot() {
        assert_eq!(
            relative_path(Path::new("/a/b"), Path::new("/a/b")),
            PathBuf::from(".")
        );
    }

    #[test]
    fn prepend_prefix_normalizes() {
        assert_eq!(
            prepend_prefix(Path::new("/dest"), "./a/b.txt"),
            PathBuf::from("/dest/a/b.txt")
        );
        assert_eq!(
            prepend_prefix(Path::new("/dest/x"), "../y.txt"),
            PathBuf::from("/dest/y.txt")
        );
    }

    #[test]
    fn over_long_symlink_target_is_rejected() {
        let long = "x".repeat(libc::PATH_MAX as usize);
        let err = check_target_len(Path::new("/tmp/l"), Path::new(&long)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn entry_type_from_mode() {
        assert_eq!(EntryType::from_mode(libc::S_IFREG | 0o644), EntryType::File);
        assert_eq!(EntryType::from_mode(libc::S_IFDIR | 0o755), EntryType::Dir);
        assert_eq!(
            EntryType::from_mode(libc::S_IFLNK | 0o777),
            EntryType::Symlink
        );
        assert_eq!(
            EntryType::from_mode(libc::S_IFIFO | 0o600),
            EntryType::Other
        );
    }
}
