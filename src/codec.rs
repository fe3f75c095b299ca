//! Pax/ustar archive codec.
//!
//! Three narrow capabilities, matching what the archiver core consumes:
//!
//! - [`encode_header`] — materialize one entry's header into a caller
//!   buffer and report the bytes written. Emits a pax extended header
//!   (`x` typeflag) carrying nanosecond timestamps and any field that
//!   overflows its ustar slot, followed by the ustar block.
//! - [`read_next_header`] — parse the next header from a stream, returning
//!   decoded metadata plus the exact byte count consumed, or `None` at the
//!   terminating zero block.
//! - [`write_entry_to_disk`] — create the item a header describes and
//!   stream its data blocks out of the archive.
//!
//! Every header is a multiple of 512 bytes; file data is padded to 512.
//! No compression filters are supported in either direction.

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use filetime::FileTime;

use crate::flist::{Entry, EntryType};

/// Tar block size; every on-disk structure is a multiple of this.
pub const BLOCK: u64 = 512;

/// Worst-case header scratch: entries bearing very long ACL/xattr records
/// must still encode into one buffer.
pub const HEADER_SCRATCH: usize = 128 * 1024 * 1024;

/// Round `n` up to the next multiple of 512.
pub const fn pad512(n: u64) -> u64 {
    n.div_ceil(BLOCK) * BLOCK
}

// Ustar field offsets within a 512-byte block.
const F_NAME: (usize, usize) = (0, 100);
const F_MODE: (usize, usize) = (100, 8);
const F_UID: (usize, usize) = (108, 8);
const F_GID: (usize, usize) = (116, 8);
const F_SIZE: (usize, usize) = (124, 12);
const F_MTIME: (usize, usize) = (136, 12);
const F_CHKSUM: (usize, usize) = (148, 8);
const F_TYPE: usize = 156;
const F_LINK: (usize, usize) = (157, 100);
const F_MAGIC: (usize, usize) = (257, 6);
const F_VERSION: (usize, usize) = (263, 2);
const F_UNAME: (usize, usize) = (265, 32);
const F_GNAME: (usize, usize) = (297, 32);
const F_DEVMAJOR: (usize, usize) = (329, 8);
const F_DEVMINOR: (usize, usize) = (337, 8);
const F_PREFIX: (usize, usize) = (345, 155);

const OCTAL_SIZE_MAX: u64 = 0o77777777777; // 11 octal digits
const OCTAL_ID_MAX: u64 = 0o7777777; // 7 octal digits

// ─── Encoding ────────────────────────────────────────────────────────────────

/// Encode the header for `entry`, stored under the archive-relative name
/// `relname`, into `buf`. Returns the number of bytes written (a multiple
/// of 512). Fails with `WriteZero` if `buf` is too small.
pub fn encode_header(entry: &Entry, relname: &Path, buf: &mut [u8]) -> io::Result<usize> {
    let mut name = relname.as_os_str().as_bytes().to_vec();
    if entry.etype == EntryType::Dir && name.last() != Some(&b'/') {
        name.push(b'/');
    }
    let link = entry
        .target
        .as_ref()
        .map(|t| t.as_os_str().as_bytes().to_vec())
        .unwrap_or_default();

    // Extended records: high-resolution times always, overflowing fields
    // as needed.
    let mut records = Vec::new();
    push_record(&mut records, "mtime", &pax_time(entry.mtime, entry.mtime_nsec));
    push_record(&mut records, "atime", &pax_time(entry.atime, entry.atime_nsec));
    push_record(&mut records, "ctime", &pax_time(entry.ctime, entry.ctime_nsec));
    if name.len() > F_NAME.1 {
        push_record_bytes(&mut records, "path", &name);
    }
    if link.len() > F_LINK.1 {
        push_record_bytes(&mut records, "linkpath", &link);
    }
    if entry.size > OCTAL_SIZE_MAX {
        push_record(&mut records, "size", &entry.size.to_string());
    }
    if u64::from(entry.uid) > OCTAL_ID_MAX {
        push_record(&mut records, "uid", &entry.uid.to_string());
    }
    if u64::from(entry.gid) > OCTAL_ID_MAX {
        push_record(&mut records, "gid", &entry.gid.to_string());
    }

    let records_padded = pad512(records.len() as u64) as usize;
    let total = BLOCK as usize + records_padded + BLOCK as usize;
    if buf.len() < total {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!(
                "header buffer too small: need {total} bytes, have {}",
                buf.len()
            ),
        ));
    }
    let out = &mut buf[..total];
    out.fill(0);

    // Extended header block names the entry it decorates.
    let mut pax_name = b"PaxHeaders/".to_vec();
    pax_name.extend_from_slice(&name);
    pax_name.truncate(F_NAME.1);
    fill_ustar(
        &mut out[..BLOCK as usize],
        &pax_name,
        0o644,
        u64::from(entry.uid).min(OCTAL_ID_MAX),
        u64::from(entry.gid).min(OCTAL_ID_MAX),
        records.len() as u64,
        entry.mtime,
        b'x',
        &[],
        &entry.uname,
        &entry.gname,
    );
    out[BLOCK as usize..BLOCK as usize + records.len()].copy_from_slice(&records);

    let main = &mut out[BLOCK as usize + records_padded..];
    fill_ustar(
        main,
        &name[..name.len().min(F_NAME.1)],
        entry.mode & 0o7777,
        u64::from(entry.uid).min(OCTAL_ID_MAX),
        u64::from(entry.gid).min(OCTAL_ID_MAX),
        entry.size.min(OCTAL_SIZE_MAX),
        entry.mtime,
        match entry.etype {
            EntryType::File => b'0',
            EntryType::Dir => b'5',
            EntryType::Symlink => b'2',
            EntryType::Other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported entry type for '{}'", entry.path.display()),
                ))
            }
        },
        &link[..link.len().min(F_LINK.1)],
        &entry.uname,
        &entry.gname,
    );

    Ok(total)
}

fn pax_time(secs: i64, nsec: u32) -> String {
    format!("{secs}.{nsec:09}")
}

fn push_record(records: &mut Vec<u8>, key: &str, value: &str) {
    push_record_bytes(records, key, value.as_bytes());
}

/// Append one `"<len> <key>=<value>\n"` record; `len` counts the whole
/// record including its own digits.
fn push_record_bytes(records: &mut Vec<u8>, key: &str, value: &[u8]) {
    let base = 1 + key.len() + 1 + value.len() + 1; // space key '=' value '\n'
    let mut len = base + 1;
    while decimal_digits(len) + base != len {
        len = decimal_digits(len) + base;
    }
    records.extend_from_slice(len.to_string().as_bytes());
    records.push(b' ');
    records.extend_from_slice(key.as_bytes());
    records.push(b'=');
    records.extend_from_slice(value);
    records.push(b'\n');
}

fn decimal_digits(mut n: usize) -> usize {
    let mut d = 1;
    while n >= 10 {
        n /= 10;
        d += 1;
    }
    d
}

#[allow(clippy::too_many_arguments)]
fn fill_ustar(
    block: &mut [u8],
    name: &[u8],
    mode: u32,
    uid: u64,
    gid: u64,
    size: u64,
    mtime: i64,
    typeflag: u8,
    link: &[u8],
    uname: &str,
    gname: &str,
) {
    block[..BLOCK as usize].fill(0);
    block[F_NAME.0..F_NAME.0 + name.len()].copy_from_slice(name);
    octal_field(&mut block[F_MODE.0..F_MODE.0 + F_MODE.1], u64::from(mode));
    octal_field(&mut block[F_UID.0..F_UID.0 + F_UID.1], uid);
    octal_field(&mut block[F_GID.0..F_GID.0 + F_GID.1], gid);
    octal_field(&mut block[F_SIZE.0..F_SIZE.0 + F_SIZE.1], size);
    let mtime_clamped = mtime.clamp(0, OCTAL_SIZE_MAX as i64) as u64;
    octal_field(&mut block[F_MTIME.0..F_MTIME.0 + F_MTIME.1], mtime_clamped);
    block[F_TYPE] = typeflag;
    block[F_LINK.0..F_LINK.0 + link.len()].copy_from_slice(link);
    block[F_MAGIC.0..F_MAGIC.0 + 6].copy_from_slice(b"ustar\0");
    block[F_VERSION.0..F_VERSION.0 + 2].copy_from_slice(b"00");
    str_field(&mut block[F_UNAME.0..F_UNAME.0 + F_UNAME.1], uname);
    str_field(&mut block[F_GNAME.0..F_GNAME.0 + F_GNAME.1], gname);
    octal_field(&mut block[F_DEVMAJOR.0..F_DEVMAJOR.0 + F_DEVMAJOR.1], 0);
    octal_field(&mut block[F_DEVMINOR.0..F_DEVMINOR.0 + F_DEVMINOR.1], 0);

    // Checksum is computed with its own field set to spaces.
    block[F_CHKSUM.0..F_CHKSUM.0 + F_CHKSUM.1].fill(b' ');
    let sum: u64 = block[..BLOCK as usize].iter().map(|&b| u64::from(b)).sum();
    let chk = format!("{sum:06o}");
    block[F_CHKSUM.0..F_CHKSUM.0 + 6].copy_from_slice(chk.as_bytes());
    block[F_CHKSUM.0 + 6] = 0;
    block[F_CHKSUM.0 + 7] = b' ';
}

/// Write `value` as zero-padded octal followed by a NUL, filling the field.
fn octal_field(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let s = format!("{value:0digits$o}");
    field[..digits].copy_from_slice(s.as_bytes());
    field[digits] = 0;
}

fn str_field(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(field.len() - 1);
    field[..n].copy_from_slice(&bytes[..n]);
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Decoded header of one archive entry.
#[derive(Clone, Debug)]
pub struct Header {
    /// Archive-relative name, directory trailing slash stripped.
    pub name: String,
    pub etype: EntryType,
    pub size: u64,
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
    pub target: Option<String>,
    /// Exact bytes consumed by this header (extended block included).
    pub header_len: u64,
}

impl Header {
    /// On-disk size of the data region following the header.
    pub fn padded_size(&self) -> u64 {
        if self.etype == EntryType::File {
            pad512(self.size)
        } else {
            0
        }
    }

    /// Header plus padded content: the full footprint of this entry.
    pub fn entry_len(&self) -> u64 {
        self.header_len + self.padded_size()
    }

    /// Build a file-list entry rooted at `prefix`.
    pub fn to_entry(&self, prefix: &Path) -> Entry {
        Entry {
            path: crate::flist::prepend_prefix(prefix, &self.name),
            etype: self.etype,
            size: self.size,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            uname: self.uname.clone(),
            gname: self.gname.clone(),
            atime: self.atime,
            atime_nsec: self.atime_nsec,
            mtime: self.mtime,
            mtime_nsec: self.mtime_nsec,
            ctime: self.ctime,
            ctime_nsec: self.ctime_nsec,
            target: self.target.as_ref().map(|t| t.into()),
        }
    }
}

#[derive(Default)]
struct PaxOverrides {
    path: Option<String>,
    linkpath: Option<String>,
    size: Option<u64>,
    uid: Option<u32>,
    gid: Option<u32>,
    mtime: Option<(i64, u32)>,
    atime: Option<(i64, u32)>,
    ctime: Option<(i64, u32)>,
}

/// Read the next entry header from `reader`.
///
/// Returns `Ok(None)` at the terminating zero block, the decoded [`Header`]
/// otherwise. The reader is left positioned at the first data byte of the
/// entry. Bad magic, a checksum mismatch, or truncation is an
/// `InvalidData` error.
pub fn read_next_header<R: Read>(reader: &mut R) -> io::Result<Option<Header>> {
    let mut block = [0u8; BLOCK as usize];
    read_block(reader, &mut block)?;
    if block.iter().all(|&b| b == 0) {
        return Ok(None);
    }
    let mut consumed = BLOCK;
    let mut pax = PaxOverrides::default();

    if block[F_TYPE] == b'g' {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "global extended headers are not supported",
        ));
    }
    if block[F_TYPE] == b'x' {
        verify_block(&block)?;
        let rec_len = parse_octal(&block[F_SIZE.0..F_SIZE.0 + F_SIZE.1])?;
        let padded = pad512(rec_len) as usize;
        let mut records = vec![0u8; padded];
        read_block(reader, &mut records)?;
        consumed += padded as u64;
        parse_pax_records(&records[..rec_len as usize], &mut pax)?;

        read_block(reader, &mut block)?;
        consumed += BLOCK;
        if block.iter().all(|&b| b == 0) || block[F_TYPE] == b'x' {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "extended header not followed by an entry header",
            ));
        }
    }
    verify_block(&block)?;

    // Name: prefix field joined with the name field, pax path winning.
    let mut name = match pax.path {
        Some(p) => p,
        None => {
            let base = cstr(&block[F_NAME.0..F_NAME.0 + F_NAME.1]);
            let prefix = cstr(&block[F_PREFIX.0..F_PREFIX.0 + F_PREFIX.1]);
            if prefix.is_empty() {
                base
            } else {
                format!("{prefix}/{base}")
            }
        }
    };

    let typeflag = block[F_TYPE];
    let etype = match typeflag {
        b'0' | 0 => {
            if name.ends_with('/') {
                EntryType::Dir
            } else {
                EntryType::File
            }
        }
        b'5' => EntryType::Dir,
        b'2' => EntryType::Symlink,
        _ => EntryType::Other,
    };
    while name.ends_with('/') {
        name.pop();
    }

    let size = match pax.size {
        Some(s) => s,
        None => parse_octal(&block[F_SIZE.0..F_SIZE.0 + F_SIZE.1])?,
    };
    let mtime_field = parse_octal(&block[F_MTIME.0..F_MTIME.0 + F_MTIME.1])? as i64;
    let (mtime, mtime_nsec) = pax.mtime.unwrap_or((mtime_field, 0));
    let (atime, atime_nsec) = pax.atime.unwrap_or((mtime, 0));
    let (ctime, ctime_nsec) = pax.ctime.unwrap_or((mtime, 0));

    let target = match pax.linkpath {
        Some(l) => Some(l),
        None => {
            let l = cstr(&block[F_LINK.0..F_LINK.0 + F_LINK.1]);
            if l.is_empty() { None } else { Some(l) }
        }
    };
    let target = if etype == EntryType::Symlink { target } else { None };

    Ok(Some(Header {
        name,
        etype,
        size: if etype == EntryType::File { size } else { 0 },
        mode: parse_octal(&block[F_MODE.0..F_MODE.0 + F_MODE.1])? as u32 & 0o7777,
        uid: pax
            .uid
            .unwrap_or(parse_octal(&block[F_UID.0..F_UID.0 + F_UID.1])? as u32),
        gid: pax
            .gid
            .unwrap_or(parse_octal(&block[F_GID.0..F_GID.0 + F_GID.1])? as u32),
        uname: cstr(&block[F_UNAME.0..F_UNAME.0 + F_UNAME.1]),
        gname: cstr(&block[F_GNAME.0..F_GNAME.0 + F_GNAME.1]),
        atime,
        atime_nsec,
        mtime,
        mtime_nsec,
        ctime,
        ctime_nsec,
        target,
        header_len: consumed,
    }))
}

fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(io::ErrorKind::InvalidData, "unexpected end of archive")
        } else {
            e
        }
    })
}

fn verify_block(block: &[u8]) -> io::Result<()> {
    if &block[F_MAGIC.0..F_MAGIC.0 + 5] != b"ustar" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad header magic",
        ));
    }
    let stored = parse_octal(&block[F_CHKSUM.0..F_CHKSUM.0 + F_CHKSUM.1])?;
    let mut sum: u64 = block.iter().map(|&b| u64::from(b)).sum();
    for &b in &block[F_CHKSUM.0..F_CHKSUM.0 + F_CHKSUM.1] {
        sum -= u64::from(b);
    }
    sum += F_CHKSUM.1 as u64 * u64::from(b' ');
    if sum != stored {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("header checksum mismatch: stored {stored:o}, computed {sum:o}"),
        ));
    }
    Ok(())
}

fn cstr(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn parse_octal(field: &[u8]) -> io::Result<u64> {
    let mut value: u64 = 0;
    let mut seen = false;
    for &b in field {
        match b {
            b'0'..=b'7' => {
                value = value
                    .checked_mul(8)
                    .and_then(|v| v.checked_add(u64::from(b - b'0')))
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "octal field overflow")
                    })?;
                seen = true;
            }
            b' ' if !seen => {}
            b' ' | 0 => break,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "bad octal digit in header field",
                ))
            }
        }
    }
    Ok(value)
}

fn parse_pax_records(mut records: &[u8], pax: &mut PaxOverrides) -> io::Result<()> {
    let bad = || io::Error::new(io::ErrorKind::InvalidData, "malformed pax record");
    while !records.is_empty() {
        let space = records.iter().position(|&b| b == b' ').ok_or_else(bad)?;
        let len: usize = std::str::from_utf8(&records[..space])
            .map_err(|_| bad())?
            .parse()
            .map_err(|_| bad())?;
        if len <= space + 1 || len > records.len() {
            return Err(bad());
        }
        let body = &records[space + 1..len - 1]; // strip trailing '\n'
        let eq = body.iter().position(|&b| b == b'=').ok_or_else(bad)?;
        let key = std::str::from_utf8(&body[..eq]).map_err(|_| bad())?;
        let value = &body[eq + 1..];
        match key {
            "path" => pax.path = Some(String::from_utf8_lossy(value).into_owned()),
            "linkpath" => pax.linkpath = Some(String::from_utf8_lossy(value).into_owned()),
            "size" => {
                pax.size = Some(
                    std::str::from_utf8(value)
                        .map_err(|_| bad())?
                        .parse()
                        .map_err(|_| bad())?,
                )
            }
            "uid" => {
                pax.uid = Some(
                    std::str::from_utf8(value)
                        .map_err(|_| bad())?
                        .parse()
                        .map_err(|_| bad())?,
                )
            }
            "gid" => {
                pax.gid = Some(
                    std::str::from_utf8(value)
                        .map_err(|_| bad())?
                        .parse()
                        .map_err(|_| bad())?,
                )
            }
            "mtime" => pax.mtime = Some(parse_pax_time(value)?),
            "atime" => pax.atime = Some(parse_pax_time(value)?),
            "ctime" => pax.ctime = Some(parse_pax_time(value)?),
            _ => {} // unknown keys are ignored per the pax spec
        }
        records = &records[len..];
    }
    Ok(())
}

fn parse_pax_time(value: &[u8]) -> io::Result<(i64, u32)> {
    let bad = || io::Error::new(io::ErrorKind::InvalidData, "malformed pax time");
    let s = std::str::from_utf8(value).map_err(|_| bad())?;
    match s.split_once('.') {
        Some((secs, frac)) => {
            let secs: i64 = secs.parse().map_err(|_| bad())?;
            let mut digits = frac.to_string();
            digits.truncate(9);
            while digits.len() < 9 {
                digits.push('0');
            }
            let nsec: u32 = digits.parse().map_err(|_| bad())?;
            Ok((secs, nsec))
        }
        None => Ok((s.parse().map_err(|_| bad())?, 0)),
    }
}

// ─── Disk writing ────────────────────────────────────────────────────────────

/// Create the item `header` describes at `dest` and stream its data region
/// from `reader` (positioned at the first data byte; padding is consumed).
/// Returns the number of data bytes written.
///
/// Files and symlinks receive their mode and timestamps immediately;
/// directory timestamps are the caller's business since writing children
/// will disturb them.
pub fn write_entry_to_disk<R: Read>(
    header: &Header,
    reader: &mut R,
    dest: &Path,
    buf: &mut [u8],
) -> io::Result<u64> {
    match header.etype {
        EntryType::Dir => {
            std::fs::create_dir_all(dest)?;
            // Keep the directory traversable until all children have landed;
            // the final metadata pass applies the exact bits.
            set_mode(dest, header.mode | 0o700)?;
            Ok(0)
        }
        EntryType::Symlink => {
            let target = header.target.as_deref().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("entry '{}' is not a symlink as expected", header.name),
                )
            })?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match std::fs::remove_file(dest) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            std::os::unix::fs::symlink(target, dest)?;
            filetime::set_symlink_file_times(
                dest,
                FileTime::from_unix_time(header.atime, header.atime_nsec),
                FileTime::from_unix_time(header.mtime, header.mtime_nsec),
            )?;
            Ok(0)
        }
        EntryType::File => {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(header.mode)
                .open(dest)?;
            let mut remaining = header.size;
            while remaining > 0 {
                let step = (buf.len() as u64).min(remaining) as usize;
                read_block(reader, &mut buf[..step])?;
                file.write_all(&buf[..step])?;
                remaining -= step as u64;
            }
            drop(file);
            skip_data(reader, header.padded_size() - header.size)?;
            set_mode(dest, header.mode)?;
            filetime::set_file_times(
                dest,
                FileTime::from_unix_time(header.atime, header.atime_nsec),
                FileTime::from_unix_time(header.mtime, header.mtime_nsec),
            )?;
            Ok(header.size)
        }
        EntryType::Other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported entry type for '{}'", header.name),
        )),
    }
}

/// Read and discard `len` bytes, e.g. block padding or an unwanted entry's
/// data region on the scan path.
pub fn skip_data<R: Read>(reader: &mut R, len: u64) -> io::Result<()> {
    let copied = io::copy(&mut reader.take(len), &mut io::sink())?;
    if copied != len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unexpected end of archive",
        ));
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn sample_entry(etype: EntryType, size: u64) -> Entry {
        Entry {
            path: PathBuf::from("/src/item"),
            etype,
            size,
            mode: 0o644,
            uid: 1000,
            gid: 1000,
            uname: "alice".into(),
            gname: "users".into(),
            atime: 1_700_000_001,
            atime_nsec: 111,
            mtime: 1_700_000_002,
            mtime_nsec: 222_333_444,
            ctime: 1_700_000_003,
            ctime_nsec: 555,
            target: None,
        }
    }

    fn encode(entry: &Entry, relname: &str) -> Vec<u8> {
        let mut buf = vec![0u8; 64 * 1024];
        let n = encode_header(entry, Path::new(relname), &mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn header_is_block_aligned() {
        let e = sample_entry(EntryType::File, 13);
        let bytes = encode(&e, "dir/item.txt");
        assert_eq!(bytes.len() % 512, 0);
        // extended block + one record block + ustar block
        assert_eq!(bytes.len(), 1536);
    }

    #[test]
    fn file_header_round_trip() {
        let e = sample_entry(EntryType::File, 13);
        let bytes = encode(&e, "dir/item.txt");
        let h = read_next_header(&mut Cursor::new(&bytes)).unwrap().unwrap();
        assert_eq!(h.name, "dir/item.txt");
        assert_eq!(h.etype, EntryType::File);
        assert_eq!(h.size, 13);
        assert_eq!(h.mode, 0o644);
        assert_eq!(h.uid, 1000);
        assert_eq!(h.uname, "alice");
        assert_eq!(h.mtime, 1_700_000_002);
        assert_eq!(h.mtime_nsec, 222_333_444);
        assert_eq!(h.atime, 1_700_000_001);
        assert_eq!(h.ctime_nsec, 555);
        assert_eq!(h.header_len, bytes.len() as u64);
        assert_eq!(h.padded_size(), 512);
    }

    #[test]
    fn dir_header_gets_trailing_slash_and_round_trips() {
        let mut e = sample_entry(EntryType::Dir, 0);
        e.mode = 0o755;
        let bytes = encode(&e, "some/dir");
        // raw name field carries the trailing slash
        let ustar = &bytes[bytes.len() - 512..];
        assert!(ustar.starts_with(b"some/dir/"));
        let h = read_next_header(&mut Cursor::new(&bytes)).unwrap().unwrap();
        assert_eq!(h.etype, EntryType::Dir);
        assert_eq!(h.name, "some/dir");
        assert_eq!(h.padded_size(), 0);
    }

    #[test]
    fn symlink_header_carries_target() {
        let mut e = sample_entry(EntryType::Symlink, 0);
        e.target = Some(PathBuf::from("/etc/hostname"));
        let bytes = encode(&e, "link");
        let h = read_next_header(&mut Cursor::new(&bytes)).unwrap().unwrap();
        assert_eq!(h.etype, EntryType::Symlink);
        assert_eq!(h.target.as_deref(), Some("/etc/hostname"));
        assert_eq!(h.padded_size(), 0);
    }

    #[test]
    fn long_path_uses_pax_record() {
        let e = sample_entry(EntryType::File, 1);
        let long = format!("{}/file.bin", "d".repeat(150));
        let bytes = encode(&e, &long);
        let h = read_next_header(&mut Cursor::new(&bytes)).unwrap().unwrap();
        assert_eq!(h.name, long);
    }

    #[test]
    fn long_link_target_uses_pax_record() {
        let mut e = sample_entry(EntryType::Symlink, 0);
        let target = format!("/{}", "t".repeat(200));
        e.target = Some(PathBuf::from(&target));
        let bytes = encode(&e, "link");
        let h = read_next_header(&mut Cursor::new(&bytes)).unwrap().unwrap();
        assert_eq!(h.target.as_deref(), Some(target.as_str()));
    }

    #[test]
    fn zero_block_terminates() {
        let zeros = vec![0u8; 1024];
        assert!(read_next_header(&mut Cursor::new(&zeros)).unwrap().is_none());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let e = sample_entry(EntryType::File, 5);
        let mut bytes = encode(&e, "f.txt");
        let last = bytes.len() - 512;
        bytes[last] ^= 0x55; // flip a name byte in the ustar block
        let err = read_next_header(&mut Cursor::new(&bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_header_is_invalid_data() {
        let e = sample_entry(EntryType::File, 5);
        let bytes = encode(&e, "f.txt");
        let err = read_next_header(&mut Cursor::new(&bytes[..700])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn buffer_too_small_is_rejected() {
        let e = sample_entry(EntryType::File, 5);
        let mut tiny = vec![0u8; 512];
        let err = encode_header(&e, Path::new("f"), &mut tiny).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn pax_record_length_self_consistent() {
        let mut records = Vec::new();
        push_record(&mut records, "mtime", "1700000002.222333444");
        let text = String::from_utf8(records.clone()).unwrap();
        let (len, _) = text.split_once(' ').unwrap();
        assert_eq!(len.parse::<usize>().unwrap(), records.len());
    }

    #[test]
    fn pax_record_length_at_digit_boundary() {
        // Force the record length to sit near a 99/100 digit boundary.
        for extra in 80..120 {
            let mut records = Vec::new();
            push_record(&mut records, "path", &"p".repeat(extra));
            let text = String::from_utf8_lossy(&records);
            let (len, _) = text.split_once(' ').unwrap();
            assert_eq!(len.parse::<usize>().unwrap(), records.len(), "extra={extra}");
        }
    }

    #[test]
    fn parse_octal_variants() {
        assert_eq!(parse_octal(b"0000644\0").unwrap(), 0o644);
        assert_eq!(parse_octal(b"   644 \0").unwrap(), 0o644);
        assert_eq!(parse_octal(b"\0\0\0\0").unwrap(), 0);
        assert!(parse_octal(b"12x4\0").is_err());
    }

    #[test]
    fn parse_pax_time_fraction() {
        assert_eq!(parse_pax_time(b"123.5").unwrap(), (123, 500_000_000));
        assert_eq!(parse_pax_time(b"123.000000001").unwrap(), (123, 1));
        assert_eq!(parse_pax_time(b"123").unwrap(), (123, 0));
        assert_eq!(parse_pax_time(b"-5.0").unwrap(), (-5, 0));
    }

    #[test]
    fn skip_data_detects_truncation() {
        let data = vec![7u8; 100];
        let err = skip_data(&mut Cursor::new(&data), 200).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn write_file_entry_to_disk_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let e = sample_entry(EntryType::File, 13);
        let mut archive = encode(&e, "out.txt");
        archive.extend_from_slice(b"hello world!\n");
        archive.extend_from_slice(&vec![0u8; 512 - 13]);

        let mut cur = Cursor::new(&archive);
        let h = read_next_header(&mut cur).unwrap().unwrap();
        let dest = dir.path().join("out.txt");
        let mut buf = vec![0u8; 4096];
        let written = write_entry_to_disk(&h, &mut cur, &dest, &mut buf).unwrap();
        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world!\n");
        // reader fully consumed the padded region
        assert_eq!(cur.position() as usize, archive.len());
    }
}
