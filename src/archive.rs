//! Low-level tar.gz mechanics the install engine builds on (spec.md §4.I
//! `archive_entry_extract`/`parse_tar_gz`): opening the stream, and writing
//! one entry's bytes to disk while tracking its checksum. Entry
//! classification (what an entry *means* - a script, a directory, a
//! protected file) lives in [`crate::install`].

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use flate2::read::GzDecoder;
use nix::unistd::{chown, Gid, Uid};
use tar::Archive;

use crate::checksum::{Checksum, HashingReader};

pub fn open_tar_gz(path: &Path) -> io::Result<Archive<GzDecoder<fs::File>>> {
    let file = fs::File::open(path)?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Stream `entry`'s contents to `dest`, returning the checksum of what was
/// written. `dest`'s parent directory must already exist.
pub fn extract_regular_file<R: Read>(entry: R, dest: &Path, mode: u32, uid: u32, gid: u32) -> io::Result<Checksum> {
    let mut out = fs::File::create(dest)?;
    let mut hashing = HashingReader::new(entry);
    io::copy(&mut hashing, &mut out)?;
    let csum = hashing.finish();

    fs::set_permissions(dest, fs::Permissions::from_mode(mode & 0o7777))?;
    let _ = chown(dest, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)));

    Ok(csum)
}

/// Replace whatever is at `dest` (if anything) with a symlink to `target`.
pub fn extract_symlink(target: &str, dest: &Path) -> io::Result<()> {
    let _ = fs::remove_file(dest);
    std::os::unix::fs::symlink(target, dest)
}
