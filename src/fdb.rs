//! The line-oriented "file database" format (spec.md §4.F): both the
//! persisted installed-package database and a repository index share this
//! wire format, differing only in which tags are legal.
//!
//! A record is a run of `tag:payload` lines terminated by a blank (or
//! otherwise malformed, two-byte-or-shorter) line. `N`/`V`/`C`/`S` carry
//! package info and are legal in both modes; `F`/`M`/`R`/`Z` carry directory
//! and file entries and are only legal when reading an installed database
//! (a repository index never lists files).

use std::io::{BufRead, BufReader, Read, Write};

use crate::arena::Id;
use crate::checksum::{Checksum, BAD_CHECKSUM};
use crate::error::FdbError;
use crate::file::FileCursor;
use crate::package::{format_index_entry, Package, PendingInfo, State};
use crate::store::Store;

/// Read an installed-package database stream, populating `store` and
/// marking every record's package installed.
pub fn read_installed<R: Read>(store: &mut Store, reader: R) -> Result<(), FdbError> {
    read_fdb(store, reader, None)
}

/// Read a repository index stream, tagging every package it advertises with
/// `repo`'s bit. Duplicate checksums across repositories are expected and
/// simply OR their bits together.
pub fn read_index<R: Read>(store: &mut Store, reader: R, repo: u32) -> Result<(), FdbError> {
    read_fdb(store, reader, Some(repo))
}

fn parse_mode_line(payload: &str) -> Result<(u32, u32, u32), FdbError> {
    let mut parts = payload.split(':');
    let uid = parts.next().and_then(|s| s.parse().ok());
    let gid = parts.next().and_then(|s| s.parse().ok());
    let mode = parts.next().and_then(|s| u32::from_str_radix(s, 8).ok());
    match (uid, gid, mode) {
        (Some(uid), Some(gid), Some(mode)) => Ok((uid, gid, mode)),
        _ => Err(FdbError::BadModeLine(payload.to_owned())),
    }
}

fn read_fdb<R: Read>(store: &mut Store, reader: R, repo: Option<u32>) -> Result<(), FdbError> {
    let mut lines = BufReader::new(reader);
    let mut raw = Vec::new();

    let mut pkg: Option<Id<Package>> = None;
    let mut info = PendingInfo::default();
    let mut name_seen = false;
    let mut cursor = FileCursor::default();
    let mut file: Option<Id<crate::file::File>> = None;
    let mut pkg_file_tail: Option<Id<crate::file::File>> = None;

    loop {
        raw.clear();
        let n = lines.read_until(b'\n', &mut raw)?;
        if n == 0 {
            break;
        }
        while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
            raw.pop();
        }
        let line = String::from_utf8_lossy(&raw).into_owned();

        if line.len() < 2 || line.as_bytes()[1] != b':' {
            if let Some(id) = pkg.take() {
                finalize_record(store, id, repo, &info)?;
            }
            info = PendingInfo::default();
            name_seen = false;
            file = None;
            pkg_file_tail = None;
            cursor = FileCursor::default();
            continue;
        }

        let tag = line.as_bytes()[0] as char;
        let payload = &line[2..];

        let pkg_id = *pkg.get_or_insert_with(|| new_pending_package(store));

        if info.add_info(tag, payload)? {
            if tag == 'N' {
                name_seen = true;
            }
            continue;
        }

        if repo.is_some() {
            return Err(FdbError::UnsupportedTag(tag));
        }

        match tag {
            'F' => {
                if !name_seen {
                    return Err(FdbError::DirBeforePackage);
                }
                let dir = store.get_dir(payload);
                cursor.dircache = Some(dir);
                cursor.file_dir_tail = store.dir(dir).files_tail();
                file = None;
            }
            'M' => {
                let dir = cursor.dircache.ok_or(FdbError::ModeBeforeDir)?;
                let (uid, gid, mode) = parse_mode_line(payload)?;
                let d = store.dir_mut(dir);
                d.uid = uid;
                d.gid = gid;
                d.mode = mode;
            }
            'R' => {
                let dir = cursor.dircache.ok_or(FdbError::FileBeforeDir)?;
                let id = store.file_new(dir, payload, cursor.file_dir_tail);
                cursor.file_dir_tail = Some(id);
                store.file_set_owner(id, pkg_id, false, pkg_file_tail);
                pkg_file_tail = Some(id);
                file = Some(id);
            }
            'Z' => {
                let id = file.ok_or(FdbError::ChecksumBeforeFile)?;
                let csum = Checksum::from_hex(payload).map_err(|_| FdbError::BadChecksum(payload.to_owned()))?;
                store.files.get_mut(id).csum = csum;
            }
            other => return Err(FdbError::UnsupportedTag(other)),
        }
    }

    if let Some(id) = pkg.take() {
        finalize_record(store, id, repo, &info)?;
    }

    Ok(())
}

fn new_pending_package(store: &mut Store) -> Id<Package> {
    let placeholder_name = store.get_name("");
    store.packages.insert_without_key(Package {
        name: placeholder_name,
        version: String::new(),
        csum: BAD_CHECKSUM,
        id: 0,
        repos: 0,
        state: State::NoInstall,
        owned_files_head: None,
        owned_files_tail: None,
        scripts: Vec::new(),
        size: None,
        filename: None,
    })
}

/// `pkg_add` for a record whose `Id<Package>` was allocated before its
/// checksum was known: fill the real fields in, then key it (or merge into
/// whatever package already holds this checksum).
fn finalize_record(store: &mut Store, id: Id<Package>, repo: Option<u32>, info: &PendingInfo) -> Result<(), FdbError> {
    let name = info.name.clone().ok_or(FdbError::MissingName)?;
    let version = info.version.clone().unwrap_or_default();
    let csum = info.csum.unwrap_or(BAD_CHECKSUM);
    let name_id = store.get_name(&name);

    {
        let p = store.package_mut(id);
        p.name = name_id;
        p.version = version;
        p.csum = csum;
        p.size = info.size;
        if let Some(r) = repo {
            p.repos |= 1u64 << r;
        }
    }

    if let Some(canonical) = store.get_pkg(csum) {
        if canonical != id {
            let incoming_repos = store.package(id).repos;
            store.package_mut(canonical).repos |= incoming_repos;
            if repo.is_none() {
                return Err(FdbError::DuplicatePackage(name));
            }
            return Ok(());
        }
    }

    let pkg_id = store.pkg_id;
    store.pkg_id += 1;
    store.package_mut(id).id = pkg_id;
    store.packages.key(csum, id);
    store.name_mut(name_id).pkgs.push(id);

    if repo.is_none() {
        store.mark_installed(id);
    }

    Ok(())
}

/// Write the installed-package database: one record per installed package,
/// in install order, each terminated by a blank line. `F:`/`M:` are only
/// emitted when the directory changes from the previous file.
pub fn write_installed<W: Write>(store: &Store, mut out: W) -> Result<(), FdbError> {
    for &pkg_id in store.installed_packages() {
        let pkg = store.package(pkg_id);
        let name = store.name(pkg.name).name.clone();
        out.write_all(format_index_entry(&name, &pkg.version, pkg.csum, pkg.size).as_bytes())?;

        let mut last_dir = None;
        for file_id in store.pkg_files(pkg_id) {
            let f = store.file(file_id);
            if last_dir != Some(f.dir) {
                let d = store.dir(f.dir);
                writeln!(out, "F:{}", d.dirname)?;
                writeln!(out, "M:{}:{}:{:o}", d.uid, d.gid, d.mode)?;
                last_dir = Some(f.dir);
            }
            writeln!(out, "R:{}", f.filename)?;
            if f.csum.is_valid() {
                writeln!(out, "Z:{}", f.csum.to_hex())?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write a repository index: `N`/`V`/`C`/`S` only, one record per package
/// advertised under `repo`'s bit.
pub fn write_index<W: Write>(store: &Store, repo: u32, mut out: W) -> Result<(), FdbError> {
    let bit = 1u64 << repo;
    for (_, pkg) in store.available_packages() {
        if pkg.repos & bit == 0 {
            continue;
        }
        let name = store.name(pkg.name).name.clone();
        out.write_all(format_index_entry(&name, &pkg.version, pkg.csum, pkg.size).as_bytes())?;
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_installed_database() {
        let mut store = Store::new();
        let data = "N:busybox\nV:1.36.0\nC:deadbeefcafebabe0000000000000000000000000000000000000000000000a5\n\
                     F:usr/bin\nM:0:0:755\nR:busybox\nZ:deadbeefcafebabe0000000000000000000000000000000000000000000000a5\n\n";
        read_installed(&mut store, data.as_bytes()).unwrap();

        assert_eq!(store.installed_packages().len(), 1);
        let pkg = store.installed_packages()[0];
        assert_eq!(store.name(store.package(pkg).name).name, "busybox");
        assert_eq!(store.pkg_files(pkg).count(), 1);

        let mut out = Vec::new();
        write_installed(&store, &mut out).unwrap();
        let rewritten = String::from_utf8(out).unwrap();
        assert!(rewritten.contains("N:busybox"));
        assert!(rewritten.contains("R:busybox"));
    }

    #[test]
    fn rejects_file_entry_before_directory() {
        let mut store = Store::new();
        let data = "N:busybox\nV:1.0\nR:busybox\n\n";
        let err = read_installed(&mut store, data.as_bytes()).unwrap_err();
        assert!(matches!(err, FdbError::FileBeforeDir));
    }

    #[test]
    fn rejects_directory_entry_before_name() {
        let mut store = Store::new();
        let data = "F:usr/bin\n\n";
        let err = read_installed(&mut store, data.as_bytes()).unwrap_err();
        assert!(matches!(err, FdbError::DirBeforePackage));
    }

    #[test]
    fn index_mode_rejects_file_tags() {
        let mut store = Store::new();
        let data = "N:busybox\nV:1.0\nF:usr/bin\n\n";
        let err = read_index(&mut store, data.as_bytes(), 0).unwrap_err();
        assert!(matches!(err, FdbError::UnsupportedTag('F')));
    }

    #[test]
    fn index_duplicates_merge_repo_bits() {
        let mut store = Store::new();
        let data = "N:busybox\nV:1.0\nC:deadbeefcafebabe0000000000000000000000000000000000000000000000a5\n\n";
        read_index(&mut store, data.as_bytes(), 0).unwrap();
        read_index(&mut store, data.as_bytes(), 1).unwrap();

        assert_eq!(store.available_packages().count(), 1);
        let (_, pkg) = store.available_packages().next().unwrap();
        assert_eq!(pkg.repos, 0b11);
    }

    #[test]
    fn installed_duplicate_checksum_is_an_error() {
        let mut store = Store::new();
        let data = "N:a\nV:1.0\nC:deadbeefcafebabe0000000000000000000000000000000000000000000000a5\n\n\
                     N:b\nV:1.0\nC:deadbeefcafebabe0000000000000000000000000000000000000000000000a5\n\n";
        let err = read_installed(&mut store, data.as_bytes()).unwrap_err();
        assert!(matches!(err, FdbError::DuplicatePackage(_)));
    }

    #[test]
    fn directory_is_refed_once_per_file_not_once_per_mode_line() {
        let mut store = Store::new();
        let data = "N:busybox\nV:1.36.0\nC:deadbeefcafebabe0000000000000000000000000000000000000000000000a5\n\
                     F:usr/bin\nM:0:0:755\nR:a\nR:b\n\n";
        read_installed(&mut store, data.as_bytes()).unwrap();

        let usr_bin = store.get_dir("usr/bin");
        assert_eq!(store.dir(usr_bin).refs, 2);
        assert_eq!(store.stats.dirs, 2); // usr/bin, usr
    }
}
