//! File entities (spec.md §4.D): a file owned inside a directory, with two
//! intrusive list memberships (per-directory, per-package) modeled as
//! explicit prev/next [`Id`] links rather than raw pointers (spec.md §9).

use crate::arena::Id;
use crate::checksum::{Checksum, BAD_CHECKSUM};
use crate::dir::Directory;
use crate::package::Package;
use crate::store::Store;

#[derive(Debug)]
pub struct File {
    pub filename: String,
    pub dir: Id<Directory>,
    pub owner: Option<Id<Package>>,
    pub csum: Checksum,
    dir_prev: Option<Id<File>>,
    dir_next: Option<Id<File>>,
    pkg_prev: Option<Id<File>>,
    pkg_next: Option<Id<File>>,
}

/// The one-slot directory cache + tail cursors an install or FDB-read pass
/// carries across consecutive entries that typically share a directory
/// (spec.md §4.D).
#[derive(Debug, Default)]
pub struct FileCursor {
    pub dircache: Option<Id<Directory>>,
    pub file_dir_tail: Option<Id<File>>,
}

impl Store {
    pub fn file(&self, id: Id<File>) -> &File {
        self.files.get(id)
    }

    /// `file_new`: allocate and link into `dir.files` at the tail given by
    /// the caller (O(1) append during sequential loads).
    pub fn file_new(&mut self, dir: Id<Directory>, name: &str, after: Option<Id<File>>) -> Id<File> {
        let id = self.files.insert(File {
            filename: name.to_owned(),
            dir,
            owner: None,
            csum: BAD_CHECKSUM,
            dir_prev: after,
            dir_next: None,
            pkg_prev: None,
            pkg_next: None,
        });

        match after {
            Some(prev) => self.files.get_mut(prev).dir_next = Some(id),
            None => {}
        }
        self.dir_mut(dir).set_files_tail(Some(id));

        id
    }

    /// Iterate a directory's files in list order.
    pub fn dir_files(&self, dir: Id<Directory>) -> impl Iterator<Item = Id<File>> + '_ {
        let mut cur = self.dir(dir).files_head();
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.files.get(id).dir_next;
            Some(id)
        })
    }

    /// Iterate a package's owned files in list order (the order
    /// `file_set_owner` calls happened in).
    pub fn pkg_files(&self, pkg: Id<Package>) -> impl Iterator<Item = Id<File>> + '_ {
        let mut cur = self.package(pkg).owned_files_head;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.files.get(id).pkg_next;
            Some(id)
        })
    }

    /// `file_set_owner`: rebind a file to a new owner, unlinking it from any
    /// prior owner's list first; creates missing parent directories on disk
    /// when `create_disk` is set.
    pub fn file_set_owner(&mut self, file: Id<File>, pkg: Id<Package>, create_disk: bool, after: Option<Id<File>>) {
        let prior_owner = self.files.get(file).owner;

        if let Some(prior) = prior_owner {
            self.unlink_from_owner(file, prior);
        } else {
            self.stats.files += 1;
        }

        let dir = self.files.get(file).dir;
        let dir = self.dir_ref(dir, create_disk);

        self.files.get_mut(file).dir = dir;
        self.files.get_mut(file).owner = Some(pkg);
        self.files.get_mut(file).pkg_prev = after;
        self.files.get_mut(file).pkg_next = None;

        match after {
            Some(prev) => self.files.get_mut(prev).pkg_next = Some(file),
            None => {}
        }
        if self.package(pkg).owned_files_head.is_none() {
            self.package_mut(pkg).owned_files_head = Some(file);
        }
        self.package_mut(pkg).owned_files_tail = Some(file);
    }

    /// Remove `file` from `owner`'s owned-files list without touching its
    /// directory membership (used both by rebinding and by purge).
    pub(crate) fn unlink_from_owner(&mut self, file: Id<File>, owner: Id<Package>) {
        let (prev, next) = {
            let f = self.files.get(file);
            (f.pkg_prev, f.pkg_next)
        };

        match prev {
            Some(prev) => self.files.get_mut(prev).pkg_next = next,
            None => self.package_mut(owner).owned_files_head = next,
        }
        match next {
            Some(next) => self.files.get_mut(next).pkg_prev = prev,
            None => self.package_mut(owner).owned_files_tail = prev,
        }

        let f = self.files.get_mut(file);
        f.pkg_prev = None;
        f.pkg_next = None;
    }

    /// `file_get`: split at the last `/`, reuse the cursor's directory cache
    /// when it matches, otherwise resolve via `get_dir`; linear-scan the
    /// directory's file list and allocate on miss.
    pub fn file_get(&mut self, path: &str, cursor: &mut FileCursor) -> Id<File> {
        let (dirname, filename) = match path.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", path),
        };

        let dir = match cursor.dircache {
            Some(cached) if self.dir(cached).dirname == dirname => cached,
            _ => self.get_dir(dirname),
        };

        if cursor.dircache != Some(dir) {
            cursor.dircache = Some(dir);
            cursor.file_dir_tail = self.dir(dir).files_tail();
        }

        if let Some(existing) = self.dir_files(dir).find(|&id| self.files.get(id).filename == filename) {
            return existing;
        }

        let id = self.file_new(dir, filename, cursor.file_dir_tail);
        cursor.file_dir_tail = Some(id);
        id
    }
}
