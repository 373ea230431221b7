//! Directory registry (spec.md §4.C): interns directories by path, each
//! holding mode/uid/gid, a protected flag, a parent back-reference, a file
//! list, and a live reference count.

use log::trace;

use crate::arena::Id;
use crate::file::File;
use crate::store::Store;

/// One rule from the configurable protected-path list: `etc` sets the
/// protected flag for `etc`, `-etc/init.d` clears it for `etc/init.d`.
#[derive(Debug, Clone)]
pub enum ProtectedRule {
    Set(String),
    Clear(String),
}

impl ProtectedRule {
    fn matches(&self, dirname: &str) -> Option<bool> {
        match self {
            ProtectedRule::Set(path) if path == dirname => Some(true),
            ProtectedRule::Clear(path) if path == dirname => Some(false),
            _ => None,
        }
    }
}

/// Parse the colon-separated protected path list (spec.md §4.C / §4.H).
pub fn parse_protected_paths(spec: &str) -> Vec<ProtectedRule> {
    spec.split(':')
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.strip_prefix('-') {
            Some(rest) => ProtectedRule::Clear(rest.to_owned()),
            None => ProtectedRule::Set(entry.to_owned()),
        })
        .collect()
}

#[derive(Debug)]
pub struct Directory {
    /// No trailing slash.
    pub dirname: String,
    pub parent: Option<Id<Directory>>,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub protected: bool,
    pub refs: u32,
    files_head: Option<Id<File>>,
    files_tail: Option<Id<File>>,
}

impl Directory {
    fn root(parent: Option<Id<Directory>>) -> Self {
        Self {
            dirname: String::new(),
            parent,
            mode: 0,
            uid: 0,
            gid: 0,
            protected: false,
            refs: 0,
            files_head: None,
            files_tail: None,
        }
    }

    pub fn files_tail(&self) -> Option<Id<File>> {
        self.files_tail
    }

    pub fn files_head(&self) -> Option<Id<File>> {
        self.files_head
    }

    pub(crate) fn set_files_tail(&mut self, id: Option<Id<File>>) {
        self.files_tail = id;
        if self.files_head.is_none() {
            self.files_head = id;
        }
    }
}

impl Store {
    /// `get_dir`: strip one trailing `/`, look up, else allocate, recursing
    /// to the parent directory and inheriting+adjusting protected flags.
    pub fn get_dir(&mut self, path: &str) -> Id<Directory> {
        let path = path.strip_suffix('/').unwrap_or(path);

        if let Some(id) = self.dirs.get_by_key(&path.to_owned()) {
            return id;
        }

        let parent = if path.is_empty() {
            None
        } else {
            match path.rsplit_once('/') {
                Some((left, _)) => Some(self.get_dir(left)),
                None => Some(self.get_dir("")),
            }
        };

        let mut protected = parent.map(|p| self.dirs.get(p).protected).unwrap_or(false);
        for rule in &self.protected_paths {
            if let Some(value) = rule.matches(path) {
                protected = value;
            }
        }

        let mut dir = Directory::root(parent);
        dir.dirname = path.to_owned();
        dir.protected = protected;

        self.dirs.insert(path.to_owned(), dir)
    }

    pub fn dir(&self, id: Id<Directory>) -> &Directory {
        self.dirs.get(id)
    }

    pub fn dir_mut(&mut self, id: Id<Directory>) -> &mut Directory {
        self.dirs.get_mut(id)
    }

    /// `dir_ref`: recursively bumps the parent first when going 0 -> 1,
    /// creating the directory on disk when `create_disk` is set and the
    /// directory has a non-zero mode. mkdir/chown failures are tolerated.
    pub fn dir_ref(&mut self, id: Id<Directory>, create_disk: bool) -> Id<Directory> {
        let (refs, parent, mode, uid, gid, dirname) = {
            let dir = self.dirs.get(id);
            (dir.refs, dir.parent, dir.mode, dir.uid, dir.gid, dir.dirname.clone())
        };

        if refs == 0 {
            if let Some(parent) = parent {
                self.dir_ref(parent, create_disk);
            }
            if !dirname.is_empty() {
                self.stats.dirs += 1;
            }
            if create_disk && mode != 0 {
                create_directory_on_disk(&dirname, mode, uid, gid);
            }
        }

        self.dirs.get_mut(id).refs += 1;
        id
    }

    /// `dir_unref`: decrement; at 0 attempt rmdir (ignoring failure), then
    /// recurse into the parent.
    pub fn dir_unref(&mut self, id: Id<Directory>) {
        let dir = self.dirs.get_mut(id);
        dir.refs -= 1;
        if dir.refs > 0 {
            return;
        }

        let dirname = dir.dirname.clone();
        let parent = dir.parent;

        if !dirname.is_empty() {
            self.stats.dirs -= 1;
            if let Err(err) = std::fs::remove_dir(&dirname) {
                trace!("rmdir {dirname}: {err} (ignored, directory may be shared)");
            }
        }

        if let Some(parent) = parent {
            self.dir_unref(parent);
        }
    }
}

fn create_directory_on_disk(dirname: &str, mode: u32, uid: u32, gid: u32) {
    use nix::sys::stat::Mode;
    use nix::unistd::{chown, Gid, Uid};

    if let Some(bits) = Mode::from_bits(mode & 0o7777) {
        if let Err(err) = nix::unistd::mkdir(dirname, bits) {
            trace!("mkdir {dirname}: {err} (ignored, may already exist)");
        }
    }
    if let Err(err) = chown(dirname, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))) {
        trace!("chown {dirname}: {err} (ignored)");
    }
}
