//! The in-memory package/name/directory/file graph (spec.md §3), gathering
//! the hash-indexed tables component A-E build on top of.

use crate::arena::{Arena, HashIndex};
use crate::checksum::Checksum;
use crate::dir::{Directory, ProtectedRule};
use crate::file::File;
use crate::name::Name;
use crate::package::{Package, State};

/// Cached cardinality counters; always kept equal to the corresponding set
/// sizes (spec.md §3, invariant 3 in §8).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub packages: usize,
    pub dirs: usize,
    pub files: usize,
}

#[derive(Debug)]
pub struct Store {
    pub(crate) names: HashIndex<String, Name>,
    pub(crate) packages: HashIndex<Checksum, Package>,
    pub(crate) dirs: HashIndex<String, Directory>,
    pub(crate) files: Arena<File>,
    /// Doubly-linked in spec.md; a Vec preserves install-arrival order just
    /// as well and keeps removal (purge) a simple, rare O(n) operation.
    installed_packages: Vec<crate::arena::Id<Package>>,
    pub stats: Stats,
    pub protected_paths: Vec<ProtectedRule>,
    pub pkg_id: u32,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let mut store = Self {
            names: HashIndex::with_capacity(1000),
            packages: HashIndex::with_capacity(4000),
            dirs: HashIndex::with_capacity(1000),
            files: Arena::default(),
            installed_packages: Vec::new(),
            stats: Stats::default(),
            protected_paths: Vec::new(),
            pkg_id: 0,
        };
        // Force-allocate the root directory ("") up front so `parent` links
        // always resolve.
        store.get_dir("");
        store
    }

    pub fn installed_packages(&self) -> &[crate::arena::Id<Package>] {
        &self.installed_packages
    }

    /// Mark `pkg` installed and append it to the installed-packages list;
    /// idempotent if already present.
    pub fn mark_installed(&mut self, pkg: crate::arena::Id<Package>) {
        self.package_mut(pkg).state = State::Install;
        if !self.installed_packages.contains(&pkg) {
            self.installed_packages.push(pkg);
            self.stats.packages += 1;
        }
    }

    /// Mark `pkg` no longer installed, removing it from the installed list
    /// while preserving the arrival order of the rest.
    pub fn mark_uninstalled(&mut self, pkg: crate::arena::Id<Package>) {
        self.package_mut(pkg).state = State::NoInstall;
        if let Some(pos) = self.installed_packages.iter().position(|&id| id == pkg) {
            self.installed_packages.remove(pos);
            self.stats.packages -= 1;
        }
    }

    pub fn available_packages(&self) -> impl Iterator<Item = (crate::arena::Id<Package>, &Package)> {
        self.packages.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_store_has_root_directory() {
        let store = Store::new();
        let root = store.dirs.get_by_key(&String::new());
        assert!(root.is_some());
    }
}
