//! Package entity (spec.md §3, §4.E) and the package-info line format FDB
//! delegates to (spec.md §4.F): the `N`/`V`/`C`/`S` fields shared between a
//! repository index and an installed-database record.

use crate::arena::Id;
use crate::checksum::{Checksum, BAD_CHECKSUM};
use crate::error::PackageInfoError;
use crate::file::File;
use crate::name::Name;
use crate::script::Script;
use crate::store::Store;

/// Install-state of a [`Package`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NoInstall,
    Install,
}

#[derive(Debug)]
pub struct Package {
    pub name: Id<Name>,
    pub version: String,
    /// Primary key.
    pub csum: Checksum,
    pub id: u32,
    /// Bitset of repository indices that advertise this package.
    pub repos: u64,
    pub state: State,
    pub owned_files_head: Option<Id<File>>,
    pub owned_files_tail: Option<Id<File>>,
    pub scripts: Vec<Script>,
    /// Informational, carried through round-trips when present (`S:`).
    pub size: Option<u64>,
    /// Set when the archive bytes are already resident on disk locally;
    /// otherwise install synthesises `<repo>/<name>-<version>.apk`.
    pub filename: Option<String>,
}

impl Package {
    pub fn add_script(&mut self, kind: crate::script::ScriptType, data: Vec<u8>) {
        self.scripts.push(Script { kind, data });
    }
}

impl Store {
    pub fn package(&self, id: Id<Package>) -> &Package {
        self.packages.get(id)
    }

    pub fn package_mut(&mut self, id: Id<Package>) -> &mut Package {
        self.packages.get_mut(id)
    }

    pub fn get_pkg(&self, csum: Checksum) -> Option<Id<Package>> {
        self.packages.get_by_key(&csum)
    }

    /// `pkg_add`: on checksum miss, assigns an id and inserts; on hit, ORs
    /// the new repository bitset into the existing entry and discards the
    /// incoming one. Returns the canonical id either way.
    pub fn pkg_add(&mut self, mut new: Package) -> Id<Package> {
        if let Some(existing) = self.get_pkg(new.csum) {
            self.package_mut(existing).repos |= new.repos;
            return existing;
        }

        new.id = self.pkg_id;
        self.pkg_id += 1;

        let name = new.name;
        let id = self.packages.insert(new.csum, new);
        self.name_mut(name).pkgs.push(id);
        id
    }
}

/// Incrementally-built package-info record, shared by the repository-index
/// reader and the installed FDB reader (spec.md §4.F step 3-4).
#[derive(Debug, Default)]
pub struct PendingInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub csum: Option<Checksum>,
    pub size: Option<u64>,
}

impl PendingInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.version.is_none() && self.csum.is_none() && self.size.is_none()
    }

    /// `pkg_add_info`: consume one `tag:payload` line. Returns `true` if the
    /// field was recognised as package-info (so the FDB reader should
    /// continue to the next line), `false` if it's not one of ours and the
    /// caller should try its own (FDB-specific) tags.
    pub fn add_info(&mut self, field: char, payload: &str) -> Result<bool, PackageInfoError> {
        match field {
            'N' => {
                self.name = Some(payload.to_owned());
                Ok(true)
            }
            'V' => {
                self.version = Some(payload.to_owned());
                Ok(true)
            }
            'C' => {
                self.csum = Some(Checksum::from_hex(payload)?);
                Ok(true)
            }
            'S' => {
                let size = payload.parse::<u64>().map_err(|_| PackageInfoError::Size(payload.to_owned()))?;
                self.size = Some(size);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn into_package(self, store: &mut Store) -> Option<Package> {
        let name = self.name?;
        let version = self.version?;
        let csum = self.csum.unwrap_or(BAD_CHECKSUM);
        let name = store.get_name(&name);

        Some(Package {
            name,
            version,
            csum,
            id: 0,
            repos: 0,
            state: State::NoInstall,
            owned_files_head: None,
            owned_files_tail: None,
            scripts: Vec::new(),
            size: self.size,
            filename: None,
        })
    }
}

/// `apk_pkg_format_index_entry`: emit the `N:`/`V:`/`C:`/`S:` lines for one
/// package, terminated without a trailing blank line (the caller adds FDB
/// lines or the record-terminating blank line itself).
pub fn format_index_entry(name: &str, version: &str, csum: Checksum, size: Option<u64>) -> String {
    let mut out = format!("N:{name}\nV:{version}\n");
    if csum.is_valid() {
        out.push_str(&format!("C:{}\n", csum.to_hex()));
    }
    if let Some(size) = size {
        out.push_str(&format!("S:{size}\n"));
    }
    out
}
