//! The `Database` facade (spec.md §4.H): the single entry point gluing the
//! graph (`Store`), the on-disk FDB/script stores, repositories, the
//! resolver and the install engine together.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::arena::Id;
use crate::checksum::Checksum;
use crate::error::DbError;
use crate::package::{Package, State};
use crate::store::Store;
use crate::{archive, config, dir, fdb, install, repository, resolve, scriptdb};

/// Repository bitsets are a fixed-width `u64`, so at most this many
/// repositories can ever be distinguished (spec.md §3/§9).
pub const MAX_REPOS: usize = 8;

const WORLD_PATH: &str = "var/lib/apk/world";
const INSTALLED_PATH: &str = "var/lib/apk/installed";
const SCRIPTS_PATH: &str = "var/lib/apk/scripts";
const REPOSITORIES_PATH: &str = "etc/apk/repositories";
const DEFAULT_PROTECTED_PATHS: &str = "etc:-etc/init.d";

pub struct Database {
    pub store: Store,
    root: PathBuf,
    repositories: Vec<String>,
}

fn create_dev_null(path: &Path) -> io::Result<()> {
    use nix::sys::stat::{makedev, mknod, Mode, SFlag};

    match mknod(path, SFlag::S_IFCHR, Mode::from_bits_truncate(0o666), makedev(1, 3)) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(err) => Err(io::Error::from_raw_os_error(err as i32)),
    }
}

fn parse_pkginfo(data: &str) -> (Option<String>, Option<String>, Option<u64>) {
    let mut name = None;
    let mut version = None;
    let mut size = None;

    for line in data.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "pkgname" => name = Some(value.trim().to_owned()),
                "pkgver" => version = Some(value.trim().to_owned()),
                "size" => size = value.trim().parse().ok(),
                _ => {}
            }
        }
    }
    (name, version, size)
}

impl Database {
    /// `apk_db_create`: lay out a fresh root (`tmp`, `dev`, `var/lib/apk`,
    /// `etc/apk`, `dev/null`, a default `world`), then open it.
    pub fn create(root: &Path) -> Result<Self, DbError> {
        for subdir in ["tmp", "dev", "var/lib/apk", "etc/apk"] {
            fs::create_dir_all(root.join(subdir))?;
        }
        create_dev_null(&root.join("dev/null"))?;

        let world: Vec<String> = config::DEFAULT_WORLD.iter().map(|s| s.to_string()).collect();
        config::write_world(&root.join(WORLD_PATH), &world)?;

        info!("created database root at {}", root.display());
        Self::open(root)
    }

    /// `apk_db_open`: requires a prior `create` (signalled by `world`
    /// existing); loads the installed FDB, scripts, and repository list.
    pub fn open(root: &Path) -> Result<Self, DbError> {
        if !root.join(WORLD_PATH).exists() {
            return Err(DbError::MissingWorld);
        }

        let mut store = Store::new();
        store.protected_paths = dir::parse_protected_paths(DEFAULT_PROTECTED_PATHS);

        let installed_path = root.join(INSTALLED_PATH);
        if installed_path.exists() {
            fdb::read_installed(&mut store, fs::File::open(&installed_path)?)?;
        }

        let scripts_path = root.join(SCRIPTS_PATH);
        if scripts_path.exists() {
            scriptdb::read_scripts(&mut store, fs::File::open(&scripts_path)?)?;
        }

        let repositories = config::read_repositories(&root.join(REPOSITORIES_PATH))?;
        if repositories.len() > MAX_REPOS {
            return Err(DbError::TooManyRepositories(MAX_REPOS));
        }

        info!(
            "opened database at {} ({} packages installed, {} repositories)",
            root.display(),
            store.installed_packages().len(),
            repositories.len()
        );

        Ok(Self {
            store,
            root: root.to_owned(),
            repositories,
        })
    }

    pub fn world_path(&self) -> PathBuf {
        self.root.join(WORLD_PATH)
    }

    /// `apk_db_add_repository`: fetch and parse `<url>/APK_INDEX.gz`,
    /// tagging every package it advertises with this repository's bit.
    pub fn add_repository(&mut self, url: &str, scratch_dir: &Path) -> Result<(), DbError> {
        if self.repositories.len() >= MAX_REPOS {
            return Err(DbError::TooManyRepositories(MAX_REPOS));
        }

        let idx = self.repositories.len();
        let fetched =
            repository::fetch_index(url, idx, scratch_dir).map_err(|err| DbError::RepositoryIndex(url.to_owned(), err))?;
        let gz = repository::open_gz(&fetched).map_err(|err| DbError::RepositoryIndex(url.to_owned(), Box::new(err)))?;
        fdb::read_index(&mut self.store, gz, idx as u32)?;

        self.repositories.push(url.to_owned());
        info!("added repository {url} (index {idx})");
        Ok(())
    }

    /// `apk_db_write_config`: persist the repository list.
    pub fn write_config(&self) -> Result<(), DbError> {
        config::write_repositories(&self.root.join(REPOSITORIES_PATH), &self.repositories)?;
        Ok(())
    }

    pub fn get_pkg(&self, csum: Checksum) -> Option<Id<Package>> {
        self.store.get_pkg(csum)
    }

    /// `pkg_read`/`apk_db_pkg_add_file`: register a package straight from a
    /// local `.apk` by reading its `.PKGINFO` entry, without a repository.
    pub fn pkg_add_file(&mut self, archive_path: &Path) -> Result<Id<Package>, DbError> {
        let mut archive = archive::open_tar_gz(archive_path)?;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().trim_start_matches("./").to_string();
            if path != ".PKGINFO" {
                continue;
            }

            let mut data = String::new();
            entry.read_to_string(&mut data)?;
            let (name, version, size) = parse_pkginfo(&data);

            let name = name.ok_or_else(|| DbError::NoSuchPackage(archive_path.display().to_string()))?;
            let version = version.unwrap_or_default();
            let csum = Checksum::of_reader(fs::File::open(archive_path)?)?;
            let name_id = self.store.get_name(&name);

            let pkg = self.store.pkg_add(Package {
                name: name_id,
                version,
                csum,
                id: 0,
                repos: 0,
                state: State::NoInstall,
                owned_files_head: None,
                owned_files_tail: None,
                scripts: Vec::new(),
                size,
                filename: Some(archive_path.to_string_lossy().into_owned()),
            });
            return Ok(pkg);
        }

        Err(DbError::NoSuchPackage(archive_path.display().to_string()))
    }

    /// `apk_db_index_write`: emit a repository index for everything tagged
    /// with `repo`'s bit.
    pub fn index_write(&self, repo: u32, out: impl Write) -> Result<(), DbError> {
        fdb::write_index(&self.store, repo, out)?;
        Ok(())
    }

    fn archive_path_for(&self, pkg: Id<Package>, scratch_dir: &Path) -> Result<PathBuf, DbError> {
        let p = self.store.package(pkg);
        if let Some(filename) = &p.filename {
            return Ok(PathBuf::from(filename));
        }

        let repo_idx = (0..self.repositories.len())
            .find(|&i| p.repos & (1 << i) != 0)
            .ok_or_else(|| DbError::NoSuchPackage(self.store.name(p.name).name.clone()))?;
        let repo = self.repositories[repo_idx].clone();
        let name = self.store.name(p.name).name.clone();
        let version = p.version.clone();

        let fetched = repository::fetch_package(&repo, &name, &version, scratch_dir)
            .map_err(|err| DbError::RepositoryIndex(repo.clone(), err))?;
        Ok(fetched.path().to_owned())
    }

    fn write_installed_state(&self) -> Result<(), DbError> {
        fdb::write_installed(&self.store, fs::File::create(self.root.join(INSTALLED_PATH))?)?;
        scriptdb::write_scripts(&self.store, fs::File::create(self.root.join(SCRIPTS_PATH))?)?;
        Ok(())
    }

    /// `apk_db_recalculate_and_commit`: resolve `world`, purge packages no
    /// longer wanted, install/upgrade the rest, then persist everything.
    pub fn recalculate_and_commit(&mut self, world: &[String], scratch_dir: &Path) -> Result<(), DbError> {
        let resolved = resolve::solve_world(&self.store, world)?;

        let currently_installed = self.store.installed_packages().to_vec();

        for &old_id in &currently_installed {
            let name = self.store.package(old_id).name;
            let still_wanted = resolved.iter().any(|&r| self.store.package(r).name == name);
            if !still_wanted {
                install::install_pkg(&mut self.store, &self.root, Some(old_id), None, None)?;
            }
        }

        for &new_id in &resolved {
            if self.store.package(new_id).state == State::Install {
                continue;
            }
            let name = self.store.package(new_id).name;
            let old = currently_installed
                .iter()
                .copied()
                .find(|&id| self.store.package(id).name == name);

            let archive_path = self.archive_path_for(new_id, scratch_dir)?;
            install::install_pkg(&mut self.store, &self.root, old, Some(new_id), Some(&archive_path))?;
        }

        self.write_installed_state()?;
        self.write_config()?;

        info!(
            "commit complete: {} packages installed",
            self.store.installed_packages().len()
        );
        Ok(())
    }

    /// `apk_db_close`: nothing further to flush - `recalculate_and_commit`
    /// already persists state after every change.
    pub fn close(self) {
        info!("closing database at {}", self.root.display());
    }
}
