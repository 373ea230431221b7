//! The archive installation engine (spec.md §4.I): purges an old package
//! (if any), streams a new one's tar.gz payload entry by entry, classifying
//! each entry as a script, a directory, or a file, and runs pre/post
//! scriptlets at the right points.

use std::fs;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::{trace, warn};

use crate::arena::Id;
use crate::checksum::{Checksum, HashingReader};
use crate::error::InstallError;
use crate::file::{File, FileCursor};
use crate::package::{Package, State};
use crate::script::{Script, ScriptType};
use crate::store::Store;

struct InstallContext {
    pre_slot: ScriptType,
    post_slot: ScriptType,
    cursor: FileCursor,
    file_pkg_tail: Option<Id<File>>,
}

/// The working directory is process-wide state; only one `install_pkg` may
/// hold it redirected to `root` at a time.
static ROOT_CHDIR: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Enters `root` as the process's working directory for the duration of the
/// install/purge phases (spec.md §4.I step 1), so `dir_ref`/`dir_unref`'s
/// relative `mkdir`/`chown`/`rmdir` land in the right place. Restores the
/// previous working directory on drop.
struct CwdGuard {
    saved: fs::File,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl CwdGuard {
    fn enter(root: &Path) -> std::io::Result<Self> {
        let lock = ROOT_CHDIR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let saved = fs::File::open(".")?;
        nix::unistd::chdir(root).map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
        Ok(Self { saved, _lock: lock })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if let Err(err) = nix::unistd::fchdir(self.saved.as_raw_fd()) {
            trace!("failed to restore working directory: {err}");
        }
    }
}

fn entry_path_on_disk(root: &Path, dirname: &str, filename: &str) -> PathBuf {
    if dirname.is_empty() {
        root.join(filename)
    } else {
        root.join(dirname).join(filename)
    }
}

fn find_script(store: &Store, pkg: Id<Package>, kind: ScriptType) -> Option<Script> {
    store.package(pkg).scripts.iter().find(|s| s.kind == kind).cloned()
}

/// Run whichever script of `kind` is bound to `pkg`, if any; `None` if no
/// such script exists, propagating the process failure otherwise.
fn run_script_if_bound(store: &Store, root: &Path, pkg: Id<Package>, kind: ScriptType) -> std::io::Result<()> {
    match find_script(store, pkg, kind) {
        Some(script) => crate::script::run(&script, root),
        None => Ok(()),
    }
}

/// Purge phase (spec.md §4.I step 2): for each owned file, clear ownership,
/// unlink from disk, `dir_unref` its directory. Tolerant of on-disk absence.
fn purge_pkg(store: &mut Store, root: &Path, pkg: Id<Package>) {
    let files: Vec<Id<File>> = store.pkg_files(pkg).collect();

    for file_id in files {
        let (dir, filename) = {
            let f = store.file(file_id);
            (f.dir, f.filename.clone())
        };
        let dirname = store.dir(dir).dirname.clone();
        let path = entry_path_on_disk(root, &dirname, &filename);

        if let Err(err) = fs::remove_file(&path) {
            trace!("unlink {path:?}: {err} (ignored)");
        }

        store.unlink_from_owner(file_id, pkg);
        store.files.get_mut(file_id).owner = None;
        store.stats.files -= 1;
        store.dir_unref(dir);
    }

    store.mark_uninstalled(pkg);
}

fn bind_and_maybe_run_script(
    store: &mut Store,
    root: &Path,
    pkg: Id<Package>,
    ctx: &InstallContext,
    kind: ScriptType,
    data: Vec<u8>,
) -> Result<(), InstallError> {
    store.package_mut(pkg).add_script(kind, data.clone());

    if kind == ScriptType::Generic || kind == ctx.pre_slot {
        let script = Script { kind, data };
        crate::script::run(&script, root).map_err(|_| InstallError::PreScriptFailed {
            package: store.name(store.package(pkg).name).name.clone(),
            version: store.package(pkg).version.clone(),
        })?;
    }
    Ok(())
}

/// Classify and apply one archive entry (spec.md §4.I's "Per-entry
/// classifier"). `read_content` is called at most once, lazily, so
/// directory entries never pay for a read.
fn install_archive_entry(
    store: &mut Store,
    root: &Path,
    pkg: Id<Package>,
    ctx: &mut InstallContext,
    path: &str,
    is_dir: bool,
    symlink_target: Option<&str>,
    mode: u32,
    uid: u32,
    gid: u32,
    mut content: impl std::io::Read,
) -> Result<(), InstallError> {
    if let Some(rest) = path.strip_prefix('.') {
        if rest == "INSTALL" {
            let mut data = Vec::new();
            content.read_to_end(&mut data)?;
            bind_and_maybe_run_script(store, root, pkg, ctx, ScriptType::Generic, data)?;
        }
        return Ok(());
    }

    if let Some(rest) = path.strip_prefix("var/db/apk/") {
        let mut parts = rest.splitn(3, '/');
        if let (Some(_name), Some(_version), Some(scriptname)) = (parts.next(), parts.next(), parts.next()) {
            if let Some(kind) = ScriptType::from_name(scriptname) {
                let mut data = Vec::new();
                content.read_to_end(&mut data)?;
                bind_and_maybe_run_script(store, root, pkg, ctx, kind, data)?;
            }
        }
        return Ok(());
    }

    if is_dir {
        let dirname = path.trim_end_matches('/');
        let dir = store.get_dir(dirname);
        let d = store.dir_mut(dir);
        d.mode = mode & 0o7777;
        d.uid = uid;
        d.gid = gid;
        return Ok(());
    }

    let file_id = store.file_get(path, &mut ctx.cursor);
    if ctx.file_pkg_tail.is_none() {
        ctx.file_pkg_tail = store.package(pkg).owned_files_tail;
    }

    if let Some(owner) = store.file(file_id).owner {
        let owner_name = store.name(store.package(owner).name).name.clone();
        let pkg_name = store.name(store.package(pkg).name).name.clone();
        if owner_name != pkg_name && owner_name != "busybox" {
            return Err(InstallError::FileConflict {
                package: pkg_name,
                path: path.to_owned(),
                owner: owner_name,
            });
        }
    }

    store.file_set_owner(file_id, pkg, true, ctx.file_pkg_tail);
    ctx.file_pkg_tail = Some(file_id);

    let filename = store.file(file_id).filename.clone();
    if filename.starts_with(".keep_") {
        return Ok(());
    }

    let dir_id = store.file(file_id).dir;
    let dirname = store.dir(dir_id).dirname.clone();
    let dest = entry_path_on_disk(root, &dirname, &filename);

    let diverge_to_new = store.dir(dir_id).protected
        && store.file(file_id).csum.is_valid()
        && dest.exists()
        && fs::File::open(&dest)
            .and_then(Checksum::of_reader)
            .map(|on_disk| on_disk != store.file(file_id).csum)
            .unwrap_or(false);

    let target = if diverge_to_new {
        dest.with_file_name(format!("{filename}.apk-new"))
    } else {
        dest
    };

    let new_csum = if let Some(link_target) = symlink_target {
        crate::archive::extract_symlink(link_target, &target)?;
        Checksum::of_bytes(link_target.as_bytes())
    } else {
        crate::archive::extract_regular_file(content, &target, mode, uid, gid)?
    };
    store.files.get_mut(file_id).csum = new_csum;

    Ok(())
}

/// `install_pkg(old, new)` (spec.md §4.I). `archive_path` must be `Some`
/// whenever `new` is `Some` (the caller resolves fetch/local-path lookup
/// via [`crate::repository`] first).
pub fn install_pkg(
    store: &mut Store,
    root: &Path,
    old: Option<Id<Package>>,
    new: Option<Id<Package>>,
    archive_path: Option<&Path>,
) -> Result<(), InstallError> {
    let pre_slot = if old.is_some() { ScriptType::PreUpgrade } else { ScriptType::PreInstall };
    let post_slot = if old.is_some() { ScriptType::PostUpgrade } else { ScriptType::PostInstall };

    // Resolve both paths to absolute ones before changing the working
    // directory below: `root` and `archive_path` are relative to the
    // caller's cwd, not to each other.
    let cwd = std::env::current_dir()?;
    let root = if root.is_relative() { cwd.join(root) } else { root.to_path_buf() };
    let root = root.as_path();
    let archive_path = match archive_path {
        Some(p) if p.is_relative() => Some(cwd.join(p)),
        Some(p) => Some(p.to_path_buf()),
        None => None,
    };

    let _cwd_guard = CwdGuard::enter(root)?;

    if let Some(old_id) = old {
        if new.is_none() {
            run_script_if_bound(store, root, old_id, ScriptType::PreDeinstall).map_err(|_| InstallError::ScriptFailed {
                package: store.name(store.package(old_id).name).name.clone(),
                version: store.package(old_id).version.clone(),
            })?;
        }

        purge_pkg(store, root, old_id);

        if new.is_none() {
            if let Err(err) = run_script_if_bound(store, root, old_id, ScriptType::PostDeinstall) {
                warn!("post-deinstall script failed (ignored): {err}");
            }
            return Ok(());
        }
    }

    let Some(new_id) = new else { return Ok(()) };
    let archive_path = archive_path.ok_or_else(|| {
        InstallError::NoArchiveSource(store.name(store.package(new_id).name).name.clone())
    })?;

    let mut ctx = InstallContext {
        pre_slot,
        post_slot,
        cursor: FileCursor::default(),
        file_pkg_tail: None,
    };

    let file = fs::File::open(&archive_path)?;
    let hashing = HashingReader::new(file);
    let mut archive = tar::Archive::new(GzDecoder::new(hashing));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().trim_start_matches("./").to_string();
        let header = entry.header().clone();
        let mode = header.mode().unwrap_or(0o644);
        let uid = header.uid().unwrap_or(0) as u32;
        let gid = header.gid().unwrap_or(0) as u32;
        let is_dir = header.entry_type().is_dir();
        let symlink_target = if header.entry_type().is_symlink() {
            entry.link_name()?.map(|p| p.to_string_lossy().into_owned())
        } else {
            None
        };

        install_archive_entry(
            store,
            root,
            new_id,
            &mut ctx,
            &path,
            is_dir,
            symlink_target.as_deref(),
            mode,
            uid,
            gid,
            &mut entry,
        )?;
    }

    let total_csum = archive.into_inner()?.into_inner().finish();
    if total_csum != store.package(new_id).csum {
        warn!(
            "{}: archive checksum does not match index entry (entries already written to disk)",
            store.name(store.package(new_id).name).name
        );
    }
    store.mark_installed(new_id);

    if let Err(err) = run_script_if_bound(store, root, new_id, post_slot) {
        warn!("post-install/upgrade script failed (ignored): {err}");
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checksum::Checksum;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn make_archive(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let enc = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(enc);

        let mut header = tar::Header::new_gnu();
        header.set_path("usr/bin/hello").unwrap();
        header.set_size(5);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, &b"hi!\n\n"[..]).unwrap();

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn installs_a_regular_file_and_tracks_owner() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        let archive_path = root.path().join("pkg.apk");
        make_archive(&archive_path);

        let mut store = Store::new();
        let name = store.get_name("hello");
        let csum = Checksum::of_bytes(b"whatever-the-declared-digest-is");
        let pkg = store.pkg_add(Package {
            name,
            version: "1.0".into(),
            csum,
            id: 0,
            repos: 0,
            state: State::NoInstall,
            owned_files_head: None,
            owned_files_tail: None,
            scripts: Vec::new(),
            size: None,
            filename: None,
        });

        install_pkg(&mut store, root.path(), None, Some(pkg), Some(&archive_path)).unwrap();

        assert_eq!(store.package(pkg).state, State::Install);
        assert_eq!(store.pkg_files(pkg).count(), 1);
        assert!(root.path().join("usr/bin/hello").exists());
    }

    #[test]
    fn purge_removes_files_and_unrefs_dirs() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        let archive_path = root.path().join("pkg.apk");
        make_archive(&archive_path);

        let mut store = Store::new();
        let name = store.get_name("hello");
        let pkg = store.pkg_add(Package {
            name,
            version: "1.0".into(),
            csum: Checksum::of_bytes(b"x"),
            id: 0,
            repos: 0,
            state: State::NoInstall,
            owned_files_head: None,
            owned_files_tail: None,
            scripts: Vec::new(),
            size: None,
            filename: None,
        });
        install_pkg(&mut store, root.path(), None, Some(pkg), Some(&archive_path)).unwrap();
        assert!(root.path().join("usr/bin/hello").exists());

        install_pkg(&mut store, root.path(), Some(pkg), None, None).unwrap();
        assert!(!root.path().join("usr/bin/hello").exists());
        assert_eq!(store.pkg_files(pkg).count(), 0);
    }
}
