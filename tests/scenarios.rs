//! End-to-end scenarios against the in-memory graph, the FDB format, and
//! the install engine, mirroring the literal S1-S6 walkthroughs.

use std::fs;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::tempdir;

use apkg::checksum::Checksum;
use apkg::install::install_pkg;
use apkg::package::{Package, State};
use apkg::store::Store;

fn build_archive(path: &Path, files: &[(&str, &[u8])], dirs: &[&str]) {
    let file = fs::File::create(path).unwrap();
    let enc = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(enc);

    for dirname in dirs {
        let mut header = tar::Header::new_gnu();
        header.set_path(format!("{dirname}/")).unwrap();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, std::io::empty()).unwrap();
    }

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, *content).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
}

fn add_pkg(store: &mut Store, name: &str, version: &str) -> apkg::arena::Id<Package> {
    let name_id = store.get_name(name);
    store.pkg_add(Package {
        name: name_id,
        version: version.to_owned(),
        csum: Checksum::of_bytes(format!("{name}-{version}").as_bytes()),
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

/// S1 - Initialise and install one package.
#[test]
fn s1_install_one_package() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("usr/bin")).unwrap();

    let archive_path = root.path().join("pkg-a-1.0.apk");
    build_archive(&archive_path, &[("usr/bin/a", b"#!/bin/sh\n")], &["usr/bin"]);

    let mut store = Store::new();
    let pkg = add_pkg(&mut store, "pkg-a", "1.0");

    install_pkg(&mut store, root.path(), None, Some(pkg), Some(&archive_path)).unwrap();

    assert_eq!(store.installed_packages().len(), 1);
    assert_eq!(store.stats.packages, 1);
    assert_eq!(store.stats.files, 1);
    assert_eq!(store.stats.dirs, 2); // usr, usr/bin
    assert!(root.path().join("usr/bin/a").exists());
}

/// S2 - Upgrade replaces files and preserves protected modifications.
#[test]
fn s2_upgrade_preserves_protected_modification() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("etc")).unwrap();

    let v1 = root.path().join("pkg-b-1.0.apk");
    build_archive(&v1, &[("etc/b.conf", b"default=1\n")], &[]);

    let mut store = Store::new();
    store.protected_paths = apkg::dir::parse_protected_paths("etc");
    let pkg_b1 = add_pkg(&mut store, "pkg-b", "1.0");
    install_pkg(&mut store, root.path(), None, Some(pkg_b1), Some(&v1)).unwrap();

    // Operator edits the installed file; its digest now diverges from the
    // recorded one.
    fs::write(root.path().join("etc/b.conf"), b"operator-edited\n").unwrap();

    let v2 = root.path().join("pkg-b-2.0.apk");
    build_archive(&v2, &[("etc/b.conf", b"default=2, much longer\n")], &[]);
    let pkg_b2 = add_pkg(&mut store, "pkg-b", "2.0");

    install_pkg(&mut store, root.path(), Some(pkg_b1), Some(pkg_b2), Some(&v2)).unwrap();

    assert_eq!(fs::read(root.path().join("etc/b.conf")).unwrap(), b"operator-edited\n");
    assert_eq!(
        fs::read(root.path().join("etc/b.conf.apk-new")).unwrap(),
        b"default=2, much longer\n"
    );
}

/// S3 - Purge removes files and empty directories.
#[test]
fn s3_purge_removes_files_and_directories() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("opt/c/bin")).unwrap();

    let archive_path = root.path().join("pkg-c-1.0.apk");
    build_archive(&archive_path, &[("opt/c/bin/c", b"binary")], &["opt", "opt/c", "opt/c/bin"]);

    let mut store = Store::new();
    let pkg = add_pkg(&mut store, "pkg-c", "1.0");
    install_pkg(&mut store, root.path(), None, Some(pkg), Some(&archive_path)).unwrap();
    assert!(root.path().join("opt/c/bin/c").exists());

    install_pkg(&mut store, root.path(), Some(pkg), None, None).unwrap();

    assert!(!root.path().join("opt/c/bin/c").exists());
    assert_eq!(store.stats, apkg::store::Stats::default());
}

/// S4 - Conflict aborts install.
#[test]
fn s4_conflict_aborts_install() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("usr/bin")).unwrap();

    let d_archive = root.path().join("pkg-d-1.0.apk");
    build_archive(&d_archive, &[("usr/bin/x", b"d's binary")], &[]);
    let e_archive = root.path().join("pkg-e-1.0.apk");
    build_archive(&e_archive, &[("usr/bin/x", b"e's binary")], &[]);

    let mut store = Store::new();
    let pkg_d = add_pkg(&mut store, "pkg-d", "1.0");
    install_pkg(&mut store, root.path(), None, Some(pkg_d), Some(&d_archive)).unwrap();

    let pkg_e = add_pkg(&mut store, "pkg-e", "1.0");
    let result = install_pkg(&mut store, root.path(), None, Some(pkg_e), Some(&e_archive));

    assert!(result.is_err());
    assert_eq!(store.package(pkg_e).state, State::NoInstall);
    let usr_bin = store.get_dir("usr/bin");
    let file = store.dir_files(usr_bin).find(|&f| store.file(f).filename == "x").unwrap();
    assert_eq!(store.file(file).owner, Some(pkg_d));
}

/// S5 - busybox exemption.
#[test]
fn s5_busybox_exemption_allows_reowning() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("bin")).unwrap();

    let busybox_archive = root.path().join("busybox-1.0.apk");
    build_archive(&busybox_archive, &[("bin/ls", b"busybox applet")], &[]);
    let coreutils_archive = root.path().join("coreutils-1.0.apk");
    build_archive(&coreutils_archive, &[("bin/ls", b"real ls")], &[]);

    let mut store = Store::new();
    let busybox = add_pkg(&mut store, "busybox", "1.0");
    install_pkg(&mut store, root.path(), None, Some(busybox), Some(&busybox_archive)).unwrap();

    let coreutils = add_pkg(&mut store, "coreutils", "1.0");
    install_pkg(&mut store, root.path(), None, Some(coreutils), Some(&coreutils_archive)).unwrap();

    assert_eq!(store.pkg_files(busybox).count(), 0);
    assert_eq!(store.pkg_files(coreutils).count(), 1);
    assert_eq!(fs::read(root.path().join("bin/ls")).unwrap(), b"real ls");
}

/// S6 - Duplicate installed FDB entry is rejected.
#[test]
fn s6_duplicate_installed_entry_rejected() {
    let mut store = Store::new();
    let data = "N:pkg-a\n\
                V:1.0\n\
                C:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n\
                \n\
                N:pkg-b\n\
                V:1.0\n\
                C:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n\
                \n";

    let err = apkg::fdb::read_installed(&mut store, data.as_bytes()).unwrap_err();
    assert!(matches!(err, apkg::error::FdbError::DuplicatePackage(_)));
}
