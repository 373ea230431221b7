//! The script blob store (spec.md §4.G): a flat sequence of
//! `{checksum, type, size}` fixed headers each followed by `size` raw bytes,
//! one entry per scriptlet bound to an installed package.

use std::io::{self, Read, Write};

use log::warn;

use crate::checksum::Checksum;
use crate::error::ScriptDbError;
use crate::script::ScriptType;
use crate::store::Store;

const HEADER_LEN: usize = crate::checksum::LEN + 4 + 4;

pub fn read_scripts<R: Read>(store: &mut Store, mut reader: R) -> Result<(), ScriptDbError> {
    loop {
        let mut header = [0u8; HEADER_LEN];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }

        let csum = Checksum::from_bytes(header[..32].try_into().unwrap());
        let kind = u32::from_le_bytes(header[32..36].try_into().unwrap());
        let size = u32::from_le_bytes(header[36..40].try_into().unwrap());

        let mut data = vec![0u8; size as usize];
        reader.read_exact(&mut data)?;

        let Some(pkg) = store.get_pkg(csum) else {
            warn!("scriptdb: script for unknown package {csum}, skipping");
            continue;
        };
        let Some(kind) = ScriptType::from_u32(kind) else {
            warn!("scriptdb: unknown script type {kind} for {csum}, skipping");
            continue;
        };
        store.package_mut(pkg).add_script(kind, data);
    }
    Ok(())
}

pub fn write_scripts<W: Write>(store: &Store, mut out: W) -> Result<(), ScriptDbError> {
    for &pkg_id in store.installed_packages() {
        let pkg = store.package(pkg_id);
        for script in &pkg.scripts {
            out.write_all(pkg.csum.as_bytes())?;
            out.write_all(&(script.kind as u32).to_le_bytes())?;
            out.write_all(&(script.data.len() as u32).to_le_bytes())?;
            out.write_all(&script.data)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::package::{Package, State};

    #[test]
    fn round_trips_one_script() {
        let mut store = Store::new();
        let name = store.get_name("busybox");
        let csum = Checksum::of_bytes(b"busybox-1.0");
        let pkg = store.pkg_add(Package {
            name,
            version: "1.0".into(),
            csum,
            id: 0,
            repos: 0,
            state: State::Install,
            owned_files_head: None,
            owned_files_tail: None,
            scripts: Vec::new(),
            size: None,
            filename: None,
        });
        store.mark_installed(pkg);
        store.package_mut(pkg).add_script(ScriptType::PostInstall, b"#!/bin/sh\necho hi\n".to_vec());

        let mut buf = Vec::new();
        write_scripts(&store, &mut buf).unwrap();

        let mut store2 = Store::new();
        let pkg2 = store2.pkg_add(Package {
            name: store2.get_name("busybox"),
            version: "1.0".into(),
            csum,
            id: 0,
            repos: 0,
            state: State::Install,
            owned_files_head: None,
            owned_files_tail: None,
            scripts: Vec::new(),
            size: None,
            filename: None,
        });
        read_scripts(&mut store2, &buf[..]).unwrap();

        assert_eq!(store2.package(pkg2).scripts.len(), 1);
        assert_eq!(store2.package(pkg2).scripts[0].kind, ScriptType::PostInstall);
    }

    #[test]
    fn unknown_package_is_skipped_not_fatal() {
        let mut store = Store::new();
        let mut buf = Vec::new();
        buf.extend_from_slice(Checksum::of_bytes(b"nope").as_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(b"abc");

        read_scripts(&mut store, &buf[..]).unwrap();
    }
}
