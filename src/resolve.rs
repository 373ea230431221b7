//! Dependency resolution stand-in (spec.md §4, "state_new"/"satisfy_deps").
//!
//! The real apk solver walks a full dependency graph with conflict and
//! provider resolution; that is explicitly out of scope here (spec.md §5).
//! What's left to decide honestly is: given a `world` of requested names,
//! which concrete package satisfies each one? This picks the highest
//! available version per name and nothing more - no version constraints,
//! no conflicts, no providers.

use thiserror::Error;

use crate::arena::Id;
use crate::package::Package;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("no such package: {0}")]
    NoSuchPackage(String),
}

/// Coarse version ordering: compare dot-separated runs of digits
/// numerically, everything else lexicographically. Good enough to pick a
/// "latest" among a handful of advertised versions; not a real deb/apk
/// version comparator.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let mut a_parts = a.split('.');
    let mut b_parts = b.split('.');

    loop {
        match (a_parts.next(), b_parts.next()) {
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => x.cmp(y),
                };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (None, None) => return std::cmp::Ordering::Equal,
        }
    }
}

/// The highest-versioned package advertised under `name`, if any.
pub fn highest_version(store: &Store, name: Id<crate::name::Name>) -> Option<Id<Package>> {
    store
        .name(name)
        .pkgs
        .iter()
        .copied()
        .max_by(|&a, &b| compare_versions(&store.package(a).version, &store.package(b).version))
}

/// Resolve a `world` list of bare package names to concrete packages,
/// picking the highest available version of each.
pub fn solve_world(store: &Store, world: &[String]) -> Result<Vec<Id<Package>>, SolveError> {
    world
        .iter()
        .map(|name| {
            let name_id = store
                .names
                .get_by_key(name)
                .ok_or_else(|| SolveError::NoSuchPackage(name.clone()))?;
            highest_version(store, name_id).ok_or_else(|| SolveError::NoSuchPackage(name.clone()))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checksum::Checksum;
    use crate::package::State;

    fn add(store: &mut Store, name: &str, version: &str) -> Id<Package> {
        let name_id = store.get_name(name);
        store.pkg_add(Package {
            name: name_id,
            version: version.to_owned(),
            csum: Checksum::of_bytes(format!("{name}-{version}").as_bytes()),
            id: 0,
            repos: 1,
            state: State::NoInstall,
            owned_files_head: None,
            owned_files_tail: None,
            scripts: Vec::new(),
            size: None,
            filename: None,
        })
    }

    #[test]
    fn picks_highest_version() {
        let mut store = Store::new();
        add(&mut store, "busybox", "1.2.0");
        let newest = add(&mut store, "busybox", "1.10.0");
        add(&mut store, "busybox", "1.9.5");

        let resolved = solve_world(&store, &["busybox".to_owned()]).unwrap();
        assert_eq!(resolved, vec![newest]);
    }

    #[test]
    fn unknown_name_errors() {
        let store = Store::new();
        let err = solve_world(&store, &["nope".to_owned()]).unwrap_err();
        assert!(matches!(err, SolveError::NoSuchPackage(n) if n == "nope"));
    }
}
