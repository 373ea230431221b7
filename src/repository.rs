//! Repository fetch (spec.md §6 "Repository layout" / `istream` factories):
//! `http(s)://` repositories are fetched with `reqwest::blocking`, anything
//! else is treated as a local filesystem path. Both `APK_INDEX.gz` and
//! individual package archives go through the same lookup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

const INDEX_NAME: &str = "APK_INDEX.gz";

/// Either a local path already on disk, or bytes fetched over the network
/// and spilled to a caller-supplied temp path. Either way, the caller gets
/// back a path it can open with [`crate::archive::open_tar_gz`] or a plain
/// gzip reader.
pub enum Fetched {
    Local(PathBuf),
    Downloaded(PathBuf),
}

impl Fetched {
    pub fn path(&self) -> &Path {
        match self {
            Fetched::Local(p) => p,
            Fetched::Downloaded(p) => p,
        }
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn download_to(url: &str, dest: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("fetching {url}");
    let mut resp = reqwest::blocking::get(url)?.error_for_status()?;
    let mut out = fs::File::create(dest)?;
    io::copy(&mut resp, &mut out)?;
    Ok(())
}

/// Fetch `<repo_url_or_path>/APK_INDEX.gz`, spilling remote content to
/// `scratch_dir` under a name derived from the repo's position.
pub fn fetch_index(repo: &str, repo_index: usize, scratch_dir: &Path) -> Result<Fetched, Box<dyn std::error::Error + Send + Sync>> {
    if is_remote(repo) {
        let url = format!("{}/{INDEX_NAME}", repo.trim_end_matches('/'));
        let dest = scratch_dir.join(format!("repo-{repo_index}-{INDEX_NAME}"));
        download_to(&url, &dest)?;
        Ok(Fetched::Downloaded(dest))
    } else {
        let path = Path::new(repo).join(INDEX_NAME);
        Ok(Fetched::Local(path))
    }
}

/// Fetch `<repo_url_or_path>/<name>-<version>.apk`, or open it directly if
/// it's already a local path (`pkg.filename` set from an earlier read).
pub fn fetch_package(
    repo: &str,
    name: &str,
    version: &str,
    scratch_dir: &Path,
) -> Result<Fetched, Box<dyn std::error::Error + Send + Sync>> {
    let filename = format!("{name}-{version}.apk");
    if is_remote(repo) {
        let url = format!("{}/{filename}", repo.trim_end_matches('/'));
        let dest = scratch_dir.join(&filename);
        download_to(&url, &dest)?;
        Ok(Fetched::Downloaded(dest))
    } else {
        Ok(Fetched::Local(Path::new(repo).join(filename)))
    }
}

/// A gzip reader over whatever `fetched` points to, for FDB index reading.
pub fn open_gz(fetched: &Fetched) -> io::Result<flate2::read::GzDecoder<fs::File>> {
    let file = fs::File::open(fetched.path())?;
    Ok(flate2::read::GzDecoder::new(file))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognises_remote_urls() {
        assert!(is_remote("https://example.invalid/main"));
        assert!(!is_remote("/mnt/local-repo"));
    }

    #[test]
    fn local_index_path_is_joined() {
        let fetched = fetch_index("/mnt/local-repo", 0, Path::new("/tmp")).unwrap();
        assert_eq!(fetched.path(), Path::new("/mnt/local-repo/APK_INDEX.gz"));
    }
}
