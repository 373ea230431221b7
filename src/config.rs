//! Flat line-oriented configuration files under `<root>/etc/apk`: the
//! `world` file (one requested package name per line) and `repositories`
//! (one repository URL or local path per line). Both share the same
//! comment/blank-line conventions, so one reader serves both.

use std::fs;
use std::io;
use std::path::Path;

/// The packages a freshly-created root starts out wanting (spec.md §4.H
/// `db_create`), mirroring the baselayout set the original ships by default.
pub const DEFAULT_WORLD: &[&str] = &["busybox", "alpine-baselayout", "apk-tools", "alpine-conf"];

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

fn write_lines(path: &Path, lines: &[String]) -> io::Result<()> {
    let mut contents = lines.join("\n");
    if !lines.is_empty() {
        contents.push('\n');
    }
    fs::write(path, contents)
}

pub fn read_world(path: &Path) -> io::Result<Vec<String>> {
    read_lines(path)
}

pub fn write_world(path: &Path, world: &[String]) -> io::Result<()> {
    write_lines(path, world)
}

pub fn read_repositories(path: &Path) -> io::Result<Vec<String>> {
    read_lines(path)
}

pub fn write_repositories(path: &Path, repos: &[String]) -> io::Result<()> {
    write_lines(path, repos)
}
