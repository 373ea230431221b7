//! Crate-wide error types, one per component, composed with `#[from]` the
//! way `client::Error` gathers `transaction::Error`/`db::meta::Error` in the
//! teacher codebase.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading or writing the installed-package FDB stream
/// (spec.md §4.F).
#[derive(Debug, Error)]
pub enum FdbError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("FDB directory entry before package entry")]
    DirBeforePackage,

    #[error("package record missing a name")]
    MissingName,

    #[error("FDB directory metadata entry before directory entry")]
    ModeBeforeDir,

    #[error("FDB file entry before directory entry")]
    FileBeforeDir,

    #[error("FDB checksum entry before file entry")]
    ChecksumBeforeFile,

    #[error("not a valid checksum: {0:?}")]
    BadChecksum(String),

    #[error("FDB entry '{0}' unsupported")]
    UnsupportedTag(char),

    #[error("invalid index entry '{0}'")]
    InvalidIndexEntry(char),

    #[error("installed database load failed: duplicate package {0}")]
    DuplicatePackage(String),

    #[error("malformed directory mode line: {0:?}")]
    BadModeLine(String),

    #[error(transparent)]
    Package(#[from] PackageInfoError),
}

/// Errors parsing a package-info line (the fields FDB delegates to the
/// package subsystem: `N`, `V`, `C`, `S`).
#[derive(Debug, Error)]
pub enum PackageInfoError {
    #[error("invalid checksum field: {0}")]
    Checksum(#[from] crate::checksum::ParseError),

    #[error("invalid size field: {0:?}")]
    Size(String),
}

/// Errors reading or writing the script blob store (spec.md §4.G).
#[derive(Debug, Error)]
pub enum ScriptDbError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the archive installation engine (spec.md §4.I).
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{package}: trying to overwrite {path} owned by {owner}")]
    FileConflict {
        package: String,
        path: String,
        owner: String,
    },

    #[error("{package}-{version}: failed to execute pre-install/upgrade script")]
    PreScriptFailed { package: String, version: String },

    #[error("{package}-{version}: failed to fetch archive: {source}")]
    FetchFailed {
        package: String,
        version: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("archive entry has no parent directory: {0}")]
    NoParentDir(String),

    #[error("no archive source available for {0}")]
    NoArchiveSource(String),

    #[error("{package}-{version}: failed to execute pre-deinstall/post-install/post-upgrade script")]
    ScriptFailed { package: String, version: String },
}

/// Errors surfaced by the [`crate::db::Database`] facade.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}: {1}")]
    OpenRoot(PathBuf, #[source] std::io::Error),

    #[error("please run 'apkg create' to initialize root")]
    MissingWorld,

    #[error("fdb")]
    Fdb(#[from] FdbError),

    #[error("scripts")]
    ScriptDb(#[from] ScriptDbError),

    #[error("install")]
    Install(#[from] InstallError),

    #[error("repository capacity exceeded (max {0})")]
    TooManyRepositories(usize),

    #[error("failed to open repository index {0}: {1}")]
    RepositoryIndex(String, #[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("solver")]
    Solve(#[from] crate::resolve::SolveError),

    #[error("no such package {0}")]
    NoSuchPackage(String),
}
