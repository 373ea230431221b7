//! The scriptlet interpreter spec.md §6 treats as an external collaborator,
//! plus the `script_type` classifier (spec.md §4.I).

use log::warn;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

/// Lifecycle points a scriptlet can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ScriptType {
    /// Bound from a bare `.INSTALL` entry (APK 2.0 layout); runs whichever
    /// of the slots below is currently active.
    Generic = 0,
    PreInstall = 1,
    PostInstall = 2,
    PreUpgrade = 3,
    PostUpgrade = 4,
    PreDeinstall = 5,
    PostDeinstall = 6,
}

impl ScriptType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Generic,
            1 => Self::PreInstall,
            2 => Self::PostInstall,
            3 => Self::PreUpgrade,
            4 => Self::PostUpgrade,
            5 => Self::PreDeinstall,
            6 => Self::PostDeinstall,
            _ => return None,
        })
    }

    /// `script_type(name)`: classify a legacy `var/db/apk/<name>/<version>/<scriptname>`
    /// trailing component. Returns `None` for anything not recognised
    /// (APK_SCRIPT_INVALID).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "pre-install" => Self::PreInstall,
            "post-install" => Self::PostInstall,
            "pre-upgrade" => Self::PreUpgrade,
            "post-upgrade" => Self::PostUpgrade,
            "pre-deinstall" => Self::PreDeinstall,
            "post-deinstall" => Self::PostDeinstall,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Script {
    pub kind: ScriptType,
    pub data: Vec<u8>,
}

/// Runs `script` with `/bin/sh`, `cwd` rooted at `root_dir`. The script is
/// spilled to a private temp file under the root (scripts in the original
/// are executed in-place relative to `root_fd`; we can't `fexecve` a
/// byte buffer portably, so we materialise it first and clean up after).
pub fn run(script: &Script, root_dir: &Path) -> io::Result<()> {
    let tmp_path = root_dir.join(format!(".apkg-script-{:?}", script.kind));
    fs::write(&tmp_path, &script.data)?;
    fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o755))?;

    let status = Command::new("/bin/sh")
        .arg(tmp_path.file_name().unwrap())
        .current_dir(root_dir)
        .status();

    let _ = fs::remove_file(&tmp_path);

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            warn!("script {:?} exited with status {status}", script.kind);
            Err(io::Error::other(format!("script exited with {status}")))
        }
        Err(err) => Err(err),
    }
}
