//! Hand GPU and audio device nodes to the target user.

use nix::unistd::{Gid, Uid, chown};
use std::path::PathBuf;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OwnershipReport {
    pub changed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub missing_dirs: Vec<PathBuf>,
}

/// Chown every entry directly under each of `dirs` to `uid`/`gid`.
///
/// Missing directories and per-entry failures are recorded and logged; a
/// host without a GPU simply has no `/dev/dri`.
pub fn fix_device_ownership(dirs: &[PathBuf], uid: u32, gid: u32) -> OwnershipReport {
    let mut report = OwnershipReport::default();
    let (uid, gid) = (Uid::from_raw(uid), Gid::from_raw(gid));

    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot open device directory");
                report.missing_dirs.push(dir.clone());
                continue;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %e,
                        "failed to read directory entry"
                    );
                    continue;
                }
            };

            match chown(&path, Some(uid), Some(gid)) {
                Ok(()) => report.changed.push(path),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "chown failed");
                    report.failed.push(path);
                }
            }
        }
    }

    tracing::debug!(
        changed = report.changed.len(),
        failed = report.failed.len(),
        missing = report.missing_dirs.len(),
        "device ownership fixed"
    );
    report
}
