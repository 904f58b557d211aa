//! Mount primitives used by the guest bootstrapper.
//!
//! Every mount the guest needs before it can be trusted is described by a
//! [`MountSpec`]. A table of specs is applied in order with [`mount_all`];
//! the first failure aborts.

mod error;
mod fs;

pub use error::MountError;
pub use fs::{clone_mount_file, ensure_stub_file, mount_binfmt_misc, mount_tmpfs};

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSpec {
    /// Private tmpfs over `target`.
    Tmpfs { target: PathBuf },
    /// Detached clone of the single file `source`, attached over `target`.
    /// `source` is created empty first when it does not exist.
    CloneFile { source: PathBuf, target: PathBuf },
    /// The kernel's binfmt_misc filesystem.
    BinfmtMisc { target: PathBuf },
}

impl MountSpec {
    pub fn tmpfs(target: impl Into<PathBuf>) -> Self {
        Self::Tmpfs {
            target: target.into(),
        }
    }

    pub fn clone_file(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::CloneFile {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn binfmt_misc(target: impl Into<PathBuf>) -> Self {
        Self::BinfmtMisc {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        match self {
            Self::Tmpfs { target } | Self::BinfmtMisc { target } => target,
            Self::CloneFile { target, .. } => target,
        }
    }

    pub fn apply(&self) -> Result<(), MountError> {
        match self {
            Self::Tmpfs { target } => mount_tmpfs(target),
            Self::CloneFile { source, target } => clone_mount_file(source, target),
            Self::BinfmtMisc { target } => mount_binfmt_misc(target),
        }
    }
}

/// Apply `specs` in order, stopping at the first failure.
pub fn mount_all(specs: &[MountSpec]) -> Result<(), MountError> {
    for spec in specs {
        tracing::debug!(target = %spec.target().display(), ?spec, "mounting");
        spec.apply()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_spec_targets() {
        let specs = [
            MountSpec::tmpfs("/var/run"),
            MountSpec::clone_file("/tmp/resolv.conf", "/etc/resolv.conf"),
            MountSpec::binfmt_misc("/proc/sys/fs/binfmt_misc"),
        ];

        let targets: Vec<_> = specs.iter().map(|s| s.target().to_owned()).collect();
        assert_eq!(
            targets,
            vec![
                PathBuf::from("/var/run"),
                PathBuf::from("/etc/resolv.conf"),
                PathBuf::from("/proc/sys/fs/binfmt_misc"),
            ]
        );
    }

    #[test]
    fn test_mount_all_empty_is_noop() {
        assert!(mount_all(&[]).is_ok());
    }
}
