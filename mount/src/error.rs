use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MountError {
    #[error("mount of {fstype} on {target} failed: {source}")]
    MountFailed {
        fstype: &'static str,
        target: PathBuf,
        source: nix::errno::Errno,
    },

    #[error("open_tree {path} failed: {source}")]
    OpenTree {
        path: PathBuf,
        source: nix::errno::Errno,
    },

    #[error("move_mount onto {target} failed: {source}")]
    MoveMount {
        target: PathBuf,
        source: nix::errno::Errno,
    },

    #[error("failed to create {path}: {source}")]
    CreateStub {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid mount path: {0}")]
    InvalidPath(String),
}
