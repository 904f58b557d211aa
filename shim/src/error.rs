use crate::hypervisor::HypervisorOp;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShimError {
    #[error("running as root is not supported as it may break your system")]
    RunningAsRoot,

    #[error("failed to connect to passt socket at {path}: {source}")]
    NetworkConnect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start passt: {context}: {source}")]
    NetworkSpawn {
        context: &'static str,
        source: std::io::Error,
    },

    #[error("error {op}: {source}")]
    Hypervisor {
        op: HypervisorOp,
        source: std::io::Error,
    },

    #[error("invalid {what} {value:?}: contains a NUL byte")]
    InvalidString { what: &'static str, value: String },

    #[error("host environment: {0}")]
    HostEnvironment(String),

    #[error("hypervisor support not compiled in (rebuild with the `libkrun` feature)")]
    Unsupported,
}

impl ShimError {
    #[cfg(any(test, feature = "libkrun"))]
    pub(crate) fn hypervisor(op: HypervisorOp, status: i32) -> Self {
        ShimError::Hypervisor {
            op,
            source: std::io::Error::from_raw_os_error(-status),
        }
    }

    /// Process exit status for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            ShimError::RunningAsRoot => 10,
            ShimError::NetworkConnect { .. } | ShimError::NetworkSpawn { .. } => 11,
            ShimError::Hypervisor { op, .. } => op.exit_code(),
            ShimError::InvalidString { .. } | ShimError::HostEnvironment(_) => 20,
            ShimError::Unsupported => 21,
        }
    }
}
