use crate::plan::Step;
use kroot_mount::MountError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuestError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("couldn't mount filesystems: {0}")]
    Mount(#[from] MountError),

    #[error("bootstrap plan rejected: {0}")]
    Plan(#[from] PlanError),

    #[error("{op}({id}) failed: {source}")]
    Privilege {
        op: &'static str,
        id: u32,
        source: nix::errno::Errno,
    },

    #[error("couldn't execute '{command}' inside the vm: {source}")]
    Exec {
        command: String,
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl GuestError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit status for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArguments(_) => 255,
            Self::Mount(_) => 254,
            Self::Plan(_) | Self::Privilege { .. } | Self::Io { .. } => 253,
            Self::Exec { .. } => 252,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("step `{step}` listed more than once")]
    Duplicate { step: Step },

    #[error("step `{step}` requires `{requires}` to run first")]
    MissingPrerequisite { step: Step, requires: Step },

    #[error("step `{step}` needs privilege but runs after `{}`", Step::DropPrivileges)]
    AfterPrivilegeDrop { step: Step },
}
