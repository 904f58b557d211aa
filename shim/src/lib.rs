//! Host side of kroot: run a command under the invoking user's identity
//! inside a libkrun microVM whose root filesystem is the host's own root.

mod error;
pub mod hypervisor;
mod identity;
mod launcher;
pub mod libkrun;
mod types;

pub use error::ShimError;
pub use hypervisor::{Hypervisor, HypervisorOp, VmContext};
pub use identity::HostIdentity;
pub use launcher::{
    HostEnvironment, VmLauncher, bootstrap_path, forwarded_env, raise_nofile_limit,
};
pub use types::*;
