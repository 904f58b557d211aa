//! The hypervisor's configuration-context API, as consumed by the launcher.
//!
//! [`crate::libkrun::KrunHypervisor`] is the production implementation.

use crate::error::ShimError;
use crate::types::ExecSpec;
use std::fmt;
use std::os::fd::OwnedFd;
use std::path::Path;

/// A configuration call, named for error reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HypervisorOp {
    SetLogLevel,
    CreateContext,
    SetVmConfig,
    SetRoot,
    SetGpuOptions,
    SetNetworkFd,
    SetWorkdir,
    SetExec,
    StartEnter,
}

impl HypervisorOp {
    pub fn exit_code(self) -> u8 {
        match self {
            HypervisorOp::SetLogLevel | HypervisorOp::CreateContext => 12,
            HypervisorOp::SetVmConfig => 13,
            HypervisorOp::SetRoot => 14,
            HypervisorOp::SetGpuOptions => 15,
            HypervisorOp::SetNetworkFd => 16,
            HypervisorOp::SetWorkdir => 17,
            HypervisorOp::SetExec => 18,
            HypervisorOp::StartEnter => 19,
        }
    }
}

impl fmt::Display for HypervisorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            HypervisorOp::SetLogLevel => "configuring log level",
            HypervisorOp::CreateContext => "creating configuration context",
            HypervisorOp::SetVmConfig => "configuring the number of vCPUs and/or the amount of RAM",
            HypervisorOp::SetRoot => "configuring root path",
            HypervisorOp::SetGpuOptions => "configuring gpu",
            HypervisorOp::SetNetworkFd => "configuring net mode",
            HypervisorOp::SetWorkdir => "configuring working directory",
            HypervisorOp::SetExec => "configuring the parameters for the executable to be run",
            HypervisorOp::StartEnter => "creating the microVM",
        };
        f.write_str(what)
    }
}

pub trait Hypervisor {
    type Context: VmContext;

    /// Global log level of the hypervisor library. 0 is off.
    fn set_log_level(&self, level: u32) -> Result<(), ShimError>;

    fn create_context(&self) -> Result<Self::Context, ShimError>;
}

pub trait VmContext {
    fn set_vm_config(&mut self, vcpus: u8, ram_mib: u32) -> Result<(), ShimError>;

    fn set_root(&mut self, root: &Path) -> Result<(), ShimError>;

    fn set_gpu_options(&mut self, virgl_flags: u32) -> Result<(), ShimError>;

    /// Hands the descriptor over to the hypervisor.
    fn set_passt_fd(&mut self, fd: OwnedFd) -> Result<(), ShimError>;

    fn set_workdir(&mut self, workdir: &Path) -> Result<(), ShimError>;

    fn set_exec(&mut self, exec: &ExecSpec) -> Result<(), ShimError>;

    /// Boot the VM and transfer control into it. Never returns on success;
    /// the returned value is always the failure.
    fn start_enter(self) -> ShimError;
}
