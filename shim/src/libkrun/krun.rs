//! libkrun configuration context.
//!
//! Thin wrappers over the krun-sys FFI. Negative return values are negated
//! errnos.

use crate::ShimError;
use crate::hypervisor::{Hypervisor, HypervisorOp, VmContext};
use crate::types::ExecSpec;
use std::ffi::CString;
use std::os::fd::{IntoRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

fn check_status(op: HypervisorOp, status: i32) -> Result<(), ShimError> {
    if status < 0 {
        tracing::error!(%op, status, "libkrun call failed");
        return Err(ShimError::hypervisor(op, status));
    }
    Ok(())
}

fn c_string(what: &'static str, value: &[u8]) -> Result<CString, ShimError> {
    CString::new(value).map_err(|_| ShimError::InvalidString {
        what,
        value: String::from_utf8_lossy(value).into_owned(),
    })
}

fn c_path(what: &'static str, path: &Path) -> Result<CString, ShimError> {
    c_string(what, path.as_os_str().as_bytes())
}

/// libkrun linked into this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct KrunHypervisor;

impl Hypervisor for KrunHypervisor {
    type Context = KrunContext;

    fn set_log_level(&self, level: u32) -> Result<(), ShimError> {
        check_status(HypervisorOp::SetLogLevel, unsafe {
            krun_sys::krun_set_log_level(level)
        })
    }

    fn create_context(&self) -> Result<KrunContext, ShimError> {
        let ctx_id = unsafe { krun_sys::krun_create_ctx() };
        check_status(HypervisorOp::CreateContext, ctx_id)?;

        tracing::debug!(ctx_id, "created libkrun context");
        Ok(KrunContext {
            ctx_id: ctx_id as u32,
        })
    }
}

#[derive(Debug)]
pub struct KrunContext {
    ctx_id: u32,
}

impl VmContext for KrunContext {
    fn set_vm_config(&mut self, vcpus: u8, ram_mib: u32) -> Result<(), ShimError> {
        check_status(HypervisorOp::SetVmConfig, unsafe {
            krun_sys::krun_set_vm_config(self.ctx_id, vcpus, ram_mib)
        })
    }

    fn set_root(&mut self, root: &Path) -> Result<(), ShimError> {
        let root = c_path("root path", root)?;
        check_status(HypervisorOp::SetRoot, unsafe {
            krun_sys::krun_set_root(self.ctx_id, root.as_ptr())
        })
    }

    fn set_gpu_options(&mut self, virgl_flags: u32) -> Result<(), ShimError> {
        check_status(HypervisorOp::SetGpuOptions, unsafe {
            krun_sys::krun_set_gpu_options(self.ctx_id, virgl_flags)
        })
    }

    fn set_passt_fd(&mut self, fd: OwnedFd) -> Result<(), ShimError> {
        // libkrun owns the descriptor from here on.
        let fd = fd.into_raw_fd();
        check_status(HypervisorOp::SetNetworkFd, unsafe {
            krun_sys::krun_set_passt_fd(self.ctx_id, fd)
        })
    }

    fn set_workdir(&mut self, workdir: &Path) -> Result<(), ShimError> {
        let workdir = c_path("working directory", workdir)?;
        check_status(HypervisorOp::SetWorkdir, unsafe {
            krun_sys::krun_set_workdir(self.ctx_id, workdir.as_ptr())
        })
    }

    fn set_exec(&mut self, exec: &ExecSpec) -> Result<(), ShimError> {
        let exec_path = c_path("executable path", &exec.path)?;
        let args = exec
            .args
            .iter()
            .map(|arg| c_string("argument", arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        let env = exec
            .env_strings()
            .iter()
            .map(|var| c_string("environment variable", var.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut argv: Vec<*const libc::c_char> = args.iter().map(|s| s.as_ptr()).collect();
        argv.push(std::ptr::null());
        let mut envp: Vec<*const libc::c_char> = env.iter().map(|s| s.as_ptr()).collect();
        envp.push(std::ptr::null());

        check_status(HypervisorOp::SetExec, unsafe {
            krun_sys::krun_set_exec(
                self.ctx_id,
                exec_path.as_ptr(),
                argv.as_ptr(),
                envp.as_ptr(),
            )
        })
    }

    fn start_enter(self) -> ShimError {
        tracing::debug!(ctx_id = self.ctx_id, "entering microVM");
        let status = unsafe { krun_sys::krun_start_enter(self.ctx_id) };
        ShimError::hypervisor(HypervisorOp::StartEnter, status)
    }
}
