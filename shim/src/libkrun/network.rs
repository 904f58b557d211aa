//! Network uplink for the VM, provided by passt.
//!
//! passt implements the guest's virtio-net backend in userspace without
//! privileges. It is either spawned privately, talking to libkrun over one
//! end of a socket pair, or already running and reachable at a unix socket.

use crate::ShimError;
use crate::types::NetworkBackend;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::sys::socket::{AddressFamily, SockFlag, SockType, socketpair};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::Command;

const PASST_PROGRAM: &str = "passt";

/// Connected descriptor for the guest's uplink.
///
/// When `owning_process` is set the descriptor's peer is that child. The
/// child is never waited on: it is meant to outlive this process, whose
/// image is about to become the VM.
#[derive(Debug)]
pub struct NetworkBackendHandle {
    fd: OwnedFd,
    owning_process: Option<u32>,
}

impl NetworkBackendHandle {
    pub fn owning_process(&self) -> Option<u32> {
        self.owning_process
    }

    pub fn into_fd(self) -> OwnedFd {
        self.fd
    }
}

/// Produce the descriptor `backend` asks for, or `None` for TSI.
pub fn acquire(backend: &NetworkBackend) -> Result<Option<NetworkBackendHandle>, ShimError> {
    match backend {
        NetworkBackend::None => Ok(None),
        NetworkBackend::SpawnPasst => spawn_passt().map(Some),
        NetworkBackend::ConnectPasst(path) => connect_to_passt(path).map(Some),
    }
}

pub fn connect_to_passt(path: &Path) -> Result<NetworkBackendHandle, ShimError> {
    let stream = UnixStream::connect(path).map_err(|source| ShimError::NetworkConnect {
        path: path.to_owned(),
        source,
    })?;

    tracing::debug!(path = %path.display(), "connected to passt");
    Ok(NetworkBackendHandle {
        fd: stream.into(),
        owning_process: None,
    })
}

pub fn spawn_passt() -> Result<NetworkBackendHandle, ShimError> {
    spawn_backend(PASST_PROGRAM)
}

fn spawn_backend(program: &str) -> Result<NetworkBackendHandle, ShimError> {
    let (parent_fd, child_fd) = socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::empty(),
    )
    .map_err(|e| ShimError::NetworkSpawn {
        context: "creating socket pair",
        source: e.into(),
    })?;

    // Only the child's end may cross the exec.
    fcntl(parent_fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(|e| {
        ShimError::NetworkSpawn {
            context: "marking parent socket close-on-exec",
            source: e.into(),
        }
    })?;

    let fd_arg = child_fd.as_raw_fd().to_string();
    tracing::debug!(fd = %fd_arg, program, "passing fd to passt");

    let child = Command::new(program)
        .args(["-q", "-f", "--fd", &fd_arg])
        .spawn()
        .map_err(|source| ShimError::NetworkSpawn {
            context: "executing passt",
            source,
        })?;

    // The child holds its own copy now.
    drop(child_fd);

    let pid = child.id();
    tracing::info!(pid, "passt started");

    Ok(NetworkBackendHandle {
        fd: parent_fd,
        owning_process: Some(pid),
    })
}
