use crate::libkrun::NetworkBackendHandle;
use std::path::PathBuf;

pub const DEFAULT_VCPUS: u8 = 4;
pub const DEFAULT_RAM_MIB: u32 = 4096;

/// Well-known socket of an already running passt.
pub const DEFAULT_PASST_SOCKET: &str = "/tmp/passt_1.socket";

/// Appended to the host executable's path to find the guest bootstrapper.
pub const GUEST_SUFFIX: &str = "-guest";

/// Forwarded to the guest only when both are set on the host, so the guest
/// picks the same GPU drivers.
pub const FORWARDED_ENV: [&str; 2] = ["LD_LIBRARY_PATH", "LIBGL_DRIVERS_PATH"];

// virglrenderer.h
pub const VIRGLRENDERER_USE_EGL: u32 = 1 << 0;
pub const VIRGLRENDERER_THREAD_SYNC: u32 = 1 << 1;
pub const VIRGLRENDERER_USE_ASYNC_FENCE_CB: u32 = 1 << 8;
pub const VIRGLRENDERER_DRM: u32 = 1 << 10;

pub const GPU_FLAGS: u32 = VIRGLRENDERER_USE_EGL
    | VIRGLRENDERER_DRM
    | VIRGLRENDERER_THREAD_SYNC
    | VIRGLRENDERER_USE_ASYNC_FENCE_CB;

/// How the guest's network uplink is provided.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NetworkBackend {
    /// No descriptor; the hypervisor impersonates guest sockets (TSI).
    None,
    /// Spawn a private passt and hand it one end of a socket pair.
    #[default]
    SpawnPasst,
    /// Connect to a passt already listening at this path.
    ConnectPasst(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmResources {
    pub vcpus: u8,
    pub ram_mib: u32,
}

impl Default for VmResources {
    fn default() -> Self {
        Self {
            vcpus: DEFAULT_VCPUS,
            ram_mib: DEFAULT_RAM_MIB,
        }
    }
}

/// What the user asked the launcher to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub resources: VmResources,
    pub network: NetworkBackend,
    /// Target command and its arguments.
    pub command: Vec<String>,
    pub log_level: u32,
}

/// Executable the VM runs first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub path: PathBuf,
    /// Arguments after `argv[0]`.
    pub args: Vec<String>,
    /// Complete environment; empty means an empty environment.
    pub env: Vec<(String, String)>,
}

impl ExecSpec {
    /// Full argv as the guest sees it.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.path.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub fn env_strings(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// Everything handed to the hypervisor, built once and consumed by
/// [`crate::VmLauncher::hand_off`].
#[derive(Debug)]
pub struct LaunchConfig {
    pub resources: VmResources,
    pub root_path: PathBuf,
    pub gpu_flags: u32,
    pub workdir: PathBuf,
    pub exec: ExecSpec,
    pub network: Option<NetworkBackendHandle>,
}
