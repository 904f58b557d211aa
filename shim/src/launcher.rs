//! Host-side launch: build the VM configuration and hand control to the
//! hypervisor.
//!
//! The VM does not run the user's command directly. It runs the guest
//! bootstrapper that sits next to this executable, passing the invoking
//! user's identity ahead of the command so privileged setup can happen in
//! the guest before the privilege drop.

use crate::ShimError;
use crate::hypervisor::{Hypervisor, VmContext};
use crate::identity::HostIdentity;
use crate::libkrun;
use crate::types::{
    ExecSpec, FORWARDED_ENV, GPU_FLAGS, GUEST_SUFFIX, LaunchConfig, LaunchRequest,
};
use std::convert::Infallible;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Everything the launch reads from the host.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    pub identity: HostIdentity,
    /// Absolute path of the running launcher.
    pub executable: PathBuf,
    pub forwarded_env: Vec<(String, String)>,
}

impl HostEnvironment {
    pub fn detect() -> Result<Self, ShimError> {
        let identity = HostIdentity::current()?;
        let executable = std::env::current_exe().map_err(|e| {
            ShimError::HostEnvironment(format!("cannot resolve current executable: {e}"))
        })?;
        let forwarded_env = forwarded_env(|key| std::env::var(key).ok());

        Ok(Self {
            identity,
            executable,
            forwarded_env,
        })
    }
}

/// Path of the guest bootstrapper installed next to `executable`.
pub fn bootstrap_path(executable: &Path) -> PathBuf {
    let mut path = OsString::from(executable.as_os_str());
    path.push(GUEST_SUFFIX);
    PathBuf::from(path)
}

/// The GPU driver search paths, only when all of them are set.
pub fn forwarded_env<F>(lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    FORWARDED_ENV
        .iter()
        .map(|key| lookup(key).map(|value| (key.to_string(), value)))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

impl LaunchConfig {
    /// Passthrough-root config running the bootstrapper as
    /// `<bootstrap> <user> <uid> <gid> <command...>`.
    pub fn build(
        host: &HostEnvironment,
        request: &LaunchRequest,
        network: Option<libkrun::NetworkBackendHandle>,
    ) -> Self {
        let identity = &host.identity;
        let args = [
            identity.username.clone(),
            identity.uid.to_string(),
            identity.gid.to_string(),
        ]
        .into_iter()
        .chain(request.command.iter().cloned())
        .collect();

        Self {
            resources: request.resources,
            root_path: PathBuf::from("/"),
            gpu_flags: GPU_FLAGS,
            workdir: identity.home.clone(),
            exec: ExecSpec {
                path: bootstrap_path(&host.executable),
                args,
                env: host.forwarded_env.clone(),
            },
            network,
        }
    }
}

/// Raise the soft open-file limit to the hard limit. virtio-fs keeps a
/// descriptor per open guest file.
pub fn raise_nofile_limit() -> std::io::Result<libc::rlim_t> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };

    unsafe {
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        limit.rlim_cur = limit.rlim_max;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &limit) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    Ok(limit.rlim_cur)
}

pub struct VmLauncher<H: Hypervisor> {
    hypervisor: H,
}

impl<H: Hypervisor> VmLauncher<H> {
    pub fn new(hypervisor: H) -> Self {
        Self { hypervisor }
    }

    /// Run `request` in a VM. Only returns on failure.
    ///
    /// Refuses root before touching anything, and acquires the network
    /// backend before the first hypervisor call.
    pub fn launch(&self, host: &HostEnvironment, request: LaunchRequest) -> ShimError {
        match self.try_launch(host, request) {
            Ok(never) => match never {},
            Err(e) => e,
        }
    }

    fn try_launch(
        &self,
        host: &HostEnvironment,
        request: LaunchRequest,
    ) -> Result<Infallible, ShimError> {
        host.identity.ensure_unprivileged()?;

        let network = libkrun::acquire(&request.network)?;
        let config = LaunchConfig::build(host, &request, network);

        self.hypervisor.set_log_level(request.log_level)?;
        Err(self.hand_off(config))
    }

    /// Configure a fresh context from `config` and enter the VM.
    pub fn hand_off(&self, config: LaunchConfig) -> ShimError {
        match self.configure(config) {
            Ok(ctx) => ctx.start_enter(),
            Err(e) => e,
        }
    }

    fn configure(&self, config: LaunchConfig) -> Result<H::Context, ShimError> {
        let mut ctx = self.hypervisor.create_context()?;

        ctx.set_vm_config(config.resources.vcpus, config.resources.ram_mib)?;

        match raise_nofile_limit() {
            Ok(limit) => tracing::debug!(limit, "raised RLIMIT_NOFILE"),
            Err(e) => tracing::warn!(error = %e, "failed to raise RLIMIT_NOFILE"),
        }

        ctx.set_root(&config.root_path)?;
        ctx.set_gpu_options(config.gpu_flags)?;

        if let Some(handle) = config.network {
            tracing::debug!(owner = ?handle.owning_process(), "installing network backend");
            ctx.set_passt_fd(handle.into_fd())?;
        }

        ctx.set_workdir(&config.workdir)?;

        tracing::debug!(
            path = %config.exec.path.display(),
            argv = ?config.exec.argv(),
            env = ?config.exec.env_strings(),
            "guest exec"
        );
        ctx.set_exec(&config.exec)?;

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::HypervisorOp;
    use crate::types::{NetworkBackend, VmResources};
    use std::cell::RefCell;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixListener;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        SetLogLevel(u32),
        CreateContext,
        SetVmConfig(u8, u32),
        SetRoot(PathBuf),
        SetGpuOptions(u32),
        SetNetworkFd,
        SetWorkdir(PathBuf),
        SetExec(ExecSpec),
        StartEnter,
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    #[derive(Default)]
    struct RecordingHypervisor {
        log: Log,
        fail_on: Option<HypervisorOp>,
    }

    impl RecordingHypervisor {
        fn context(&self) -> RecordingContext {
            RecordingContext {
                log: self.log.clone(),
                fail_on: self.fail_on,
            }
        }
    }

    struct RecordingContext {
        log: Log,
        fail_on: Option<HypervisorOp>,
    }

    impl RecordingContext {
        fn record(&self, op: HypervisorOp, call: Call) -> Result<(), ShimError> {
            self.log.borrow_mut().push(call);
            if self.fail_on == Some(op) {
                return Err(ShimError::hypervisor(op, -libc::EINVAL));
            }
            Ok(())
        }
    }

    impl Hypervisor for RecordingHypervisor {
        type Context = RecordingContext;

        fn set_log_level(&self, level: u32) -> Result<(), ShimError> {
            self.context()
                .record(HypervisorOp::SetLogLevel, Call::SetLogLevel(level))
        }

        fn create_context(&self) -> Result<RecordingContext, ShimError> {
            let ctx = self.context();
            ctx.record(HypervisorOp::CreateContext, Call::CreateContext)?;
            Ok(ctx)
        }
    }

    impl VmContext for RecordingContext {
        fn set_vm_config(&mut self, vcpus: u8, ram_mib: u32) -> Result<(), ShimError> {
            self.record(HypervisorOp::SetVmConfig, Call::SetVmConfig(vcpus, ram_mib))
        }

        fn set_root(&mut self, root: &Path) -> Result<(), ShimError> {
            self.record(HypervisorOp::SetRoot, Call::SetRoot(root.to_owned()))
        }

        fn set_gpu_options(&mut self, virgl_flags: u32) -> Result<(), ShimError> {
            self.record(HypervisorOp::SetGpuOptions, Call::SetGpuOptions(virgl_flags))
        }

        fn set_passt_fd(&mut self, _fd: OwnedFd) -> Result<(), ShimError> {
            self.record(HypervisorOp::SetNetworkFd, Call::SetNetworkFd)
        }

        fn set_workdir(&mut self, workdir: &Path) -> Result<(), ShimError> {
            self.record(HypervisorOp::SetWorkdir, Call::SetWorkdir(workdir.to_owned()))
        }

        fn set_exec(&mut self, exec: &ExecSpec) -> Result<(), ShimError> {
            self.record(HypervisorOp::SetExec, Call::SetExec(exec.clone()))
        }

        fn start_enter(self) -> ShimError {
            self.log.borrow_mut().push(Call::StartEnter);
            ShimError::hypervisor(HypervisorOp::StartEnter, -libc::ENOSYS)
        }
    }

    fn host(uid: u32) -> HostEnvironment {
        HostEnvironment {
            identity: HostIdentity {
                username: "alice".to_string(),
                uid,
                gid: 1000,
                euid: uid,
                home: PathBuf::from("/home/alice"),
            },
            executable: PathBuf::from("/usr/bin/kroot"),
            forwarded_env: Vec::new(),
        }
    }

    fn request(network: NetworkBackend) -> LaunchRequest {
        LaunchRequest {
            resources: VmResources::default(),
            network,
            command: vec!["ls".to_string(), "-l".to_string()],
            log_level: 0,
        }
    }

    #[test]
    fn test_root_rejected_without_side_effects() {
        let hypervisor = RecordingHypervisor::default();
        let log = hypervisor.log.clone();
        let dir = tempfile::tempdir().unwrap();
        let unreachable = dir.path().join("passt.socket");

        let err = VmLauncher::new(hypervisor)
            .launch(&host(0), request(NetworkBackend::ConnectPasst(unreachable)));

        // The root check wins over the (also failing) network backend.
        assert!(matches!(err, ShimError::RunningAsRoot));
        assert_eq!(err.exit_code(), 10);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_unreachable_backend_fails_before_hypervisor() {
        let hypervisor = RecordingHypervisor::default();
        let log = hypervisor.log.clone();
        let dir = tempfile::tempdir().unwrap();
        let unreachable = dir.path().join("passt.socket");

        let err = VmLauncher::new(hypervisor)
            .launch(&host(1000), request(NetworkBackend::ConnectPasst(unreachable)));

        assert!(matches!(err, ShimError::NetworkConnect { .. }));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_tsi_call_sequence() {
        let hypervisor = RecordingHypervisor::default();
        let log = hypervisor.log.clone();

        let err =
            VmLauncher::new(hypervisor).launch(&host(1000), request(NetworkBackend::None));

        assert!(matches!(
            err,
            ShimError::Hypervisor {
                op: HypervisorOp::StartEnter,
                ..
            }
        ));
        assert_eq!(
            *log.borrow(),
            vec![
                Call::SetLogLevel(0),
                Call::CreateContext,
                Call::SetVmConfig(4, 4096),
                Call::SetRoot(PathBuf::from("/")),
                Call::SetGpuOptions(GPU_FLAGS),
                Call::SetWorkdir(PathBuf::from("/home/alice")),
                Call::SetExec(ExecSpec {
                    path: PathBuf::from("/usr/bin/kroot-guest"),
                    args: ["alice", "1000", "1000", "ls", "-l"]
                        .map(String::from)
                        .to_vec(),
                    env: Vec::new(),
                }),
                Call::StartEnter,
            ]
        );
    }

    #[test]
    fn test_connected_backend_installed_after_gpu() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passt.socket");
        let _listener = UnixListener::bind(&path).unwrap();
        let hypervisor = RecordingHypervisor::default();
        let log = hypervisor.log.clone();

        VmLauncher::new(hypervisor)
            .launch(&host(1000), request(NetworkBackend::ConnectPasst(path)));

        let log = log.borrow();
        let gpu = log.iter().position(|c| matches!(c, Call::SetGpuOptions(_)));
        let net = log.iter().position(|c| *c == Call::SetNetworkFd);
        let workdir = log.iter().position(|c| matches!(c, Call::SetWorkdir(_)));
        assert!(gpu < net && net < workdir, "{log:?}");
    }

    #[test]
    fn test_failed_step_aborts_launch() {
        let hypervisor = RecordingHypervisor {
            fail_on: Some(HypervisorOp::SetRoot),
            ..RecordingHypervisor::default()
        };
        let log = hypervisor.log.clone();

        let err =
            VmLauncher::new(hypervisor).launch(&host(1000), request(NetworkBackend::None));

        assert!(matches!(
            err,
            ShimError::Hypervisor {
                op: HypervisorOp::SetRoot,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 14);
        assert_eq!(log.borrow().last(), Some(&Call::SetRoot(PathBuf::from("/"))));
    }

    #[test]
    fn test_bootstrap_path_is_colocated() {
        assert_eq!(
            bootstrap_path(Path::new("/opt/kroot/bin/kroot")),
            PathBuf::from("/opt/kroot/bin/kroot-guest")
        );
    }

    #[test]
    fn test_env_forwarded_only_when_complete() {
        let both = forwarded_env(|key| Some(format!("/usr/lib/{key}")));
        assert_eq!(
            both,
            vec![
                ("LD_LIBRARY_PATH".to_string(), "/usr/lib/LD_LIBRARY_PATH".to_string()),
                ("LIBGL_DRIVERS_PATH".to_string(), "/usr/lib/LIBGL_DRIVERS_PATH".to_string()),
            ]
        );

        let partial =
            forwarded_env(|key| (key == "LD_LIBRARY_PATH").then(|| "/usr/lib".to_string()));
        assert!(partial.is_empty());
    }

    #[test]
    fn test_config_carries_forwarded_env_and_sizing() {
        let mut host = host(1000);
        host.forwarded_env = vec![(
            "LIBGL_DRIVERS_PATH".to_string(),
            "/usr/lib64/dri".to_string(),
        )];
        let mut request = request(NetworkBackend::None);
        request.resources = VmResources {
            vcpus: 2,
            ram_mib: 1024,
        };

        let config = LaunchConfig::build(&host, &request, None);

        assert_eq!(config.resources.vcpus, 2);
        assert_eq!(config.exec.env_strings(), vec!["LIBGL_DRIVERS_PATH=/usr/lib64/dri"]);
        assert_eq!(
            config.exec.argv(),
            vec!["/usr/bin/kroot-guest", "alice", "1000", "1000", "ls", "-l"]
        );
        assert!(config.network.is_none());
    }
}
