use clap::{Parser, ValueEnum};
use kroot_shim::{
    DEFAULT_PASST_SOCKET, DEFAULT_RAM_MIB, DEFAULT_VCPUS, HostEnvironment, LaunchRequest,
    NetworkBackend, ShimError, VmResources,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kroot")]
#[command(about = "Run a command as yourself inside a microVM sharing the host's root filesystem")]
struct Cli {
    /// Network mode of the guest
    #[arg(long, value_enum, ignore_case = true, default_value_t = NetMode::Passt)]
    net: NetMode,

    /// Connect to a running passt at PATH instead of spawning one
    #[arg(long, value_name = "PATH")]
    passt_socket: Option<PathBuf>,

    /// Connect to a running passt at its well-known socket (/tmp/passt_1.socket)
    #[arg(long, conflicts_with = "passt_socket")]
    passt_default_socket: bool,

    /// Number of vCPUs
    #[arg(long, default_value_t = DEFAULT_VCPUS)]
    cpus: u8,

    /// Guest memory in MiB
    #[arg(long, default_value_t = DEFAULT_RAM_MIB)]
    mem: u32,

    /// libkrun log level (0 = off, 5 = trace)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=5))]
    krun_log_level: u32,

    /// Command to run in the guest, with its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum NetMode {
    /// userspace virtio-net backend
    Passt,
    /// transparent socket impersonation
    Tsi,
}

impl Cli {
    fn passt_socket(&self) -> Option<PathBuf> {
        match (&self.passt_socket, self.passt_default_socket) {
            (Some(path), _) => Some(path.clone()),
            (None, true) => Some(PathBuf::from(DEFAULT_PASST_SOCKET)),
            (None, false) => None,
        }
    }

    fn network(&self) -> NetworkBackend {
        match (self.net, self.passt_socket()) {
            (NetMode::Tsi, socket) => {
                if socket.is_some() {
                    tracing::warn!("passt socket options have no effect with --net tsi");
                }
                NetworkBackend::None
            }
            (NetMode::Passt, Some(path)) => NetworkBackend::ConnectPasst(path),
            (NetMode::Passt, None) => NetworkBackend::SpawnPasst,
        }
    }

    fn into_request(self) -> LaunchRequest {
        LaunchRequest {
            resources: VmResources {
                vcpus: self.cpus,
                ram_mib: self.mem,
            },
            network: self.network(),
            command: self.command,
            log_level: self.krun_log_level,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "libkrun")]
fn launch(host: &HostEnvironment, request: LaunchRequest) -> ShimError {
    kroot_shim::VmLauncher::new(kroot_shim::libkrun::KrunHypervisor).launch(host, request)
}

#[cfg(not(feature = "libkrun"))]
fn launch(host: &HostEnvironment, _request: LaunchRequest) -> ShimError {
    match host.identity.ensure_unprivileged() {
        Ok(()) => ShimError::Unsupported,
        Err(e) => e,
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let request = cli.into_request();
    tracing::debug!(?request, "launch request");

    let err = match HostEnvironment::detect() {
        Ok(host) => launch(&host, request),
        Err(e) => e,
    };

    eprintln!("kroot: {err}");
    ExitCode::from(err.exit_code())
}
