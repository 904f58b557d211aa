//! Fixed paths inside the guest and how each one is treated.
//!
//! Everything the bootstrapper touches is listed here so platform-specific
//! behavior can be tuned or gated in one place.

use kroot_mount::MountSpec;
use std::path::PathBuf;
use std::time::Duration;

pub const RUN_DIR: &str = "/var/run";
pub const RESOLV_STUB: &str = "/tmp/resolv.conf";
pub const RESOLV_CONF: &str = "/etc/resolv.conf";
pub const BINFMT_MISC_DIR: &str = "/proc/sys/fs/binfmt_misc";
pub const HOSTNAME_FILE: &str = "/etc/hostname";
pub const FEX_INTERPRETER: &str = "/usr/bin/FEXInterpreter";
pub const SOMMELIER: &str = "/usr/bin/sommelier";
pub const DHCLIENT: &str = "/sbin/dhclient";
pub const DEVICE_TREE_COMPATIBLE: &str = "/proc/device-tree/compatible";

/// Upper bound on how long the bootstrap waits for the DHCP client.
pub const DEFAULT_DHCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Hardware a driver override applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Any,
    /// Apple silicon running Asahi Linux.
    AppleSilicon,
}

/// Environment variable exported only on a matching platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOverride {
    pub variable: &'static str,
    pub value: &'static str,
    pub platform: Platform,
}

#[derive(Debug, Clone)]
pub struct GuestLayout {
    /// Applied in order; any failure is fatal.
    pub mounts: Vec<MountSpec>,
    pub binfmt_dir: PathBuf,
    pub binfmt_interpreter: PathBuf,
    pub hostname_file: PathBuf,
    pub dhcp_client: PathBuf,
    pub dhcp_timeout: Duration,
    /// Entries directly under these directories are chowned to the target
    /// user.
    pub device_dirs: Vec<PathBuf>,
    /// Parent of the per-uid runtime directory.
    pub scratch_dir: PathBuf,
    /// Fallback parent of home directories when the user has no passwd entry.
    pub home_root: PathBuf,
    pub display_helper: PathBuf,
    pub device_tree_compatible: PathBuf,
    pub driver_overrides: Vec<DriverOverride>,
}

impl GuestLayout {
    pub fn binfmt_register(&self) -> PathBuf {
        self.binfmt_dir.join("register")
    }
}

impl Default for GuestLayout {
    fn default() -> Self {
        Self {
            mounts: vec![
                MountSpec::tmpfs(RUN_DIR),
                MountSpec::clone_file(RESOLV_STUB, RESOLV_CONF),
                MountSpec::binfmt_misc(BINFMT_MISC_DIR),
            ],
            binfmt_dir: PathBuf::from(BINFMT_MISC_DIR),
            binfmt_interpreter: PathBuf::from(FEX_INTERPRETER),
            hostname_file: PathBuf::from(HOSTNAME_FILE),
            dhcp_client: PathBuf::from(DHCLIENT),
            dhcp_timeout: DEFAULT_DHCP_TIMEOUT,
            device_dirs: vec![PathBuf::from("/dev/dri"), PathBuf::from("/dev/snd")],
            scratch_dir: PathBuf::from("/tmp"),
            home_root: PathBuf::from("/home"),
            display_helper: PathBuf::from(SOMMELIER),
            device_tree_compatible: PathBuf::from(DEVICE_TREE_COMPATIBLE),
            driver_overrides: vec![DriverOverride {
                variable: "MESA_LOADER_DRIVER_OVERRIDE",
                value: "asahi",
                platform: Platform::AppleSilicon,
            }],
        }
    }
}
