//! Environment handed to the workload after the privilege drop.

use crate::GuestIdentity;
use crate::layout::{DriverOverride, GuestLayout, Platform};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Variables exported to the target command, in insertion order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GuestEnvironment {
    vars: Vec<(String, String)>,
}

impl GuestEnvironment {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }
}

/// Build the workload environment for `identity`, creating its runtime
/// directory if needed.
pub fn prepare_environment(layout: &GuestLayout, identity: &GuestIdentity) -> GuestEnvironment {
    let mut env = GuestEnvironment::default();

    let runtime_dir = layout.scratch_dir.join(identity.uid.to_string());
    if let Err(e) = std::fs::DirBuilder::new().mode(0o755).create(&runtime_dir) {
        if e.kind() != std::io::ErrorKind::AlreadyExists {
            tracing::warn!(
                dir = %runtime_dir.display(),
                error = %e,
                "failed to create runtime dir"
            );
        }
    }
    env.set("XDG_RUNTIME_DIR", runtime_dir.to_string_lossy());

    let home = home_dir(layout, &identity.username);
    env.set("HOME", home.to_string_lossy());

    let platform = detect_platform(&layout.device_tree_compatible);
    for DriverOverride {
        variable,
        value,
        platform: wanted,
    } in &layout.driver_overrides
    {
        if *wanted == Platform::Any || *wanted == platform {
            tracing::debug!(variable, value, "applying driver override");
            env.set(*variable, *value);
        }
    }

    env
}

/// Home directory from the password database, or `<home_root>/<username>`.
pub fn home_dir(layout: &GuestLayout, username: &str) -> PathBuf {
    match nix::unistd::User::from_name(username) {
        Ok(Some(user)) => user.dir,
        Ok(None) => layout.home_root.join(username),
        Err(e) => {
            tracing::debug!(username, error = %e, "passwd lookup failed");
            layout.home_root.join(username)
        }
    }
}

/// Identify the hardware from the device tree's `compatible` list.
pub fn detect_platform(compatible: &Path) -> Platform {
    let Ok(contents) = std::fs::read(compatible) else {
        return Platform::Any;
    };

    let apple = contents
        .split(|b| *b == 0)
        .any(|entry| entry.starts_with(b"apple,"));
    if apple {
        Platform::AppleSilicon
    } else {
        Platform::Any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNKNOWN_USER: &str = "kroot-test-no-such-user";

    fn layout_in(dir: &Path) -> GuestLayout {
        GuestLayout {
            scratch_dir: dir.join("tmp"),
            home_root: dir.join("home"),
            device_tree_compatible: dir.join("compatible"),
            ..GuestLayout::default()
        }
    }

    fn identity() -> GuestIdentity {
        GuestIdentity {
            username: UNKNOWN_USER.to_string(),
            uid: 4242,
            gid: 4242,
        }
    }

    #[test]
    fn test_runtime_dir_and_home() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout_in(dir.path());
        std::fs::create_dir(&layout.scratch_dir).unwrap();

        let env = prepare_environment(&layout, &identity());

        let runtime = layout.scratch_dir.join("4242");
        assert!(runtime.is_dir());
        assert_eq!(env.get("XDG_RUNTIME_DIR"), runtime.to_str());
        assert_eq!(
            env.get("HOME"),
            layout.home_root.join(UNKNOWN_USER).to_str()
        );
    }

    #[test]
    fn test_existing_runtime_dir_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout_in(dir.path());
        std::fs::create_dir_all(layout.scratch_dir.join("4242")).unwrap();

        let env = prepare_environment(&layout, &identity());
        assert!(env.get("XDG_RUNTIME_DIR").is_some());
    }

    #[test]
    fn test_override_skipped_off_platform() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout_in(dir.path());
        std::fs::write(&layout.device_tree_compatible, b"raspberrypi,4-model-b\0brcm,bcm2711\0")
            .unwrap();

        let env = prepare_environment(&layout, &identity());
        assert_eq!(env.get("MESA_LOADER_DRIVER_OVERRIDE"), None);
    }

    #[test]
    fn test_override_applied_on_apple_silicon() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout_in(dir.path());
        std::fs::write(
            &layout.device_tree_compatible,
            b"apple,j314s\0apple,t6000\0apple,arm-platform\0",
        )
        .unwrap();

        let env = prepare_environment(&layout, &identity());
        assert_eq!(env.get("MESA_LOADER_DRIVER_OVERRIDE"), Some("asahi"));
    }

    #[test]
    fn test_unconditional_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut layout = layout_in(dir.path());
        layout.driver_overrides = vec![DriverOverride {
            variable: "GALLIUM_DRIVER",
            value: "virpipe",
            platform: Platform::Any,
        }];

        let env = prepare_environment(&layout, &identity());
        assert_eq!(env.get("GALLIUM_DRIVER"), Some("virpipe"));
    }

    #[test]
    fn test_detect_platform_without_device_tree() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_platform(&dir.path().join("missing")), Platform::Any);
    }

    #[test]
    fn test_set_replaces_existing() {
        let mut env = GuestEnvironment::default();
        env.set("HOME", "/home/a");
        env.set("HOME", "/home/b");
        assert_eq!(env.vars(), &[("HOME".to_string(), "/home/b".to_string())]);
    }
}
