//! Final exec of the workload, through sommelier when it is installed.

use crate::env::GuestEnvironment;
use crate::error::GuestError;
use crate::layout::GuestLayout;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// virtio-gpu cross-domain channel, X11 forwarding, glamor acceleration.
pub const FORWARDING_FLAGS: [&str; 3] = ["--virtgpu-channel", "-X", "--glamor"];

/// Host driver search path, forwarded to Xwayland when set.
pub const GL_DRIVERS_VAR: &str = "LIBGL_DRIVERS_PATH";

/// argv for running `command` under the forwarding helper.
pub fn forwarding_argv(
    helper: &Path,
    gl_driver_path: Option<&str>,
    command: &[String],
) -> Vec<OsString> {
    let mut argv = Vec::with_capacity(FORWARDING_FLAGS.len() + command.len() + 2);
    argv.push(helper.as_os_str().to_owned());
    argv.extend(FORWARDING_FLAGS.iter().map(OsString::from));
    if let Some(path) = gl_driver_path {
        argv.push(format!("--xwayland-gl-driver-path={path}").into());
    }
    argv.extend(command.iter().map(OsString::from));
    argv
}

/// Replace the process with `command`. Only returns on failure.
///
/// The forwarding helper is preferred; if it is missing or cannot be
/// executed the command is executed directly.
pub fn launch(layout: &GuestLayout, command: &[String], env: &GuestEnvironment) -> GuestError {
    let Some((program, args)) = command.split_first() else {
        return GuestError::InvalidArguments("empty command".to_string());
    };

    let helper = &layout.display_helper;
    if helper.exists() {
        let gl_driver_path = std::env::var(GL_DRIVERS_VAR).ok();
        let argv = forwarding_argv(helper, gl_driver_path.as_deref(), command);

        tracing::debug!(helper = %helper.display(), ?argv, "exec forwarding helper");
        let err = Command::new(&argv[0])
            .args(&argv[1..])
            .envs(env.vars().iter().map(|(k, v)| (k, v)))
            .exec();
        tracing::warn!(
            helper = %helper.display(),
            error = %err,
            "forwarding helper exec failed, running command directly"
        );
    } else {
        tracing::debug!(helper = %helper.display(), "forwarding helper absent");
    }

    tracing::debug!(%program, ?args, "exec");
    let source = Command::new(program)
        .args(args)
        .envs(env.vars().iter().map(|(k, v)| (k, v)))
        .exec();
    GuestError::Exec {
        command: program.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn command(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_argv_with_driver_path() {
        let argv = forwarding_argv(
            &PathBuf::from("/usr/bin/sommelier"),
            Some("/usr/lib64/dri"),
            &command(&["ls", "-l"]),
        );

        assert_eq!(
            argv,
            vec![
                "/usr/bin/sommelier",
                "--virtgpu-channel",
                "-X",
                "--glamor",
                "--xwayland-gl-driver-path=/usr/lib64/dri",
                "ls",
                "-l",
            ]
        );
    }

    #[test]
    fn test_argv_without_driver_path() {
        let argv = forwarding_argv(
            &PathBuf::from("/usr/bin/sommelier"),
            None,
            &command(&["firefox", "--new-window", "about:blank"]),
        );

        assert_eq!(argv.len(), 7);
        assert_eq!(argv[1..4], FORWARDING_FLAGS);
        assert_eq!(argv[4..], ["firefox", "--new-window", "about:blank"]);
    }

    #[test]
    fn test_launch_reports_exec_failure() {
        let dir = tempfile::tempdir().unwrap();
        let layout = GuestLayout {
            display_helper: dir.path().join("sommelier"),
            ..GuestLayout::default()
        };
        let missing = dir.path().join("no-such-binary");

        let err = launch(
            &layout,
            &[missing.to_string_lossy().into_owned()],
            &GuestEnvironment::default(),
        );

        assert!(matches!(err, GuestError::Exec { .. }));
        assert_eq!(err.exit_code(), 252);
    }

    #[test]
    fn test_launch_rejects_empty_command() {
        let err = launch(&GuestLayout::default(), &[], &GuestEnvironment::default());
        assert!(matches!(err, GuestError::InvalidArguments(_)));
    }
}
