//! Guest network configuration: DHCP client plus hostname.

use crate::error::GuestError;
use crate::layout::GuestLayout;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Start the DHCP client, apply the hostname while it runs, then wait for
/// the client for at most `layout.dhcp_timeout`.
///
/// Hostname failures are logged here and do not affect the result; the
/// returned error describes the DHCP client only.
pub fn configure_network(layout: &GuestLayout) -> Result<(), GuestError> {
    let dhcp = spawn_dhcp_client(&layout.dhcp_client)?;

    if let Err(e) = apply_hostname(&layout.hostname_file) {
        tracing::warn!(error = %e, "failed to set hostname");
    }

    let Some(child) = dhcp else {
        return Ok(());
    };

    let pid = child.id();
    match wait_bounded(child, layout.dhcp_timeout)
        .map_err(|e| GuestError::io("waiting for dhclient", e))?
    {
        Some(status) if status.success() => {
            tracing::debug!(pid, "dhclient finished");
            Ok(())
        }
        Some(status) => Err(GuestError::io(
            "dhclient",
            std::io::Error::other(format!("exited with {status}")),
        )),
        None => {
            tracing::warn!(
                pid,
                timeout_ms = layout.dhcp_timeout.as_millis() as u64,
                "dhclient still running, continuing without waiting"
            );
            Ok(())
        }
    }
}

fn spawn_dhcp_client(path: &Path) -> Result<Option<Child>, GuestError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "dhcp client absent, skipping");
        return Ok(None);
    }

    let child = Command::new(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| GuestError::io(format!("spawning {}", path.display()), e))?;

    tracing::debug!(pid = child.id(), "dhclient started");
    Ok(Some(child))
}

/// Read the first line of `path` and set it as the kernel hostname.
pub fn apply_hostname(path: &Path) -> Result<String, GuestError> {
    let hostname = read_hostname(path)?;
    nix::unistd::sethostname(&hostname)
        .map_err(|e| GuestError::io("setting hostname", e.into()))?;

    tracing::info!(%hostname, "hostname set");
    Ok(hostname)
}

pub fn read_hostname(path: &Path) -> Result<String, GuestError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| GuestError::io(format!("reading {}", path.display()), e))?;

    let hostname = match contents.split_once('\n') {
        Some((first, _)) => first.to_owned(),
        None => contents,
    };

    if hostname.is_empty() {
        return Err(GuestError::io(
            format!("reading {}", path.display()),
            std::io::Error::new(std::io::ErrorKind::InvalidData, "empty hostname"),
        ));
    }
    Ok(hostname)
}

/// Wait for `child` to exit, giving up after `timeout`.
///
/// Returns `None` on timeout. The child is left running.
pub fn wait_bounded(mut child: Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
