use crate::ShimError;
use nix::unistd::{User, geteuid, getgid, getuid};
use std::path::PathBuf;

/// The user invoking the launcher. The guest runs the workload as this
/// user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    pub euid: u32,
    pub home: PathBuf,
}

impl HostIdentity {
    /// Resolve the real user from the password database, falling back to
    /// `$USER` and `/home/$USER`.
    pub fn current() -> Result<Self, ShimError> {
        let uid = getuid();
        let euid = geteuid();
        let gid = getgid();
        let (username, home) = match User::from_uid(uid) {
            Ok(Some(user)) => (user.name, user.dir),
            lookup => {
                if let Err(e) = lookup {
                    tracing::debug!(error = %e, "passwd lookup failed");
                }
                let username = std::env::var("USER").map_err(|_| {
                    ShimError::HostEnvironment(
                        "cannot determine username: no passwd entry and USER is unset".to_string(),
                    )
                })?;
                let home = PathBuf::from("/home").join(&username);
                (username, home)
            }
        };

        Ok(Self {
            username,
            uid: uid.as_raw(),
            gid: gid.as_raw(),
            euid: euid.as_raw(),
            home,
        })
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0 || self.euid == 0
    }

    pub fn ensure_unprivileged(&self) -> Result<(), ShimError> {
        if self.is_root() {
            return Err(ShimError::RunningAsRoot);
        }
        Ok(())
    }
}
