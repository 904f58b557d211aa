//! One-way transition from root to the target identity.

use crate::GuestIdentity;
use crate::error::GuestError;
use nix::unistd::{Gid, Uid};

/// Process credential changes, split out so the ordering can be exercised
/// without root.
pub trait Credentials {
    fn set_groups(&mut self, groups: &[Gid]) -> nix::Result<()>;
    fn set_gid(&mut self, gid: Gid) -> nix::Result<()>;
    fn set_uid(&mut self, uid: Uid) -> nix::Result<()>;
}

/// Changes the credentials of the calling process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCredentials;

impl Credentials for ProcessCredentials {
    fn set_groups(&mut self, groups: &[Gid]) -> nix::Result<()> {
        nix::unistd::setgroups(groups)
    }

    fn set_gid(&mut self, gid: Gid) -> nix::Result<()> {
        nix::unistd::setgid(gid)
    }

    fn set_uid(&mut self, uid: Uid) -> nix::Result<()> {
        nix::unistd::setuid(uid)
    }
}

/// Switch to `identity`. Root's supplementary groups are replaced by the
/// target gid, then the gid and finally the uid change: once the uid is
/// dropped the process can no longer change its groups.
pub fn drop_privileges<C>(credentials: &mut C, identity: &GuestIdentity) -> Result<(), GuestError>
where
    C: Credentials + ?Sized,
{
    let gid = Gid::from_raw(identity.gid);

    credentials
        .set_groups(&[gid])
        .map_err(|source| GuestError::Privilege {
            op: "setgroups",
            id: identity.gid,
            source,
        })?;

    credentials
        .set_gid(gid)
        .map_err(|source| GuestError::Privilege {
            op: "setgid",
            id: identity.gid,
            source,
        })?;

    credentials
        .set_uid(Uid::from_raw(identity.uid))
        .map_err(|source| GuestError::Privilege {
            op: "setuid",
            id: identity.uid,
            source,
        })?;

    tracing::info!(
        user = %identity.username,
        uid = identity.uid,
        gid = identity.gid,
        "dropped privileges"
    );
    Ok(())
}
