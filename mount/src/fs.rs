use crate::error::MountError;
use nix::errno::Errno;
use nix::mount::{MsFlags, mount};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

// linux/mount.h
const OPEN_TREE_CLONE: libc::c_uint = 1;
const OPEN_TREE_CLOEXEC: libc::c_uint = libc::O_CLOEXEC as libc::c_uint;
const MOVE_MOUNT_F_EMPTY_PATH: libc::c_uint = 0x0000_0004;

fn pseudo_fs_flags() -> MsFlags {
    MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_RELATIME
}

fn c_path(path: &Path) -> Result<CString, MountError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| MountError::InvalidPath(path.display().to_string()))
}

/// Mount a fresh tmpfs over `target`.
pub fn mount_tmpfs(target: &Path) -> Result<(), MountError> {
    mount(
        Some("tmpfs"),
        target,
        Some("tmpfs"),
        pseudo_fs_flags(),
        None::<&str>,
    )
    .map_err(|source| MountError::MountFailed {
        fstype: "tmpfs",
        target: target.to_owned(),
        source,
    })?;

    tracing::info!(target = %target.display(), "mounted tmpfs");
    Ok(())
}

/// Mount binfmt_misc at `target`.
pub fn mount_binfmt_misc(target: &Path) -> Result<(), MountError> {
    mount(
        Some("binfmt_misc"),
        target,
        Some("binfmt_misc"),
        pseudo_fs_flags(),
        None::<&str>,
    )
    .map_err(|source| MountError::MountFailed {
        fstype: "binfmt_misc",
        target: target.to_owned(),
        source,
    })?;

    tracing::info!(target = %target.display(), "mounted binfmt_misc");
    Ok(())
}

/// Create `path` as an empty file, truncating anything already there.
pub fn ensure_stub_file(path: &Path) -> Result<(), MountError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map(drop)
        .map_err(|source| MountError::CreateStub {
            path: path.to_owned(),
            source,
        })
}

/// Clone the mount of the single file `source` and attach the clone over
/// `target`, so writes through `target` land in `source` instead.
pub fn clone_mount_file(source: &Path, target: &Path) -> Result<(), MountError> {
    ensure_stub_file(source)?;

    let tree = open_tree_clone(source)?;
    move_mount_onto(tree.as_fd(), target)?;

    tracing::info!(
        source = %source.display(),
        target = %target.display(),
        "clone-mounted file"
    );
    Ok(())
}

fn open_tree_clone(path: &Path) -> Result<OwnedFd, MountError> {
    let c_source = c_path(path)?;

    let ret = unsafe {
        libc::syscall(
            libc::SYS_open_tree,
            libc::AT_FDCWD,
            c_source.as_ptr(),
            OPEN_TREE_CLONE | OPEN_TREE_CLOEXEC,
        )
    };
    if ret < 0 {
        return Err(MountError::OpenTree {
            path: path.to_owned(),
            source: Errno::last(),
        });
    }

    // SAFETY: open_tree returned a fresh descriptor that nothing else owns.
    Ok(unsafe { OwnedFd::from_raw_fd(ret as RawFd) })
}

fn move_mount_onto(tree: BorrowedFd<'_>, target: &Path) -> Result<(), MountError> {
    let c_target = c_path(target)?;
    let empty = c"";

    let ret = unsafe {
        libc::syscall(
            libc::SYS_move_mount,
            tree.as_raw_fd(),
            empty.as_ptr(),
            libc::AT_FDCWD,
            c_target.as_ptr(),
            MOVE_MOUNT_F_EMPTY_PATH,
        )
    };
    if ret < 0 {
        return Err(MountError::MoveMount {
            target: target.to_owned(),
            source: Errno::last(),
        });
    }
    Ok(())
}
