//! Rootfs preparation inside the freshly unshared mount namespace.
//!
//! The mounts run between the mount namespace unshare and the user
//! namespace ID mapping, because the bind sources can become unreachable
//! once the mappings are in place. The child stage works with `"."` for the
//! rootfs itself: its working directory is the rootfs by contract with the
//! management daemon, and the absolute path may already be unsearchable
//! inside the new user namespace.

use nix::mount::{mount, MsFlags};

/// Apply the configured mount propagation to `/`.
pub(crate) fn set_propagation(flags: u32) -> nix::Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::from_bits_truncate(flags as libc::c_ulong),
        None::<&str>,
    )
}

/// Make the mount holding the rootfs private. Can fail with EACCES before
/// the user namespace is mapped; the caller defers and retries.
pub(crate) fn make_parent_private(parent_mount: &str) -> nix::Result<()> {
    mount(
        None::<&str>,
        parent_mount,
        None::<&str>,
        MsFlags::MS_PRIVATE,
        None::<&str>,
    )
}

/// Turn the rootfs into a mount point by binding the working directory over
/// itself. Required before the container can later pivot into it.
pub(crate) fn bind_self() -> nix::Result<()> {
    mount(
        Some("."),
        ".",
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
}

/// Mount shiftfs over itself for every configured path. The entry naming
/// the rootfs goes through `"."`.
pub(crate) fn mount_shiftfs(mounts: &[&str], rootfs: Option<&str>) -> nix::Result<()> {
    for path in mounts {
        if Some(*path) == rootfs {
            mount(
                Some("."),
                ".",
                Some("shiftfs"),
                MsFlags::empty(),
                None::<&str>,
            )?;
        } else {
            mount(
                Some(*path),
                *path,
                Some("shiftfs"),
                MsFlags::empty(),
                None::<&str>,
            )?;
        }
    }

    Ok(())
}
