//! Process level helpers shared by the bootstrap stages.

use nix::{
    errno::Errno,
    sched::CloneFlags,
    sys::signal::Signal,
    unistd::{ForkResult, Pid},
};
use std::{fs::OpenOptions, io, io::Write, path::Path};

/// Fork-style clone with `CLONE_PARENT`: the new process becomes a sibling
/// of the caller, so the process that launched the bootstrap reaps it after
/// the intermediate stages have exited. Unlike `clone(2)` with a callback no
/// new stack is involved; both processes continue from the call site, which
/// is what lets the final stage return out of the bootstrap.
pub(crate) fn clone_parent() -> nix::Result<ForkResult> {
    let flags = CloneFlags::CLONE_PARENT.bits() as libc::c_long | Signal::SIGCHLD as libc::c_long;
    let res = unsafe {
        libc::syscall(
            libc::SYS_clone,
            flags,
            std::ptr::null::<libc::c_void>(),
            0u64,
            0u64,
            0u64,
        )
    };

    Errno::result(res).map(|res| match res {
        0 => ForkResult::Child,
        res => ForkResult::Parent {
            child: Pid::from_raw(res as i32),
        },
    })
}

/// Set the name of the current process. The kernel truncates to 15 bytes
/// plus the terminating null. Best effort, the name only shows up in ps.
pub(crate) fn set_process_name(name: &str) {
    let mut name = name.as_bytes().to_vec();
    name.truncate(15);
    name.push(b'\0');

    unsafe { libc::prctl(libc::PR_SET_NAME, name.as_ptr() as libc::c_ulong, 0, 0, 0) };
}

/// Toggle the dumpable attribute. Non-dumpable processes cannot be reached
/// through /proc by their parent, which cuts both ways during the bootstrap:
/// it protects us from processes in joined namespaces and it blocks the map
/// writes the parent stage performs on our behalf.
pub(crate) fn set_dumpable(value: bool) -> nix::Result<()> {
    let res = unsafe { libc::prctl(libc::PR_SET_DUMPABLE, value as libc::c_ulong, 0, 0, 0) };
    Errno::result(res).map(drop)
}

/// Write `data` to an existing file in one go.
pub(crate) fn write_file<P: AsRef<Path>>(path: P, data: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.write_all(data.as_bytes())
}
