//! Container init bootstrap.
//!
//! The bootstrap turns one process launched by the management daemon into a
//! fully isolated container init, staged across three processes inside the
//! same executable image:
//!
//! * the parent owns the `/proc/<pid>/{setgroups,uid_map,gid_map}` writes
//!   and brokers the pid report back to the daemon,
//! * the child joins existing namespaces, unshares the user and mount
//!   namespaces, prepares the rootfs and shiftfs mounts, then unshares the
//!   remaining namespaces,
//! * the grandchild enters the new pid namespace, finalizes its session and
//!   identity and is the only process that returns to the caller.
//!
//! The stages are created with fork-style `clone(CLONE_PARENT)` so both the
//! child and the grandchild are reparented to the daemon, which reaps them
//! after the parent has exited. Everything here runs before the daemon side
//! of the runtime exists in this process: coordination is blocking reads
//! and writes on two socketpairs and the init pipe, and any unexpected
//! token, short read or syscall failure ends the stage through [`bail`].

use log::debug;
use nix::{
    sched::{setns, unshare, CloneFlags},
    sys::signal::{kill, Signal},
    unistd::{self, ForkResult, Gid, Pid, Uid},
};
use serde::Serialize;
use std::{
    env,
    fs::File,
    os::unix::{
        io::AsRawFd,
        net::UnixStream,
        prelude::{FromRawFd, OwnedFd, RawFd},
    },
    process::exit,
};

pub mod config;
mod idmap;
mod logging;
mod rootfs;
mod sync;
mod util;

use crate::ipc::{socket_pair, SocketPair};
use config::{Config, Namespace, SetgroupsPolicy};
use idmap::MapKind;
use logging::bail;
use sync::Token;

/// Environment variable holding the init pipe fd number. Its presence is
/// what turns a plain invocation into a bootstrap.
const ENV_INIT_PIPE: &str = "_LIBCONTAINER_INITPIPE";

/// Byte the management daemon writes into the init pipe once cgroup
/// membership is applied and the grandchild may unshare the cgroup
/// namespace.
const CREATE_CGROUP_NS: u8 = 0x80;

/// Everything the bootstrap hands to the caller in the final init process.
#[derive(Debug)]
pub struct Handoff {
    /// The init pipe. The management daemon continues the container setup
    /// protocol on it after the bootstrap.
    pub init_pipe: OwnedFd,
}

/// Pid report sent to the management daemon. `pid` is the container init,
/// `pid_first` the intermediate child; the daemon must reap both because
/// they were cloned with `CLONE_PARENT`.
#[derive(Serialize)]
struct PidReport {
    pid: i32,
    pid_first: i32,
}

/// Run the container init bootstrap if the management daemon requested one.
///
/// Returns `None` when no init pipe is present in the environment: the
/// process was started for something that does not create a container and
/// the caller proceeds normally. Otherwise the calling process becomes the
/// bootstrap parent and never returns; only the final grandchild stage
/// comes back, inside the new container, with the [`Handoff`].
///
/// Must run before the process spawns any thread.
pub fn run() -> Option<Handoff> {
    // Attach the log pipe first so every later failure is reported.
    logging::attach();

    let init_pipe = init_pipe_fd()?;
    logging::install();

    // A container process must never reach the host binary through
    // /proc/self/exe. Re-exec from a sealed in-memory copy before touching
    // any untrusted configuration (CVE-2019-5736).
    if let Err(err) = crate::rexec::ensure_sealed() {
        bail!("could not ensure we are a cloned binary: {:#}", err);
    }

    debug!("bootstrap started");

    let payload = match config::read(init_pipe) {
        Ok(payload) => payload,
        Err(err) => bail!("{}", err),
    };
    let config = match Config::parse(&payload) {
        Ok(config) => config,
        Err(err) => bail!("{}", err),
    };

    // Start the init process at the lowest possible oom score so its
    // children may lower theirs; the configured value is applied by the
    // grandchild later.
    set_oom_score_adj("-999");

    // When joining namespaces we are about to switch security context.
    // Becoming non-dumpable keeps processes in those namespaces from
    // reaching host resources through us.
    if config.namespaces.is_some() && util::set_dumpable(false).is_err() {
        bail!("failed to set process as non-dumpable");
    }

    let child_sync = match socket_pair() {
        Ok(pair) => pair,
        Err(_) => bail!("failed to setup sync pipe between parent and child"),
    };
    // The grandchild gets its own socketpair so its handshake cannot race
    // with the child's.
    let grandchild_sync = match socket_pair() {
        Ok(pair) => pair,
        Err(_) => bail!("failed to setup sync pipe between parent and grandchild"),
    };

    util::set_process_name("runc:[0:PARENT]");

    match util::clone_parent() {
        Ok(ForkResult::Parent { child }) => {
            stage_parent(&config, child, child_sync, grandchild_sync, init_pipe)
        }
        Ok(ForkResult::Child) => Some(stage_child(
            &config,
            child_sync,
            grandchild_sync,
            init_pipe,
        )),
        Err(_) => bail!("unable to fork: child stage"),
    }
    // The payload buffer drops here, in the grandchild alone: the other
    // stages leave through exit() above.
}

fn init_pipe_fd() -> Option<RawFd> {
    let value = match env::var(ENV_INIT_PIPE) {
        Ok(value) if !value.is_empty() => value,
        _ => return None,
    };

    match value.parse::<i32>() {
        Ok(fd) => Some(fd),
        Err(_) => bail!("unable to parse {}", ENV_INIT_PIPE),
    }
}

fn set_oom_score_adj(value: &str) {
    if util::write_file("/proc/self/oom_score_adj", value).is_err() {
        bail!("failed to update /proc/self/oom_score_adj");
    }
}

/// Parent stage. Serves map requests from the child, forwards the pid
/// report and exits once both descendants signalled ready.
fn stage_parent(
    config: &Config,
    first_child: Pid,
    mut child_sync: SocketPair,
    mut grandchild_sync: SocketPair,
    init_pipe: RawFd,
) -> ! {
    let sync = child_sync.first();
    let mut child = first_child;
    let mut first_child = None;

    loop {
        let raw = match sync::recv(&sync) {
            Ok(raw) => raw,
            Err(_) => bail!("failed to sync with child: next state"),
        };

        match Token::from_raw(raw) {
            Some(Token::UsermapRequest) => {
                idmap::update_setgroups(child, config.effective_setgroups());
                idmap::update(MapKind::Uid, config.uidmap_helper, child, config.uidmap);
                idmap::update(MapKind::Gid, config.gidmap_helper, child, config.gidmap);

                if sync::send(&sync, Token::UsermapAck).is_err() {
                    kill(child, Signal::SIGKILL).ok();
                    bail!("failed to sync with child: write(usermap ack)");
                }
            }
            Some(Token::PidRequest) => {
                first_child = Some(child);

                child = match sync::recv_pid(&sync) {
                    Ok(pid) => pid,
                    Err(_) => {
                        kill(child, Signal::SIGKILL).ok();
                        bail!("failed to sync with child: read(child pid)");
                    }
                };

                if sync::send(&sync, Token::PidAck).is_err() {
                    if let Some(first) = first_child {
                        kill(first, Signal::SIGKILL).ok();
                    }
                    kill(child, Signal::SIGKILL).ok();
                    bail!("failed to sync with child: write(pid ack)");
                }

                // Report both pids: the daemon reaps the intermediate child
                // as well, it was cloned with CLONE_PARENT.
                let report = PidReport {
                    pid: child.as_raw(),
                    pid_first: first_child.map(Pid::as_raw).unwrap_or(-1),
                };
                let mut line =
                    serde_json::to_string(&report).unwrap_or_default();
                line.push('\n');
                if unistd::write(init_pipe, line.as_bytes()).is_err() {
                    kill(child, Signal::SIGKILL).ok();
                    bail!("failed to send pid report to the daemon");
                }
            }
            Some(Token::Ready) => break,
            _ => bail!("unexpected sync value: {}", raw),
        }
    }

    // The child is done; now release the grandchild into its final setup.
    let sync = grandchild_sync.first();

    if sync::send(&sync, Token::Proceed).is_err() {
        kill(child, Signal::SIGKILL).ok();
        bail!("failed to sync with grandchild: write(proceed)");
    }

    let raw = match sync::recv(&sync) {
        Ok(raw) => raw,
        Err(_) => bail!("failed to sync with grandchild: next state"),
    };
    if Token::from_raw(raw) != Some(Token::Ready) {
        bail!("unexpected sync value: {}", raw);
    }

    exit(0);
}

/// Child stage. Builds the namespace topology and the rootfs mounts, then
/// creates the grandchild and reports its pid upwards.
fn stage_child(
    config: &Config,
    mut child_sync: SocketPair,
    grandchild_sync: SocketPair,
    init_pipe: RawFd,
) -> Handoff {
    let sync = child_sync.second();

    util::set_process_name("runc:[1:CHILD]");

    // Joining has to happen here and not in the parent stage: the pid of
    // the grandchild would be meaningless to the daemon if this process
    // already sat inside a foreign pid namespace when it forked.
    if let Some(namespaces) = &config.namespaces {
        join_namespaces(namespaces);
    }

    // The user namespace comes first and alone: it is the context for every
    // later privilege check, and unsharing it together with other
    // namespaces has a history of kernel bugs around namespace ownership
    // (mqueue SELinux labels, network namespace ordering).
    let mut cloneflags = config.cloneflags;
    let mut new_userns = false;
    if cloneflags.contains(CloneFlags::CLONE_NEWUSER) {
        if unshare(CloneFlags::CLONE_NEWUSER).is_err() {
            bail!("failed to unshare user namespace");
        }
        cloneflags.remove(CloneFlags::CLONE_NEWUSER);
        new_userns = true;
    }

    // The mount namespace must exist before the rootfs preparation below.
    if cloneflags.contains(CloneFlags::CLONE_NEWNS) {
        if unshare(CloneFlags::CLONE_NEWNS).is_err() {
            bail!("failed to unshare mount namespace");
        }
        cloneflags.remove(CloneFlags::CLONE_NEWNS);
    }

    // Rootfs and shiftfs preparation sits between the mount namespace
    // unshare and the ID mapping: once the mappings are written this
    // process may lose search permission on the bind sources.
    let mut parent_priv_done = false;
    let mut shiftfs_done = false;
    if config.prep_rootfs {
        if rootfs::set_propagation(config.rootfs_prop).is_err() {
            bail!("failed to set rootfs mount propagation");
        }

        if config.make_parent_priv {
            // Can be denied before the mappings are written; retried after.
            parent_priv_done =
                rootfs::make_parent_private(config.parent_mount.unwrap_or_default()).is_ok();
        }

        if !config.make_parent_priv || parent_priv_done {
            if rootfs::bind_self().is_err() {
                bail!("failed to create bind-to-self mount on rootfs");
            }
            shiftfs_done =
                rootfs::mount_shiftfs(&config.shiftfs_mounts, config.rootfs).is_ok();
        }
    }

    if new_userns {
        // The parent writes our map files through /proc, which requires us
        // to be dumpable while it does. Only needed after a security
        // context switch; restored right after the ack.
        if config.namespaces.is_some() && util::set_dumpable(true).is_err() {
            bail!("failed to set process as dumpable");
        }

        debug!("requesting ID map");
        if sync::send(&sync, Token::UsermapRequest).is_err() {
            bail!("failed to sync with parent: write(usermap request)");
        }
        let raw = match sync::recv(&sync) {
            Ok(raw) => raw,
            Err(_) => bail!("failed to sync with parent: read(usermap ack)"),
        };
        if Token::from_raw(raw) != Some(Token::UsermapAck) {
            bail!("failed to sync with parent: expected usermap ack, got {}", raw);
        }

        if config.namespaces.is_some() && util::set_dumpable(false).is_err() {
            bail!("failed to set process as non-dumpable");
        }

        let root = Uid::from_raw(0);
        if unistd::setresuid(root, root, root).is_err() {
            bail!("failed to become root in user namespace");
        }
    }

    // Deferred rootfs steps, retried now that the mappings are in place.
    if config.make_parent_priv && !parent_priv_done {
        if rootfs::make_parent_private(config.parent_mount.unwrap_or_default()).is_err() {
            bail!("failed to set rootfs parent mount propagation to private");
        }
        if rootfs::bind_self().is_err() {
            bail!("failed to create bind-to-self mount on rootfs");
        }
    }
    if config.prep_rootfs && !shiftfs_done {
        if rootfs::mount_shiftfs(&config.shiftfs_mounts, config.rootfs).is_err() {
            bail!("failed to setup shiftfs mounts");
        }
    }

    // Everything except the cgroup namespace, which waits in the grandchild
    // until the daemon applied cgroup membership. Kept separate from the
    // clone below for the benefit of old kernels where CLONE_PARENT and
    // CLONE_NEWPID did not mix.
    if unshare(cloneflags.difference(CloneFlags::CLONE_NEWCGROUP)).is_err() {
        bail!("failed to unshare namespaces");
    }

    // One more process: neither unshare nor setns moves the caller into a
    // pid namespace, only its children.
    match util::clone_parent() {
        Ok(ForkResult::Parent { child }) => {
            if sync::send(&sync, Token::PidRequest).is_err() {
                kill(child, Signal::SIGKILL).ok();
                bail!("failed to sync with parent: write(pid request)");
            }
            if sync::send_pid(&sync, child).is_err() {
                kill(child, Signal::SIGKILL).ok();
                bail!("failed to sync with parent: write(child pid)");
            }

            let raw = match sync::recv(&sync) {
                Ok(raw) => raw,
                Err(_) => {
                    kill(child, Signal::SIGKILL).ok();
                    bail!("failed to sync with parent: read(pid ack)");
                }
            };
            if Token::from_raw(raw) != Some(Token::PidAck) {
                kill(child, Signal::SIGKILL).ok();
                bail!("failed to sync with parent: expected pid ack, got {}", raw);
            }

            if sync::send(&sync, Token::Ready).is_err() {
                kill(child, Signal::SIGKILL).ok();
                bail!("failed to sync with parent: write(ready)");
            }

            // The grandchild does the rest of the work.
            exit(0);
        }
        Ok(ForkResult::Child) => stage_init(config, sync, grandchild_sync, init_pipe),
        Err(_) => bail!("unable to fork: init stage"),
    }
}

/// Grandchild stage: the container init. Finalizes oom score, session and
/// identity, waits for the cgroup handoff and returns to the caller.
fn stage_init(
    config: &Config,
    child_sync: UnixStream,
    mut grandchild_sync: SocketPair,
    init_pipe: RawFd,
) -> Handoff {
    let sync = grandchild_sync.second();
    // The child socketpair belongs to the stages above.
    drop(child_sync);

    util::set_process_name("runc:[2:INIT]");

    // The mapped user namespace reset dumpable, which blocks the write to
    // /proc/self/oom_score_adj. Open a short dumpable window for it.
    if util::set_dumpable(true).is_err() {
        bail!("failed to set process as dumpable");
    }
    if let Some(oom_score_adj) = config.oom_score_adj {
        set_oom_score_adj(oom_score_adj);
    }
    if util::set_dumpable(false).is_err() {
        bail!("failed to set process as non-dumpable");
    }

    let raw = match sync::recv(&sync) {
        Ok(raw) => raw,
        Err(_) => bail!("failed to sync with parent: read(proceed)"),
    };
    if Token::from_raw(raw) != Some(Token::Proceed) {
        bail!("failed to sync with parent: expected proceed, got {}", raw);
    }

    if unistd::setsid().is_err() {
        bail!("setsid failed");
    }
    if unistd::setuid(Uid::from_raw(0)).is_err() {
        bail!("setuid failed");
    }
    if unistd::setgid(Gid::from_raw(0)).is_err() {
        bail!("setgid failed");
    }

    if !config.is_rootless_euid && config.setgroups == SetgroupsPolicy::Allow {
        // Drop the supplementary groups inherited from the daemon.
        if unistd::setgroups(&[]).is_err() {
            bail!("setgroups failed");
        }
    }

    // The daemon applies cgroup membership first, then signals us through
    // the init pipe; only then may the cgroup namespace be unshared.
    if config.cloneflags.contains(CloneFlags::CLONE_NEWCGROUP) {
        let mut value = [0u8; 1];
        match unistd::read(init_pipe, &mut value) {
            Ok(1) => (),
            _ => bail!("failed to read cgroup synchronisation byte"),
        }
        if value[0] != CREATE_CGROUP_NS {
            bail!("received unknown synchronisation value");
        }
        if unshare(CloneFlags::CLONE_NEWCGROUP).is_err() {
            bail!("failed to unshare cgroup namespace");
        }
    }

    if sync::send(&sync, Token::Ready).is_err() {
        bail!("failed to sync with parent: write(ready)");
    }
    drop(sync);

    debug!("bootstrap complete, returning to the runtime");

    Handoff {
        init_pipe: unsafe { OwnedFd::from_raw_fd(init_pipe) },
    }
}

/// Join the given namespaces in their configured order. All handles are
/// opened up front: after joining a mount namespace the remaining paths may
/// no longer resolve.
fn join_namespaces(namespaces: &[Namespace]) {
    let mut handles = Vec::with_capacity(namespaces.len());
    for namespace in namespaces {
        match File::open(namespace.path) {
            Ok(file) => handles.push((file, namespace)),
            Err(_) => bail!("failed to open {}", namespace.path),
        }
    }

    // The order is authoritative: the daemon puts the user namespace first.
    for (file, namespace) in handles {
        debug!("joining namespace {}", namespace.path);
        if setns(file.as_raw_fd(), namespace.kind).is_err() {
            bail!("failed to setns to {}", namespace.path);
        }
    }
}
