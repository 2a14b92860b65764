//! ID map and setgroups writes the parent stage performs on behalf of the
//! child. The child cannot write its own maps: it dropped all capabilities
//! in the old user namespace when it unshared the new one.

use super::{
    config::SetgroupsPolicy,
    logging::bail,
    util,
};
use nix::{
    errno::Errno,
    sys::wait::{waitpid, WaitStatus},
    unistd::{self, Pid},
};
use std::ffi::CString;

/// Largest argv the mapping helper is invoked with, helper name and pid
/// included.
const MAX_ARGV: usize = 20;

#[derive(Clone, Copy)]
pub(crate) enum MapKind {
    Uid,
    Gid,
}

impl MapKind {
    fn file(self) -> &'static str {
        match self {
            MapKind::Uid => "uid_map",
            MapKind::Gid => "gid_map",
        }
    }

    fn tool(self) -> &'static str {
        match self {
            MapKind::Uid => "newuidmap",
            MapKind::Gid => "newgidmap",
        }
    }
}

/// Write the setgroups policy of `pid`. Must happen before the gid map is
/// written; the kernel rejects gid maps from unprivileged writers otherwise.
pub(crate) fn update_setgroups(pid: Pid, policy: SetgroupsPolicy) {
    let policy = match policy {
        SetgroupsPolicy::Allow => "allow",
        SetgroupsPolicy::Deny => "deny",
        SetgroupsPolicy::Default => return,
    };

    if let Err(err) = util::write_file(format!("/proc/{}/setgroups", pid), policy) {
        // Kernels older than 3.19 have no setgroups file. That is fine.
        if err.raw_os_error() != Some(libc::ENOENT) {
            bail!("failed to write '{}' to /proc/{}/setgroups", policy, pid);
        }
    }
}

/// Write an ID map for `pid`, falling back to the unprivileged mapping
/// helper when the direct write is denied.
pub(crate) fn update(kind: MapKind, helper: Option<&str>, pid: Pid, map: Option<&str>) {
    let map = match map {
        Some(map) if !map.is_empty() => map,
        _ => return,
    };

    match util::write_file(format!("/proc/{}/{}", pid, kind.file()), map) {
        Ok(()) => (),
        Err(err) if err.raw_os_error() == Some(libc::EPERM) => {
            if !mapping_tool(helper, pid, map) {
                bail!("failed to use {} on {}", kind.tool(), pid);
            }
        }
        Err(_) => bail!("failed to update /proc/{}/{}", pid, kind.file()),
    }
}

/// Run the mapping helper as `<helper> <pid> <inside> <outside> <length>
/// ...` and report whether it exited with status 0.
fn mapping_tool(tool: Option<&str>, pid: Pid, map: &str) -> bool {
    // There is no backup to the helper failing; a missing path at this
    // point is a configuration error.
    let tool = match tool {
        Some(tool) => tool,
        None => bail!("mapping tool not present"),
    };

    match unsafe { unistd::fork() } {
        Err(_) => bail!("failed to fork"),
        Ok(unistd::ForkResult::Child) => {
            let path = match CString::new(tool) {
                Ok(path) => path,
                Err(_) => bail!("invalid mapping tool path"),
            };
            let mut argv = vec![path.clone(), pid_argument(pid)];
            for token in tokenize(map).into_iter().take(MAX_ARGV - 2) {
                match CString::new(token) {
                    Ok(token) => argv.push(token),
                    Err(_) => bail!("invalid mapping argument"),
                }
            }

            let env: [&std::ffi::CStr; 0] = [];
            let _ = unistd::execve(&path, &argv, &env);
            bail!("failed to execv");
        }
        Ok(unistd::ForkResult::Parent { child }) => loop {
            match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, status)) => break status == 0,
                Ok(WaitStatus::Signaled(_, _, _)) => break false,
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(_) => bail!("failed to waitpid"),
            }
        },
    }
}

fn pid_argument(pid: Pid) -> CString {
    CString::new(pid.as_raw().to_string()).expect("pid strings contain no null bytes")
}

/// Split a map blob the way the setuid helpers expect their arguments: the
/// text is cut at every space or newline and subsequent separator runs are
/// swallowed. A blob starting with a separator yields an empty first
/// argument; the helpers reject it, which is the historical behavior for
/// malformed maps.
fn tokenize(map: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut rest = map;

    while !rest.is_empty() {
        match rest.find(|c| c == ' ' || c == '\n') {
            Some(at) => {
                args.push(&rest[..at]);
                rest = rest[at + 1..].trim_start_matches(|c| c == ' ' || c == '\n');
            }
            None => {
                args.push(rest);
                break;
            }
        }
    }

    args
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::{fs, io::Write, os::unix::fs::PermissionsExt};

    #[test]
    fn tokenize_single_triple() {
        assert_eq!(tokenize("0 100000 65536"), vec!["0", "100000", "65536"]);
    }

    #[test]
    fn tokenize_multi_line_map() {
        assert_eq!(
            tokenize("0 100000 65536\n1 200000 1"),
            vec!["0", "100000", "65536", "1", "200000", "1"]
        );
    }

    #[test]
    fn tokenize_collapses_separator_runs() {
        assert_eq!(tokenize("0  1000 \n 1"), vec!["0", "1000", "1"]);
    }

    #[test]
    fn tokenize_leading_separator_yields_empty_argument() {
        assert_eq!(tokenize("\n0 1000 1"), vec!["", "0", "1000", "1"]);
    }

    #[test]
    fn tokenize_trailing_separator() {
        assert_eq!(tokenize("0 1000 1\n"), vec!["0", "1000", "1"]);
    }

    #[test]
    fn tokenize_empty() {
        assert_eq!(tokenize(""), Vec::<&str>::new());
    }

    /// Write a one line shell script and make it executable.
    fn script(dir: &std::path::Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        let mut permissions = file.metadata().unwrap().permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn mapping_tool_requires_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ok = script(dir.path(), "ok", "exit 0");
        let fail = script(dir.path(), "fail", "exit 3");

        let pid = Pid::from_raw(1234);
        assert!(mapping_tool(Some(&ok), pid, "0 100000 65536"));
        assert!(!mapping_tool(Some(&fail), pid, "0 100000 65536"));
    }

    #[test]
    fn mapping_tool_receives_tokenized_map() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("argv");
        let tool = script(
            dir.path(),
            "record",
            &format!("echo \"$@\" > {}", out.display()),
        );

        assert!(mapping_tool(
            Some(&tool),
            Pid::from_raw(42),
            "0 100000 65536\n1 200000 1"
        ));
        let recorded = fs::read_to_string(&out).unwrap();
        assert_eq!(recorded.trim_end(), "42 0 100000 65536 1 200000 1");
    }
}
