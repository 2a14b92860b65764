//! The seam between the bootstrap and the managed runtime.
//!
//! When the bootstrap returns it does so in the container's init process,
//! with the init pipe as the only surviving connection to the management
//! daemon. The daemon continues the container setup protocol on that pipe;
//! the part implemented here is the last step of it: receive the exec
//! request and become the container payload.

use crate::{bootstrap::Handoff, ipc::FramedUnixStream};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::{ffi::CString, os::unix::net::UnixStream, process::exit};

/// Message from the management daemon to the container init.
#[derive(Debug, Serialize, Deserialize)]
pub enum Message {
    /// Replace the init process with the container payload.
    Exec {
        /// Absolute path of the payload executable inside the container.
        path: String,
        /// Arguments, `argv[0]` included.
        args: Vec<String>,
        /// Environment in `key=value` form.
        env: Vec<String>,
    },
}

/// Run the container init: wait for the exec request and execve it. Never
/// returns; a closed init pipe exits 0, everything else that goes wrong
/// exits 1.
pub fn run(handoff: Handoff) -> ! {
    let stream = UnixStream::from(handoff.init_pipe);
    let mut stream = FramedUnixStream::new(stream);

    match stream.recv::<Message>() {
        Ok(Some(Message::Exec { path, args, env })) => {
            debug!("executing {}", path);

            let path = cstring(path);
            let args = args.into_iter().map(cstring).collect::<Vec<_>>();
            let env = env.into_iter().map(cstring).collect::<Vec<_>>();

            // The payload must not inherit the init pipe.
            drop(stream);

            let err = nix::unistd::execve(&path, &args, &env);
            error!("failed to execve: {:?}", err);
            exit(1);
        }
        Ok(None) => {
            debug!("init pipe closed, exiting");
            exit(0);
        }
        Err(err) => {
            error!("failed to receive exec request: {}", err);
            exit(1);
        }
    }
}

fn cstring(value: String) -> CString {
    match CString::new(value) {
        Ok(value) => value,
        Err(err) => {
            error!("invalid exec request string: {}", err);
            exit(1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn exec_request_round_trip() {
        let (first, second) = UnixStream::pair().unwrap();
        let mut tx = FramedUnixStream::new(first);
        let mut rx = FramedUnixStream::new(second);

        tx.send(Message::Exec {
            path: "/sbin/init".to_string(),
            args: vec!["init".to_string(), "--debug".to_string()],
            env: vec!["PATH=/usr/bin".to_string()],
        })
        .unwrap();

        match rx.recv::<Message>().unwrap().unwrap() {
            Message::Exec { path, args, env } => {
                assert_eq!(path, "/sbin/init");
                assert_eq!(args, vec!["init", "--debug"]);
                assert_eq!(env, vec!["PATH=/usr/bin"]);
            }
        }
    }
}
