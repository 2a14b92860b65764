//! Meridian system container runtime
//!
//! This crate holds the pieces of the runtime that must exist inside the
//! container executable itself: the multi-stage init bootstrap, the sealed
//! re-exec guard and the blocking IPC primitives shared with the management
//! daemon.

#![deny(missing_docs)]
#![deny(
    clippy::all,
    clippy::print_stderr,
    clippy::print_stdout,
    clippy::unwrap_used
)]

/// Container init bootstrap: namespace construction, ID mapping and rootfs
/// preparation staged across three processes.
pub mod bootstrap;

/// Post-bootstrap init seam. Receives the exec request from the management
/// daemon once the bootstrap handed off.
pub mod init;

/// Blocking framed IPC over unix sockets.
pub mod ipc;

/// Re-exec from a sealed memfd.
mod rexec;

/// Replace /proc/self/exe with a read-only and sealed memfd and (re)execve.
pub use rexec::ensure_sealed;
