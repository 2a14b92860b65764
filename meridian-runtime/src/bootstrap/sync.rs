//! Synchronisation tokens exchanged between the bootstrap stages.
//!
//! Both ends of a sync socket are always the same executable, but the token
//! width is pinned to four bytes anyway so the wire never depends on an
//! implicit enum representation.

use std::{
    io::{self, Read, Write},
    os::unix::net::UnixStream,
};

/// A token on one of the stage sync sockets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum Token {
    /// Child asks the parent to write its uid and gid maps.
    UsermapRequest = 0x40,
    /// Parent finished writing the maps.
    UsermapAck = 0x41,
    /// Child announces the pid of the init process it just created.
    PidRequest = 0x42,
    /// Parent received and reported the pid.
    PidAck = 0x43,
    /// Parent releases the init process into its final setup.
    Proceed = 0x44,
    /// Child or init stage finished its part of the bootstrap.
    Ready = 0x45,
}

impl Token {
    pub(crate) fn from_raw(raw: u32) -> Option<Token> {
        match raw {
            0x40 => Some(Token::UsermapRequest),
            0x41 => Some(Token::UsermapAck),
            0x42 => Some(Token::PidRequest),
            0x43 => Some(Token::PidAck),
            0x44 => Some(Token::Proceed),
            0x45 => Some(Token::Ready),
            _ => None,
        }
    }
}

pub(crate) fn send(mut stream: &UnixStream, token: Token) -> io::Result<()> {
    stream.write_all(&(token as u32).to_ne_bytes())
}

/// Receive a raw token value. Decoding is left to the caller because an
/// unexpected value is reported, not retried.
pub(crate) fn recv(mut stream: &UnixStream) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

pub(crate) fn send_pid(mut stream: &UnixStream, pid: nix::unistd::Pid) -> io::Result<()> {
    stream.write_all(&pid.as_raw().to_ne_bytes())
}

pub(crate) fn recv_pid(mut stream: &UnixStream) -> io::Result<nix::unistd::Pid> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(nix::unistd::Pid::from_raw(i32::from_ne_bytes(buf)))
}
