//! Blocking IPC primitives shared by the bootstrap and the init seam.

use bincode::{DefaultOptions, Options};
use byteorder::{BigEndian, WriteBytesExt};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    io::{self, ErrorKind, Read},
    os::unix::net::UnixStream,
};

/// Create a connected pair of unix sockets.
pub fn socket_pair() -> io::Result<SocketPair> {
    let (first, second) = UnixStream::pair()?;

    Ok(SocketPair {
        first: Some(first),
        second: Some(second),
    })
}

/// A socketpair whose ends are claimed on either side of a fork: taking one
/// end closes the other in the taking process.
#[derive(Debug)]
pub struct SocketPair {
    first: Option<UnixStream>,
    second: Option<UnixStream>,
}

impl SocketPair {
    /// Take the first end and close the second.
    pub fn first(&mut self) -> UnixStream {
        self.second.take().expect("double take");
        self.first.take().expect("double take")
    }

    /// Take the second end and close the first.
    pub fn second(&mut self) -> UnixStream {
        self.first.take().expect("double take");
        self.second.take().expect("double take")
    }
}

/// Bincode encoded and length delimited message stream via Read/Write.
#[derive(Debug)]
pub struct FramedUnixStream(UnixStream);

impl FramedUnixStream {
    /// Wrap a connected stream.
    pub fn new(inner: UnixStream) -> Self {
        Self(inner)
    }

    /// Send a bincode encoded message with a length field.
    pub fn send<M: Serialize>(&mut self, message: M) -> io::Result<()> {
        let size = DefaultOptions::default()
            .serialized_size(&message)
            .map_err(|e| io::Error::new(ErrorKind::Other, e))?;
        self.0.write_u32::<BigEndian>(size as u32)?;
        DefaultOptions::default()
            .serialize_into(&mut self.0, &message)
            .map_err(|e| io::Error::new(ErrorKind::Other, e))
    }

    /// Receive a bincode encoded message with a length field. Returns `None`
    /// when the peer closed the stream.
    pub fn recv<M: DeserializeOwned>(&mut self) -> io::Result<Option<M>> {
        // Discard the size; bincode knows where the message ends.
        let mut size = [0u8; 4];
        match self.0.read_exact(&mut size) {
            Ok(()) => (),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        DefaultOptions::default()
            .deserialize_from(&self.0)
            .map(Some)
            .map_err(|e| io::Error::new(ErrorKind::Other, e))
    }

    /// Into UnixStream.
    pub fn into_inner(self) -> UnixStream {
        self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::process::exit;

    const ITERATIONS: usize = 1_000;

    #[test]
    fn send_recv() {
        let (first, second) = UnixStream::pair().unwrap();

        match unsafe { nix::unistd::fork() }.unwrap() {
            nix::unistd::ForkResult::Parent { child: _ } => {
                drop(second);
                let mut stream = FramedUnixStream::new(first);
                for n in 0..ITERATIONS {
                    let tx = format!("message-{}", n);
                    stream.send(&tx).unwrap();
                    let rx = stream.recv::<String>().unwrap().unwrap();
                    assert_eq!(tx, rx);
                }
            }
            nix::unistd::ForkResult::Child => {
                drop(first);
                let mut stream = FramedUnixStream::new(second);
                while let Ok(Some(s)) = stream.recv::<String>() {
                    stream.send(s).unwrap();
                }
                exit(0);
            }
        }
    }

    #[test]
    fn recv_on_closed_stream_is_none() {
        let (first, second) = UnixStream::pair().unwrap();
        drop(first);
        let mut stream = FramedUnixStream::new(second);
        assert!(stream.recv::<String>().unwrap().is_none());
    }

    #[test]
    fn socket_pair_takes_one_end() {
        let mut pair = socket_pair().unwrap();
        let _first = pair.first();
    }

    #[test]
    #[should_panic(expected = "double take")]
    fn socket_pair_double_take_panics() {
        let mut pair = socket_pair().unwrap();
        let _first = pair.first();
        let _second = pair.second();
    }
}
