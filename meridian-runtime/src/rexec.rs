use anyhow::{anyhow, Context, Result};
use memfd::{FileSeal, Memfd, MemfdOptions};
use nix::unistd::fexecve;
use std::{
    env,
    ffi::CString,
    fs::File,
    io::{self, Seek},
    os::unix::prelude::AsRawFd,
};

/// Path to exe.
const EXE: &str = "/proc/self/exe";

/// Seals expected on and applied to the in-memory copy.
const SEALS: &[FileSeal] = &[
    FileSeal::SealShrink,
    FileSeal::SealGrow,
    FileSeal::SealWrite,
    FileSeal::SealSeal,
];

/// Ensure `/proc/self/exe` refers to a sealed in-memory copy of this
/// binary, re-executing from one if it does not.
///
/// A process inside the container inherits `/proc/self/exe` of its init,
/// and a write through that magic link would reach the host runtime binary
/// (CVE-2019-5736). A sealed memfd cannot be grown, shrunk or written, so
/// the container only ever sees a read-only copy.
///
/// Returns `Ok(())` when the current exe already is such a copy. Otherwise
/// the function only comes back on error: on success the process restarts
/// from the sealed copy with identical arguments and environment, and the
/// caller runs again.
pub fn ensure_sealed() -> Result<()> {
    let exe = File::open(EXE).context("failed to open /proc/self/exe")?;

    match Memfd::try_from_file(exe) {
        Ok(memfd) => {
            let seals = memfd.seals().context("failed to read exe seals")?;
            if !SEALS.iter().all(|seal| seals.contains(seal)) {
                return Err(anyhow!("exe is a memfd but not sealed"));
            }
            Ok(())
        }
        Err(exe) => reexec(exe),
    }
}

/// Copy `exe` into a fresh memfd, seal it and execute it.
fn reexec(exe: File) -> Result<()> {
    let name = env::current_exe().context("failed to get path of current exe")?;
    let memfd = MemfdOptions::default()
        .allow_sealing(true)
        .close_on_exec(true)
        .create(name.display().to_string())
        .context("failed to create memfd")?;

    let mut exe = io::BufReader::new(exe);
    io::copy(&mut exe, &mut memfd.as_file()).context("failed to copy exe")?;
    memfd
        .as_file()
        .seek(io::SeekFrom::Start(0))
        .context("failed to seek")?;
    SEALS
        .iter()
        .try_for_each(|seal| memfd.add_seal(*seal))
        .context("failed to add seal")?;

    // The environment travels as is: the init and log pipe variables must
    // survive into the sealed copy.
    let args = env::args()
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to convert arg")?;
    let env = env::vars()
        .map(|(key, value)| format!("{}={}", key, value))
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to convert env")?;

    match fexecve(memfd.as_raw_fd(), &args, &env) {
        Ok(infallible) => match infallible {},
        Err(errno) => Err(errno).context("failed to execute sealed copy"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::io::Write;

    fn sealed_memfd(seals: &[FileSeal]) -> Memfd {
        let memfd = MemfdOptions::default()
            .allow_sealing(true)
            .create("test")
            .unwrap();
        memfd.as_file().write_all(b"\x7fELF").unwrap();
        for seal in seals {
            memfd.add_seal(*seal).unwrap();
        }
        memfd
    }

    #[test]
    fn fully_sealed_memfd_is_accepted() {
        let memfd = sealed_memfd(SEALS);
        let seals = memfd.seals().unwrap();
        assert!(SEALS.iter().all(|seal| seals.contains(seal)));
    }

    #[test]
    fn unsealed_memfd_is_rejected() {
        let memfd = sealed_memfd(&[FileSeal::SealShrink]);
        let seals = memfd.seals().unwrap();
        assert!(!SEALS.iter().all(|seal| seals.contains(seal)));
    }

    #[test]
    fn regular_file_is_not_a_memfd() {
        let file = tempfile::tempfile().unwrap();
        assert!(Memfd::try_from_file(file).is_err());
    }
}
