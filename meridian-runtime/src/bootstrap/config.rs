//! Bootstrap configuration wire format.
//!
//! The management daemon writes a single netlink formatted message into the
//! init pipe before the stages start. The message is a standard `nlmsghdr`
//! followed by a sequence of 4-byte aligned `(type, len, payload)`
//! attributes. The attribute space is fixed; an unknown attribute aborts the
//! bootstrap because a partially understood configuration must never produce
//! a partially isolated container.

use byteorder::{NativeEndian, WriteBytesExt};
use nix::sched::CloneFlags;
use std::os::unix::prelude::RawFd;
use thiserror::Error;

/// Message type of the bootstrap configuration. Pinned for wire
/// compatibility with the management daemon.
const INIT_MSG: u16 = 62000;
/// Standard netlink error message type.
const NLMSG_ERROR: u16 = 0x2;

/// Size of the netlink message header on the wire.
pub(crate) const NLMSG_HDRLEN: usize = 16;
/// Size of an attribute header on the wire.
const NLA_HDRLEN: usize = 4;

const CLONE_FLAGS_ATTR: u16 = 27281;
const NS_PATHS_ATTR: u16 = 27282;
const UIDMAP_ATTR: u16 = 27283;
const GIDMAP_ATTR: u16 = 27284;
const SETGROUP_ATTR: u16 = 27285;
const OOM_SCORE_ADJ_ATTR: u16 = 27286;
const ROOTLESS_EUID_ATTR: u16 = 27287;
const UIDMAPPATH_ATTR: u16 = 27288;
const GIDMAPPATH_ATTR: u16 = 27289;
const PREP_ROOTFS_ATTR: u16 = 27290;
const MAKE_PARENT_PRIV_ATTR: u16 = 27291;
const ROOTFS_PROP_ATTR: u16 = 27292;
const ROOTFS_ATTR: u16 = 27293;
const PARENT_MOUNT_ATTR: u16 = 27294;
const SHIFTFS_MOUNTS_ATTR: u16 = 27295;

/// Errors produced while reading or decoding the configuration message.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The header read returned the wrong number of bytes.
    #[error("invalid netlink header length {0}")]
    HeaderLength(usize),
    /// The management daemon signalled an error instead of a configuration.
    #[error("failed to read netlink message")]
    ErrorMessage,
    /// The message type is not the bootstrap configuration type.
    #[error("unexpected msg type {0}")]
    MessageType(u16),
    /// The payload read returned the wrong number of bytes.
    #[error("failed to read netlink payload, {0} != {1}")]
    PayloadLength(usize, usize),
    /// An attribute header or payload exceeds the message bounds.
    #[error("truncated netlink attribute")]
    Truncated,
    /// The attribute type is not part of the fixed attribute space.
    #[error("unknown netlink message type {0}")]
    UnknownAttribute(u16),
    /// A string attribute holds invalid utf-8.
    #[error("invalid string in netlink attribute {0}")]
    InvalidString(u16),
    /// The setgroups policy byte is none of default, allow or deny.
    #[error("invalid setgroups policy {0}")]
    InvalidSetgroups(u8),
    /// The namespace path attribute is present but empty.
    #[error("ns paths are empty")]
    EmptyNamespaces,
    /// A namespace entry is not of the form `kind:path`.
    #[error("failed to parse {0}")]
    InvalidNamespace(String),
}

/// Policy written to `/proc/<pid>/setgroups` before the gid map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum SetgroupsPolicy {
    /// Leave the kernel default untouched.
    #[default]
    Default = 0,
    /// Allow `setgroups(2)` in the new user namespace.
    Allow = 1,
    /// Deny `setgroups(2)` in the new user namespace.
    Deny = 2,
}

/// One existing namespace the child stage joins before unsharing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Namespace<'a> {
    /// Namespace kind as a setns flag. Empty means "let the kernel decide
    /// from the handle", mirroring an unrecognised kind string.
    pub kind: CloneFlags,
    /// Path to the namespace handle, typically under `/proc/<pid>/ns`.
    pub path: &'a str,
}

/// Decoded bootstrap configuration. String values borrow from the payload
/// buffer, which the final stage alone releases when the bootstrap returns.
#[derive(Debug, PartialEq)]
pub struct Config<'a> {
    /// Namespaces to create, as clone flags.
    pub cloneflags: CloneFlags,
    /// Uid map written by the parent stage, raw `inside outside length`
    /// lines.
    pub uidmap: Option<&'a str>,
    /// Gid map written by the parent stage.
    pub gidmap: Option<&'a str>,
    /// Namespaces to join before unsharing, in authoritative order.
    pub namespaces: Option<Vec<Namespace<'a>>>,
    /// Setgroups policy for the new user namespace.
    pub setgroups: SetgroupsPolicy,
    /// Whether the management daemon runs without effective root.
    pub is_rootless_euid: bool,
    /// Helper binary for uid maps the parent may not write directly.
    pub uidmap_helper: Option<&'a str>,
    /// Helper binary for gid maps.
    pub gidmap_helper: Option<&'a str>,
    /// Value for `/proc/self/oom_score_adj` of the final init process.
    pub oom_score_adj: Option<&'a str>,
    /// Prepare the rootfs mounts inside the new mount namespace.
    pub prep_rootfs: bool,
    /// Make the mount holding the rootfs private before binding.
    pub make_parent_priv: bool,
    /// Mount propagation applied to `/` when preparing the rootfs.
    pub rootfs_prop: u32,
    /// Path of the container rootfs. The child stage runs with this as its
    /// working directory.
    pub rootfs: Option<&'a str>,
    /// Path of the mount the rootfs lives on.
    pub parent_mount: Option<&'a str>,
    /// Paths mounted shiftfs over themselves, rootfs entry included.
    pub shiftfs_mounts: Vec<&'a str>,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Config {
            cloneflags: CloneFlags::empty(),
            uidmap: None,
            gidmap: None,
            namespaces: None,
            setgroups: SetgroupsPolicy::Default,
            is_rootless_euid: false,
            uidmap_helper: None,
            gidmap_helper: None,
            oom_score_adj: None,
            prep_rootfs: false,
            make_parent_priv: false,
            rootfs_prop: 0,
            rootfs: None,
            parent_mount: None,
            shiftfs_mounts: Vec::new(),
        }
    }
}

/// Read the netlink message from the init pipe and return the payload. The
/// reads mirror the wire contract: one read for the header, one for the
/// payload, and a short read of either is an error, not a retry.
pub(crate) fn read(fd: RawFd) -> Result<Vec<u8>, Error> {
    let mut hdr = [0u8; NLMSG_HDRLEN];
    let len = nix::unistd::read(fd, &mut hdr).unwrap_or(0);
    if len != NLMSG_HDRLEN {
        return Err(Error::HeaderLength(len));
    }

    let nlmsg_len = read_u32(&hdr, 0);
    let nlmsg_type = read_u16(&hdr, 4);

    if nlmsg_type == NLMSG_ERROR {
        return Err(Error::ErrorMessage);
    }
    if nlmsg_type != INIT_MSG {
        return Err(Error::MessageType(nlmsg_type));
    }

    let size = (nlmsg_len as usize)
        .checked_sub(NLMSG_HDRLEN)
        .ok_or(Error::HeaderLength(nlmsg_len as usize))?;

    let mut data = vec![0u8; size];
    let len = nix::unistd::read(fd, &mut data).unwrap_or(0);
    if len != size {
        return Err(Error::PayloadLength(len, size));
    }

    Ok(data)
}

impl<'a> Config<'a> {
    /// Decode the attribute sequence of a configuration payload.
    pub fn parse(data: &'a [u8]) -> Result<Config<'a>, Error> {
        let mut config = Config::default();
        let mut offset = 0;

        while offset < data.len() {
            if data.len() - offset < NLA_HDRLEN {
                return Err(Error::Truncated);
            }
            let nla_len = read_u16(data, offset) as usize;
            let nla_type = read_u16(data, offset + 2);
            let payload_len = nla_len.checked_sub(NLA_HDRLEN).ok_or(Error::Truncated)?;
            let payload = data
                .get(offset + NLA_HDRLEN..offset + NLA_HDRLEN + payload_len)
                .ok_or(Error::Truncated)?;

            match nla_type {
                CLONE_FLAGS_ATTR => {
                    config.cloneflags =
                        CloneFlags::from_bits_truncate(attr_u32(payload)? as libc::c_int);
                }
                NS_PATHS_ATTR => {
                    config.namespaces = Some(parse_namespaces(attr_str(payload, nla_type)?)?);
                }
                UIDMAP_ATTR => config.uidmap = attr_opt_str(payload, nla_type)?,
                GIDMAP_ATTR => config.gidmap = attr_opt_str(payload, nla_type)?,
                SETGROUP_ATTR => {
                    config.setgroups = match attr_u8(payload)? {
                        0 => SetgroupsPolicy::Default,
                        1 => SetgroupsPolicy::Allow,
                        2 => SetgroupsPolicy::Deny,
                        value => return Err(Error::InvalidSetgroups(value)),
                    };
                }
                OOM_SCORE_ADJ_ATTR => config.oom_score_adj = attr_opt_str(payload, nla_type)?,
                ROOTLESS_EUID_ATTR => config.is_rootless_euid = attr_u8(payload)? != 0,
                UIDMAPPATH_ATTR => config.uidmap_helper = attr_opt_str(payload, nla_type)?,
                GIDMAPPATH_ATTR => config.gidmap_helper = attr_opt_str(payload, nla_type)?,
                PREP_ROOTFS_ATTR => config.prep_rootfs = attr_u8(payload)? != 0,
                MAKE_PARENT_PRIV_ATTR => config.make_parent_priv = attr_u8(payload)? != 0,
                ROOTFS_PROP_ATTR => config.rootfs_prop = attr_u32(payload)?,
                ROOTFS_ATTR => config.rootfs = attr_opt_str(payload, nla_type)?,
                PARENT_MOUNT_ATTR => config.parent_mount = attr_opt_str(payload, nla_type)?,
                SHIFTFS_MOUNTS_ATTR => {
                    config.shiftfs_mounts = attr_str(payload, nla_type)?
                        .split(',')
                        .filter(|path| !path.is_empty())
                        .collect();
                }
                unknown => return Err(Error::UnknownAttribute(unknown)),
            }

            offset += NLA_HDRLEN + align4(payload_len);
        }

        Ok(config)
    }

    /// The setgroups policy the parent stage actually writes. Rootless
    /// single-entry mappings must deny setgroups or the gid map write is
    /// rejected by the kernel (since Linux 3.19).
    pub fn effective_setgroups(&self) -> SetgroupsPolicy {
        if self.is_rootless_euid && self.setgroups != SetgroupsPolicy::Allow {
            SetgroupsPolicy::Deny
        } else {
            self.setgroups
        }
    }
}

/// Map a namespace kind name to its setns flag.
fn nsflag(name: &str) -> CloneFlags {
    match name {
        "cgroup" => CloneFlags::CLONE_NEWCGROUP,
        "ipc" => CloneFlags::CLONE_NEWIPC,
        "mnt" => CloneFlags::CLONE_NEWNS,
        "net" => CloneFlags::CLONE_NEWNET,
        "pid" => CloneFlags::CLONE_NEWPID,
        "user" => CloneFlags::CLONE_NEWUSER,
        "uts" => CloneFlags::CLONE_NEWUTS,
        _ => CloneFlags::empty(),
    }
}

fn parse_namespaces(list: &str) -> Result<Vec<Namespace>, Error> {
    if list.is_empty() {
        // Joining zero namespaces is expressed by omitting the attribute.
        return Err(Error::EmptyNamespaces);
    }

    list.split(',')
        .map(|entry| {
            let (kind, path) = entry
                .split_once(':')
                .ok_or_else(|| Error::InvalidNamespace(entry.to_string()))?;
            Ok(Namespace {
                kind: nsflag(kind),
                path,
            })
        })
        .collect()
}

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&data[offset..offset + 2]);
    u16::from_ne_bytes(bytes)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_ne_bytes(bytes)
}

fn attr_u8(payload: &[u8]) -> Result<u8, Error> {
    payload.first().copied().ok_or(Error::Truncated)
}

fn attr_u32(payload: &[u8]) -> Result<u32, Error> {
    if payload.len() < 4 {
        return Err(Error::Truncated);
    }
    Ok(read_u32(payload, 0))
}

/// String attributes carry a trailing null on the wire so the other side of
/// the contract can treat them as C strings. Strip it here.
fn attr_str<'a>(payload: &'a [u8], nla_type: u16) -> Result<&'a str, Error> {
    std::str::from_utf8(payload)
        .map(|s| s.trim_end_matches('\0'))
        .map_err(|_| Error::InvalidString(nla_type))
}

fn attr_opt_str<'a>(payload: &'a [u8], nla_type: u16) -> Result<Option<&'a str>, Error> {
    attr_str(payload, nla_type).map(|s| if s.is_empty() { None } else { Some(s) })
}

/// Reference serializer for the configuration message. The management daemon
/// side of the wire contract; the parser composed with this builder is the
/// identity on all well-formed configurations.
#[derive(Debug, Default)]
pub struct Builder {
    payload: Vec<u8>,
}

impl Builder {
    /// Create an empty configuration message.
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Namespaces to create.
    pub fn clone_flags(self, flags: CloneFlags) -> Builder {
        self.attr_u32(CLONE_FLAGS_ATTR, flags.bits() as u32)
    }

    /// Namespaces to join, as a comma separated `kind:path` list.
    pub fn ns_paths(self, list: &str) -> Builder {
        self.attr_str(NS_PATHS_ATTR, list)
    }

    /// Raw uid map text.
    pub fn uid_map(self, map: &str) -> Builder {
        self.attr_str(UIDMAP_ATTR, map)
    }

    /// Raw gid map text.
    pub fn gid_map(self, map: &str) -> Builder {
        self.attr_str(GIDMAP_ATTR, map)
    }

    /// Setgroups policy.
    pub fn setgroups(self, policy: SetgroupsPolicy) -> Builder {
        self.attr_u8(SETGROUP_ATTR, policy as u8)
    }

    /// Value for the init process oom score adjustment.
    pub fn oom_score_adj(self, value: &str) -> Builder {
        self.attr_str(OOM_SCORE_ADJ_ATTR, value)
    }

    /// Whether the management daemon runs without effective root.
    pub fn rootless_euid(self, rootless: bool) -> Builder {
        self.attr_u8(ROOTLESS_EUID_ATTR, rootless as u8)
    }

    /// Path of the uid mapping helper binary.
    pub fn uid_map_helper(self, path: &str) -> Builder {
        self.attr_str(UIDMAPPATH_ATTR, path)
    }

    /// Path of the gid mapping helper binary.
    pub fn gid_map_helper(self, path: &str) -> Builder {
        self.attr_str(GIDMAPPATH_ATTR, path)
    }

    /// Prepare the rootfs mounts in the child stage.
    pub fn prep_rootfs(self, prep: bool) -> Builder {
        self.attr_u8(PREP_ROOTFS_ATTR, prep as u8)
    }

    /// Make the parent mount private before binding the rootfs.
    pub fn make_parent_priv(self, make: bool) -> Builder {
        self.attr_u8(MAKE_PARENT_PRIV_ATTR, make as u8)
    }

    /// Mount propagation flags for `/`.
    pub fn rootfs_prop(self, flags: u32) -> Builder {
        self.attr_u32(ROOTFS_PROP_ATTR, flags)
    }

    /// Path of the container rootfs.
    pub fn rootfs(self, path: &str) -> Builder {
        self.attr_str(ROOTFS_ATTR, path)
    }

    /// Path of the mount the rootfs lives on.
    pub fn parent_mount(self, path: &str) -> Builder {
        self.attr_str(PARENT_MOUNT_ATTR, path)
    }

    /// Comma separated list of shiftfs mount paths.
    pub fn shiftfs_mounts(self, list: &str) -> Builder {
        self.attr_str(SHIFTFS_MOUNTS_ATTR, list)
    }

    /// Assemble the netlink message, header included.
    pub fn build(self) -> Vec<u8> {
        let mut message = Vec::with_capacity(NLMSG_HDRLEN + self.payload.len());
        message
            .write_u32::<NativeEndian>((NLMSG_HDRLEN + self.payload.len()) as u32)
            .expect("infallible write to vec");
        message
            .write_u16::<NativeEndian>(INIT_MSG)
            .expect("infallible write to vec");
        message
            .write_u16::<NativeEndian>(0)
            .expect("infallible write to vec");
        message
            .write_u32::<NativeEndian>(0)
            .expect("infallible write to vec");
        message
            .write_u32::<NativeEndian>(0)
            .expect("infallible write to vec");
        message.extend_from_slice(&self.payload);
        message
    }

    fn attr(mut self, nla_type: u16, data: &[u8]) -> Builder {
        self.payload
            .write_u16::<NativeEndian>((NLA_HDRLEN + data.len()) as u16)
            .expect("infallible write to vec");
        self.payload
            .write_u16::<NativeEndian>(nla_type)
            .expect("infallible write to vec");
        self.payload.extend_from_slice(data);
        let padding = align4(data.len()) - data.len();
        self.payload.extend_from_slice(&[0u8; 3][..padding]);
        self
    }

    fn attr_str(self, nla_type: u16, value: &str) -> Builder {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.attr(nla_type, &data)
    }

    fn attr_u8(self, nla_type: u16, value: u8) -> Builder {
        self.attr(nla_type, &[value])
    }

    fn attr_u32(self, nla_type: u16, value: u32) -> Builder {
        self.attr(nla_type, &value.to_ne_bytes())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::{io::Write, os::unix::net::UnixStream, os::unix::prelude::AsRawFd};

    fn payload(message: &[u8]) -> &[u8] {
        &message[NLMSG_HDRLEN..]
    }

    #[test]
    fn round_trip_full_configuration() {
        let flags = CloneFlags::CLONE_NEWUSER
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWNET
            | CloneFlags::CLONE_NEWIPC
            | CloneFlags::CLONE_NEWUTS
            | CloneFlags::CLONE_NEWCGROUP;
        let message = Builder::new()
            .clone_flags(flags)
            .uid_map("0 100000 65536")
            .gid_map("0 100000 65536")
            .setgroups(SetgroupsPolicy::Allow)
            .oom_score_adj("200")
            .rootless_euid(false)
            .uid_map_helper("/usr/bin/newuidmap")
            .gid_map_helper("/usr/bin/newgidmap")
            .prep_rootfs(true)
            .make_parent_priv(true)
            .rootfs_prop(nix::mount::MsFlags::MS_SLAVE.bits() as u32)
            .rootfs("/var/lib/ctr/abc/rootfs")
            .parent_mount("/var/lib/ctr/abc")
            .shiftfs_mounts("/var/lib/ctr/abc/rootfs,/var/lib/shared")
            .build();

        let config = Config::parse(payload(&message)).unwrap();
        assert_eq!(config.cloneflags, flags);
        assert_eq!(config.uidmap, Some("0 100000 65536"));
        assert_eq!(config.gidmap, Some("0 100000 65536"));
        assert_eq!(config.setgroups, SetgroupsPolicy::Allow);
        assert_eq!(config.oom_score_adj, Some("200"));
        assert!(!config.is_rootless_euid);
        assert_eq!(config.uidmap_helper, Some("/usr/bin/newuidmap"));
        assert_eq!(config.gidmap_helper, Some("/usr/bin/newgidmap"));
        assert!(config.prep_rootfs);
        assert!(config.make_parent_priv);
        assert_eq!(
            config.rootfs_prop,
            nix::mount::MsFlags::MS_SLAVE.bits() as u32
        );
        assert_eq!(config.rootfs, Some("/var/lib/ctr/abc/rootfs"));
        assert_eq!(config.parent_mount, Some("/var/lib/ctr/abc"));
        assert_eq!(
            config.shiftfs_mounts,
            vec!["/var/lib/ctr/abc/rootfs", "/var/lib/shared"]
        );
    }

    #[test]
    fn round_trip_namespaces() {
        let message = Builder::new()
            .ns_paths("user:/proc/1000/ns/user,net:/proc/1000/ns/net")
            .build();
        let config = Config::parse(payload(&message)).unwrap();
        let namespaces = config.namespaces.unwrap();
        assert_eq!(
            namespaces,
            vec![
                Namespace {
                    kind: CloneFlags::CLONE_NEWUSER,
                    path: "/proc/1000/ns/user"
                },
                Namespace {
                    kind: CloneFlags::CLONE_NEWNET,
                    path: "/proc/1000/ns/net"
                },
            ]
        );
    }

    #[test]
    fn unknown_namespace_kind_maps_to_empty_flags() {
        let message = Builder::new().ns_paths("time:/proc/1/ns/time").build();
        let config = Config::parse(payload(&message)).unwrap();
        assert_eq!(
            config.namespaces.unwrap()[0].kind,
            CloneFlags::empty()
        );
    }

    #[test]
    fn empty_ns_paths_attribute_is_an_error() {
        let message = Builder::new().ns_paths("").build();
        assert_eq!(
            Config::parse(payload(&message)),
            Err(Error::EmptyNamespaces)
        );
    }

    #[test]
    fn namespace_without_path_is_an_error() {
        let message = Builder::new().ns_paths("user").build();
        assert_eq!(
            Config::parse(payload(&message)),
            Err(Error::InvalidNamespace("user".to_string()))
        );
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let message = Builder::new().attr(27299, &[0]).build();
        assert_eq!(
            Config::parse(payload(&message)),
            Err(Error::UnknownAttribute(27299))
        );
    }

    #[test]
    fn truncated_attribute_is_an_error() {
        let mut message = Builder::new().uid_map("0 0 1").build();
        message.truncate(NLMSG_HDRLEN + 6);
        assert_eq!(Config::parse(payload(&message)), Err(Error::Truncated));
    }

    #[test]
    fn empty_maps_decode_to_none() {
        let message = Builder::new().uid_map("").gid_map("").build();
        let config = Config::parse(payload(&message)).unwrap();
        assert_eq!(config.uidmap, None);
        assert_eq!(config.gidmap, None);
    }

    #[test]
    fn invalid_setgroups_policy_is_an_error() {
        let message = Builder::new().attr_u8(SETGROUP_ATTR, 3).build();
        assert_eq!(
            Config::parse(payload(&message)),
            Err(Error::InvalidSetgroups(3))
        );
    }

    #[test]
    fn attributes_stay_aligned_after_odd_lengths() {
        // "200" plus the trailing null is four bytes, "-999" is five and
        // needs padding before the next attribute starts.
        let message = Builder::new()
            .oom_score_adj("-999")
            .uid_map("0 1000 1")
            .rootless_euid(true)
            .build();
        let config = Config::parse(payload(&message)).unwrap();
        assert_eq!(config.oom_score_adj, Some("-999"));
        assert_eq!(config.uidmap, Some("0 1000 1"));
        assert!(config.is_rootless_euid);
    }

    #[test]
    fn read_from_stream() {
        let (mut first, second) = UnixStream::pair().unwrap();
        let message = Builder::new()
            .clone_flags(CloneFlags::CLONE_NEWUSER)
            .uid_map("0 1000 1")
            .build();
        first.write_all(&message).unwrap();

        let data = read(second.as_raw_fd()).unwrap();
        let config = Config::parse(&data).unwrap();
        assert_eq!(config.cloneflags, CloneFlags::CLONE_NEWUSER);
        assert_eq!(config.uidmap, Some("0 1000 1"));
    }

    #[test]
    fn read_rejects_error_message() {
        let (mut first, second) = UnixStream::pair().unwrap();
        let mut message = Builder::new().build();
        message[4..6].copy_from_slice(&NLMSG_ERROR.to_ne_bytes());
        first.write_all(&message).unwrap();
        assert_eq!(read(second.as_raw_fd()), Err(Error::ErrorMessage));
    }

    #[test]
    fn read_rejects_foreign_message_type() {
        let (mut first, second) = UnixStream::pair().unwrap();
        let mut message = Builder::new().build();
        message[4..6].copy_from_slice(&100u16.to_ne_bytes());
        first.write_all(&message).unwrap();
        assert_eq!(read(second.as_raw_fd()), Err(Error::MessageType(100)));
    }

    #[test]
    fn read_rejects_short_header() {
        let (mut first, second) = UnixStream::pair().unwrap();
        first.write_all(&[0u8; 7]).unwrap();
        drop(first);
        assert_eq!(read(second.as_raw_fd()), Err(Error::HeaderLength(7)));
    }

    #[test]
    fn effective_setgroups_rootless_forces_deny() {
        let config = Config {
            is_rootless_euid: true,
            setgroups: SetgroupsPolicy::Default,
            ..Config::default()
        };
        assert_eq!(config.effective_setgroups(), SetgroupsPolicy::Deny);

        let config = Config {
            is_rootless_euid: true,
            setgroups: SetgroupsPolicy::Allow,
            ..Config::default()
        };
        assert_eq!(config.effective_setgroups(), SetgroupsPolicy::Allow);
    }

    #[test]
    fn effective_setgroups_privileged_keeps_policy() {
        for policy in [
            SetgroupsPolicy::Default,
            SetgroupsPolicy::Allow,
            SetgroupsPolicy::Deny,
        ] {
            let config = Config {
                setgroups: policy,
                ..Config::default()
            };
            assert_eq!(config.effective_setgroups(), policy);
        }
    }
}
