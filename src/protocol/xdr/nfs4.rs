//! NFS version 4 (RFC 7530) `COMPOUND` subset used by the root-mount probe.
//!
//! NFSv4 has no MOUNT protocol; a client "mounts" `/` by sending a compound
//! of `PUTROOTFH` followed by `GETFH` and keeping the returned handle.
//! Only those two operations are encoded here.

// Keep RFC naming conventions
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

/// NFS program number for RPC
pub const PROGRAM: u32 = 100003;
/// NFS protocol version 4
pub const VERSION: u32 = 4;
/// NFSv4 servers listen on a fixed port
pub const PORT: u16 = 2049;
/// `NFSPROC4_COMPOUND` procedure number
pub const NFSPROC4_COMPOUND: u32 = 1;
/// Maximum size of a file handle in bytes
pub const NFS4_FHSIZE: u32 = 128;

/// Operation codes of the supported `nfs_argop4` arms
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum nfs_opnum4 {
    OP_GETFH = 10,
    OP_PUTROOTFH = 24,
}
impl SerializeEnum for nfs_opnum4 {}
impl DeserializeEnum for nfs_opnum4 {}

/// Status codes a server may return for the probe compound
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum nfsstat4 {
    #[default]
    NFS4_OK = 0,
    NFS4ERR_PERM = 1,
    NFS4ERR_NOENT = 2,
    NFS4ERR_IO = 5,
    NFS4ERR_ACCESS = 13,
    NFS4ERR_STALE = 70,
    NFS4ERR_BADHANDLE = 10001,
    NFS4ERR_NOTSUPP = 10004,
    NFS4ERR_SERVERFAULT = 10006,
    NFS4ERR_DELAY = 10008,
    NFS4ERR_WRONGSEC = 10016,
    NFS4ERR_RESOURCE = 10018,
    NFS4ERR_NOFILEHANDLE = 10020,
    NFS4ERR_MINOR_VERS_MISMATCH = 10021,
    NFS4ERR_OP_ILLEGAL = 10044,
}

/// Raw `nfsstat4` as it appears on the wire.
///
/// Servers may answer with codes outside [`nfsstat4`]; keeping the raw value
/// lets the caller report them instead of failing to decode the reply.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct status4(pub u32);

impl status4 {
    pub fn is_ok(&self) -> bool {
        self.0 == nfsstat4::NFS4_OK as u32
    }

    pub fn known(&self) -> Option<nfsstat4> {
        num_traits::FromPrimitive::from_u32(self.0)
    }
}

impl std::fmt::Display for status4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.known() {
            Some(stat) => write!(f, "{stat:?}"),
            None => write!(f, "nfsstat4({})", self.0),
        }
    }
}

impl Serialize for status4 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}

impl Deserialize for status4 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.deserialize(src)
    }
}

/// `COMPOUND4args` restricted to argument-less operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct COMPOUND4args {
    pub tag: Vec<u8>,
    pub minorversion: u32,
    pub argarray: Vec<nfs_opnum4>,
}

impl COMPOUND4args {
    /// `PUTROOTFH; GETFH` with an empty tag and minor version 0.
    pub fn root_handle() -> Self {
        Self {
            tag: Vec::new(),
            minorversion: 0,
            argarray: vec![nfs_opnum4::OP_PUTROOTFH, nfs_opnum4::OP_GETFH],
        }
    }
}

impl Serialize for COMPOUND4args {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.tag.serialize(dest)?;
        self.minorversion.serialize(dest)?;
        self.argarray.serialize(dest)
    }
}

/// One entry of `resarray`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum nfs_resop4 {
    OP_PUTROOTFH(status4),
    /// Status and, when it is `NFS4_OK`, the handle
    OP_GETFH(status4, Vec<u8>),
}

impl Serialize for nfs_resop4 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            nfs_resop4::OP_PUTROOTFH(status) => {
                nfs_opnum4::OP_PUTROOTFH.serialize(dest)?;
                status.serialize(dest)
            }
            nfs_resop4::OP_GETFH(status, handle) => {
                nfs_opnum4::OP_GETFH.serialize(dest)?;
                status.serialize(dest)?;
                if status.is_ok() {
                    handle.serialize(dest)?;
                }
                Ok(())
            }
        }
    }
}

impl nfs_resop4 {
    fn read<R: Read>(src: &mut R) -> std::io::Result<Self> {
        let resop = deserialize::<u32>(src)?;
        match num_traits::FromPrimitive::from_u32(resop) {
            Some(nfs_opnum4::OP_PUTROOTFH) => Ok(Self::OP_PUTROOTFH(deserialize(src)?)),
            Some(nfs_opnum4::OP_GETFH) => {
                let status = deserialize::<status4>(src)?;
                let handle = if status.is_ok() {
                    super::utils::read_opaque(src, NFS4_FHSIZE)?
                } else {
                    Vec::new()
                };
                Ok(Self::OP_GETFH(status, handle))
            }
            None => Err(invalid_data(&format!("unexpected operation {resop} in COMPOUND reply"))),
        }
    }
}

/// `COMPOUND4res`; `resarray` holds results up to and including the first
/// failed operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct COMPOUND4res {
    pub status: status4,
    pub tag: Vec<u8>,
    pub resarray: Vec<nfs_resop4>,
}

impl Serialize for COMPOUND4res {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.status.serialize(dest)?;
        self.tag.serialize(dest)?;
        self.resarray.serialize(dest)
    }
}

impl Deserialize for COMPOUND4res {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.status.deserialize(src)?;
        self.tag = super::utils::read_opaque(src, NFS4_OPAQUE_LIMIT)?;
        let count = super::deserialize_len(src)?;
        self.resarray.clear();
        for _ in 0..count {
            self.resarray.push(nfs_resop4::read(src)?);
        }
        Ok(())
    }
}

/// Upper bound accepted for the echoed compound tag.
const NFS4_OPAQUE_LIMIT: u32 = 1024;
