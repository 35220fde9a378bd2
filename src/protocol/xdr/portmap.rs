//! Portmapper (RFC 1833 section 3, version 2) wire types.
//!
//! The portmapper maps RPC program numbers to the ports their servers listen
//! on. The MOUNT daemon rarely has a fixed port, so the client asks the
//! portmapper on port 111 before connecting to it.

// Keep RFC naming conventions
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

/// A program/version/protocol to port mapping
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct mapping {
    pub prog: u32,
    pub vers: u32,
    /// `IPPROTO_TCP` or `IPPROTO_UDP`
    pub prot: u32,
    /// Ignored in `GETPORT` requests
    pub port: u32,
}
DeserializeStruct!(mapping, prog, vers, prot, port);
SerializeStruct!(mapping, prog, vers, prot, port);

/// Protocol number for TCP/IP
pub const IPPROTO_TCP: u32 = 6;
/// Protocol number for UDP/IP
pub const IPPROTO_UDP: u32 = 17;
/// Portmap RPC program number
pub const PROGRAM: u32 = 100000;
/// Portmap RPC version number
pub const VERSION: u32 = 2;
/// Well-known portmapper port
pub const PORT: u16 = 111;

/// Procedure numbers of the portmapper program
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum PortmapProgram {
    PMAPPROC_NULL = 0,
    PMAPPROC_SET = 1,
    PMAPPROC_UNSET = 2,
    PMAPPROC_GETPORT = 3,
    PMAPPROC_DUMP = 4,
    PMAPPROC_CALLIT = 5,
}
impl SerializeEnum for PortmapProgram {}
impl DeserializeEnum for PortmapProgram {}
