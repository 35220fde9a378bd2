//! ONC RPC version 2 message structures (RFC 5531 section 9) with their XDR
//! encodings, plus constructors for the calls this client issues.

// Keep RFC naming conventions
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

/// The only RPC protocol version in use.
pub const RPC_VERSION: u32 = 2;

/// Reasons the server gives for rejecting the caller's credentials
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum auth_stat {
    /// Success (only used by RPCSEC_GSS and AUTH_SYS extensions)
    AUTH_OK = 0,
    /// Bad credential (seal broken)
    #[default]
    AUTH_BADCRED = 1,
    /// Client must begin a new session
    AUTH_REJECTEDCRED = 2,
    /// Bad verifier (seal broken)
    AUTH_BADVERF = 3,
    /// Verifier expired or replayed
    AUTH_REJECTEDVERF = 4,
    /// Rejected for security reasons
    AUTH_TOOWEAK = 5,
}
impl SerializeEnum for auth_stat {}
impl DeserializeEnum for auth_stat {}

/// Authentication flavors understood by this client
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum auth_flavor {
    /// No authentication
    #[default]
    AUTH_NULL = 0,
    /// UNIX-style uid/gid credentials (AUTH_SYS)
    AUTH_UNIX = 1,
    /// Short-hand verifier handed back by some servers
    AUTH_SHORT = 2,
    /// DES authentication
    AUTH_DES = 3,
}
impl SerializeEnum for auth_flavor {}
impl DeserializeEnum for auth_flavor {}

/// Body of an AUTH_UNIX credential
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct auth_unix {
    pub stamp: u32,
    pub machinename: Vec<u8>,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
}
DeserializeStruct!(auth_unix, stamp, machinename, uid, gid, gids);
SerializeStruct!(auth_unix, stamp, machinename, uid, gid, gids);

/// Credential or verifier attached to calls and replies.
///
/// The body is opaque to RPC itself; its meaning depends on `flavor`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct opaque_auth {
    pub flavor: auth_flavor,
    pub body: Vec<u8>,
}
DeserializeStruct!(opaque_auth, flavor, body);
SerializeStruct!(opaque_auth, flavor, body);

/// The uid and gid of the unprivileged `nobody` account.
pub const ANONYMOUS_ID: u32 = 65534;

impl opaque_auth {
    /// AUTH_NULL credential, used for portmapper and MOUNT calls.
    pub fn null() -> Self {
        Self::default()
    }

    /// AUTH_UNIX credential for the anonymous user.
    ///
    /// Servers that refuse AUTH_NULL on the NFS program usually accept this,
    /// and it grants nothing beyond what an anonymous client already has.
    pub fn anonymous_unix(machinename: &str) -> std::io::Result<Self> {
        let cred = auth_unix {
            stamp: 0,
            machinename: machinename.as_bytes().to_vec(),
            uid: ANONYMOUS_ID,
            gid: ANONYMOUS_ID,
            gids: Vec::new(),
        };
        let mut body = Vec::new();
        cred.serialize(&mut body)?;
        Ok(Self { flavor: auth_flavor::AUTH_UNIX, body })
    }
}

/// An RPC message: a transaction id followed by a call or reply body.
///
/// The client picks the xid; the server echoes it so replies can be matched
/// to outstanding calls. It is not a sequence number.
#[derive(Clone, Debug, Default)]
pub struct rpc_msg {
    pub xid: u32,
    pub body: rpc_body,
}
DeserializeStruct!(rpc_msg, xid, body);
SerializeStruct!(rpc_msg, xid, body);

/// `msg_type` discriminated union
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug)]
pub enum rpc_body {
    CALL(call_body),
    REPLY(reply_body),
}

impl Default for rpc_body {
    fn default() -> rpc_body {
        rpc_body::CALL(call_body::default())
    }
}

impl Serialize for rpc_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rpc_body::CALL(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            rpc_body::REPLY(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rpc_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<u32>(src)? {
            0 => rpc_body::CALL(deserialize(src)?),
            1 => rpc_body::REPLY(deserialize(src)?),
            msg_type => {
                return Err(invalid_data(&format!("invalid message type {msg_type}")));
            }
        };
        Ok(())
    }
}

/// Header of a call; procedure arguments follow it on the wire.
#[derive(Clone, Debug, Default)]
pub struct call_body {
    pub rpcvers: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: opaque_auth,
    pub verf: opaque_auth,
}
DeserializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);
SerializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);

/// Builds the call header for `prog`/`vers`/`proc` with credential `cred`.
pub fn call_message(xid: u32, prog: u32, vers: u32, proc: u32, cred: opaque_auth) -> rpc_msg {
    rpc_msg {
        xid,
        body: rpc_body::CALL(call_body {
            rpcvers: RPC_VERSION,
            prog,
            vers,
            proc,
            cred,
            verf: opaque_auth::null(),
        }),
    }
}

/// `reply_stat` discriminated union
#[derive(Clone, Debug)]
pub enum reply_body {
    MSG_ACCEPTED(accepted_reply),
    MSG_DENIED(rejected_reply),
}

impl Default for reply_body {
    fn default() -> reply_body {
        reply_body::MSG_ACCEPTED(accepted_reply::default())
    }
}

impl Serialize for reply_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            reply_body::MSG_ACCEPTED(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            reply_body::MSG_DENIED(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for reply_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<u32>(src)? {
            0 => reply_body::MSG_ACCEPTED(deserialize(src)?),
            1 => reply_body::MSG_DENIED(deserialize(src)?),
            reply_stat => {
                return Err(invalid_data(&format!("invalid reply status {reply_stat}")));
            }
        };
        Ok(())
    }
}

/// Lowest and highest versions supported by the server
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct mismatch_info {
    pub low: u32,
    pub high: u32,
}
DeserializeStruct!(mismatch_info, low, high);
SerializeStruct!(mismatch_info, low, high);

/// The server accepted the call; `reply_data` says whether it ran.
#[derive(Clone, Debug, Default)]
pub struct accepted_reply {
    pub verf: opaque_auth,
    pub reply_data: accept_body,
}
DeserializeStruct!(accepted_reply, verf, reply_data);
SerializeStruct!(accepted_reply, verf, reply_data);

/// `accept_stat` discriminated union. On SUCCESS the procedure results follow.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum accept_body {
    #[default]
    SUCCESS,
    PROG_UNAVAIL,
    PROG_MISMATCH(mismatch_info),
    PROC_UNAVAIL,
    GARBAGE_ARGS,
    SYSTEM_ERR,
}

impl Serialize for accept_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            accept_body::SUCCESS => 0_u32.serialize(dest),
            accept_body::PROG_UNAVAIL => 1_u32.serialize(dest),
            accept_body::PROG_MISMATCH(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
            accept_body::PROC_UNAVAIL => 3_u32.serialize(dest),
            accept_body::GARBAGE_ARGS => 4_u32.serialize(dest),
            accept_body::SYSTEM_ERR => 5_u32.serialize(dest),
        }
    }
}

impl Deserialize for accept_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<u32>(src)? {
            0 => accept_body::SUCCESS,
            1 => accept_body::PROG_UNAVAIL,
            2 => accept_body::PROG_MISMATCH(deserialize(src)?),
            3 => accept_body::PROC_UNAVAIL,
            4 => accept_body::GARBAGE_ARGS,
            5 => accept_body::SYSTEM_ERR,
            accept_stat => {
                return Err(invalid_data(&format!("invalid accept stat {accept_stat}")));
            }
        };
        Ok(())
    }
}

/// The server refused the call outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum rejected_reply {
    RPC_MISMATCH(mismatch_info),
    AUTH_ERROR(auth_stat),
}

impl Default for rejected_reply {
    fn default() -> rejected_reply {
        rejected_reply::AUTH_ERROR(auth_stat::default())
    }
}

impl Serialize for rejected_reply {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rejected_reply::RPC_MISMATCH(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            rejected_reply::AUTH_ERROR(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rejected_reply {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<u32>(src)? {
            0 => rejected_reply::RPC_MISMATCH(deserialize(src)?),
            1 => rejected_reply::AUTH_ERROR(deserialize(src)?),
            stat => return Err(invalid_data(&format!("invalid reject stat {stat}"))),
        };
        Ok(())
    }
}

/// Accepted reply header with the given `accept_stat` arm.
pub fn accepted_reply_message(xid: u32, reply_data: accept_body) -> rpc_msg {
    let reply =
        reply_body::MSG_ACCEPTED(accepted_reply { verf: opaque_auth::null(), reply_data });
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

/// Accepted SUCCESS reply header; procedure results are appended by the caller.
pub fn success_reply_message(xid: u32) -> rpc_msg {
    accepted_reply_message(xid, accept_body::SUCCESS)
}

/// Denied reply carrying an authentication error.
pub fn auth_error_reply_message(xid: u32, stat: auth_stat) -> rpc_msg {
    let reply = reply_body::MSG_DENIED(rejected_reply::AUTH_ERROR(stat));
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}
