//! NFSv4 root mount (RFC 7530 section 16.2, `COMPOUND`).
//!
//! Servers that only speak NFSv4 do not run a MOUNT daemon. Getting the
//! root file handle with `PUTROOTFH; GETFH` is what a v4 client does to
//! mount `/`, so a successful compound proves the server exists and lets
//! anonymous clients at its root.

use std::io::Cursor;

use tracing::debug;

use crate::error::QueryError;
use crate::protocol::rpc::{Connection, RetryPolicy};
use crate::protocol::xdr::nfs4::{
    nfs_resop4, COMPOUND4args, COMPOUND4res, NFSPROC4_COMPOUND, PROGRAM, VERSION,
};
use crate::protocol::xdr::deserialize;
use crate::protocol::xdr::rpc::opaque_auth;

/// Machine name sent in the AUTH_UNIX credential.
const MACHINE_NAME: &str = "nfs-showmount";

/// Fetches the root file handle of the NFSv4 server at `host:port`.
///
/// Fails with [`QueryError::MountDenied`] when the server answers with an
/// error status.
pub async fn root_mount(host: &str, port: u16, policy: RetryPolicy) -> Result<Vec<u8>, QueryError> {
    let mut conn = Connection::open(host, port, PROGRAM, VERSION, policy).await?;
    let credential = opaque_auth::anonymous_unix(MACHINE_NAME)
        .map_err(|e| QueryError::Protocol(format!("cannot encode credential: {e}")))?;
    conn.set_credential(credential);

    let reply = conn.call_and_wait(NFSPROC4_COMPOUND, &COMPOUND4args::root_handle()).await;
    conn.close();

    let res = deserialize::<COMPOUND4res>(&mut Cursor::new(reply?))
        .map_err(|e| QueryError::decode("malformed COMPOUND reply", e))?;
    root_handle(res)
}

/// Extracts the handle from a `PUTROOTFH; GETFH` reply.
pub fn root_handle(res: COMPOUND4res) -> Result<Vec<u8>, QueryError> {
    if !res.status.is_ok() {
        return Err(QueryError::MountDenied(format!("root mount refused: {}", res.status)));
    }

    let mut root_set = false;
    for op in res.resarray {
        let (status, handle) = match op {
            nfs_resop4::OP_PUTROOTFH(status) => (status, None),
            nfs_resop4::OP_GETFH(status, handle) => (status, Some(handle)),
        };
        if !status.is_ok() {
            return Err(QueryError::MountDenied(format!("root mount refused: {status}")));
        }
        match handle {
            None => root_set = true,
            Some(handle) if root_set && !handle.is_empty() => {
                debug!("Got {} byte root file handle", handle.len());
                return Ok(handle);
            }
            Some(_) => break,
        }
    }
    Err(QueryError::Protocol("COMPOUND reply carries no root file handle".to_string()))
}
