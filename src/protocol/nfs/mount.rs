//! `MOUNTPROC_EXPORT` client (procedure 5 of the MOUNT program, RFC 1813
//! Appendix I section 5.2.5).
//!
//! The procedure takes no arguments and returns every exported directory
//! with the groups allowed to mount it.

use std::io::Cursor;

use tracing::{debug, warn};

use crate::error::QueryError;
use crate::export::{ExportEntry, ExportList};
use crate::protocol::nfs::portmap;
use crate::protocol::rpc::{Connection, RetryPolicy};
use crate::protocol::xdr::mount::{exports, MountProgram, PROGRAM};
use crate::protocol::xdr::deserialize;

/// Finds the TCP port of MOUNT `version` on `host`.
///
/// A configured `mount_port` wins; otherwise the portmapper listening on
/// `portmap_port` is asked.
pub async fn resolve_port(
    host: &str,
    version: u32,
    mount_port: Option<u16>,
    portmap_port: u16,
    policy: RetryPolicy,
) -> Result<u16, QueryError> {
    let port = match mount_port {
        Some(port) => port,
        None => portmap::get_port(host, portmap_port, PROGRAM, version, policy).await?,
    };
    debug!("MOUNT v{} on {} is at port {}", version, host, port);
    Ok(port)
}

/// Opens a connection to MOUNT `version` on `host:port`.
pub async fn connect(
    host: &str,
    port: u16,
    version: u32,
    policy: RetryPolicy,
) -> Result<Connection, QueryError> {
    Connection::open(host, port, PROGRAM, version, policy).await
}

/// Sends `MOUNTPROC_EXPORT` on `conn`.
///
/// `callback` receives the decoded list or the reason there is none, exactly
/// once, from inside [`Connection::service`] (or when `conn` is dropped).
/// An empty list means the server has no exports; every failure is an `Err`.
pub fn request_exports<F>(conn: &mut Connection, callback: F) -> Result<(), QueryError>
where
    F: FnOnce(Result<ExportList, QueryError>) + Send + 'static,
{
    conn.call(
        MountProgram::MOUNTPROC_EXPORT as u32,
        &(),
        Box::new(move |reply| callback(reply.and_then(|body| decode_exports(&body)))),
    )?;
    Ok(())
}

/// Decodes the `exports` result of `MOUNTPROC_EXPORT`.
///
/// Entries without a directory carry no usable information and are dropped.
pub fn decode_exports(body: &[u8]) -> Result<ExportList, QueryError> {
    let list = deserialize::<exports>(&mut Cursor::new(body))
        .map_err(|e| QueryError::decode("malformed export list", e))?;

    Ok(list
        .0
        .into_iter()
        .filter_map(|node| {
            if node.ex_dir.is_empty() {
                warn!("Ignoring export without a directory (groups {:?})", node.ex_groups);
                None
            } else {
                Some(ExportEntry::from(node))
            }
        })
        .collect())
}

