//! `PMAPPROC_GETPORT` (RFC 1833 section 3.2): find the TCP port of a program.

use std::io::{self, Cursor};

use tracing::debug;

use crate::error::QueryError;
use crate::protocol::rpc::{Connection, RetryPolicy};
use crate::protocol::xdr::portmap::{mapping, PortmapProgram, IPPROTO_TCP, PROGRAM, VERSION};
use crate::protocol::xdr::deserialize;

/// Asks the portmapper on `host:portmap_port` where `program`/`version` listens.
///
/// A reply of port 0 means the program is not registered and is reported as
/// a connect failure, since there is nothing to connect to.
pub async fn get_port(
    host: &str,
    portmap_port: u16,
    program: u32,
    version: u32,
    policy: RetryPolicy,
) -> Result<u16, QueryError> {
    let mut conn = Connection::open(host, portmap_port, PROGRAM, VERSION, policy).await?;
    let query = mapping { prog: program, vers: version, prot: IPPROTO_TCP, port: 0 };
    let reply = conn.call_and_wait(PortmapProgram::PMAPPROC_GETPORT as u32, &query).await;
    conn.close();

    let port = deserialize::<u32>(&mut Cursor::new(reply?))
        .map_err(|e| QueryError::decode("malformed GETPORT reply", e))?;
    debug!("pmap_getport({}, {}, {}) = {}", host, program, version, port);

    match u16::try_from(port) {
        Ok(0) => Err(QueryError::connect(
            format!("{host} program {program} version {version}"),
            io::Error::new(io::ErrorKind::NotFound, "program not registered with portmapper"),
        )),
        Ok(port) => Ok(port),
        Err(_) => Err(QueryError::Protocol(format!("portmapper returned invalid port {port}"))),
    }
}
