//! Wire protocols spoken by the export query.
//!
//! This module contains three main components:
//!
//! - `xdr`: External Data Representation (XDR) types for RPC headers and for
//!   the arguments and results of the MOUNT, PORTMAP and NFSv4 procedures used.
//!
//! - `rpc`: the client side of an ONC RPC connection over TCP, including
//!   record marking, reply matching, timeouts and retransmission.
//!
//! - `nfs`: the individual client procedures built on the two above.

pub mod nfs;
pub mod rpc;
pub mod xdr;
