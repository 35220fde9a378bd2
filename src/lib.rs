//! NFS export discovery: the library behind `showmount -e`.
//!
//! Given a host name, this crate asks the server which directories it
//! exports and to whom, speaking ONC RPC over TCP directly rather than
//! through a system RPC library.
//!
//! ## How a query proceeds
//!
//! - The MOUNT daemon is located through the portmapper (or a fixed port)
//!   and asked for its export list with `MOUNTPROC_EXPORT`.
//! - If that fails, an NFSv4 `PUTROOTFH; GETFH` compound is tried. Servers
//!   that only speak NFSv4 run no MOUNT daemon, and one that hands out its
//!   root file handle is reported as exporting `/` to everyone.
//! - Every failure is logged through `tracing` and the caller gets an empty
//!   list. [`query_exports_detailed`] keeps the errors for callers that need
//!   to tell "no exports" from "unreachable".
//!
//! ## Main Components
//!
//! - `query`: the export query and its options.
//! - `blocking`: synchronous wrappers running the query on a private runtime.
//! - `protocol`: XDR encoding, the RPC transport and the MOUNT, portmap and
//!   NFSv4 client procedures.
//! - `export`, `error`: the result and failure types.
//!
//! ## Standards Compliance
//!
//! - RFC 5531: RPC: Remote Procedure Call Protocol Specification Version 2
//! - RFC 4506: XDR: External Data Representation Standard
//! - RFC 1833: Binding Protocols for ONC RPC Version 2
//! - RFC 1813: NFS Version 3 Protocol Specification, Appendix I (MOUNT)
//! - RFC 7530: Network File System (NFS) Version 4 Protocol

pub mod blocking;
pub mod error;
pub mod export;
pub mod protocol;
pub mod query;

pub use error::{ErrorKind, QueryError};
pub use export::{ExportEntry, ExportList};
pub use protocol::xdr;
pub use query::{
    probe_root_mount, query_exports, query_exports_detailed, resolve_mount_port, ExportSource,
    QueryOptions, QueryOutcome,
};
