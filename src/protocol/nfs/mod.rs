//! Client procedures of the programs involved in export discovery.
//!
//! - `portmap`: locating the MOUNT daemon's TCP port (RFC 1833)
//! - `mount`: listing exports with `MOUNTPROC_EXPORT` (RFC 1813 Appendix I)
//! - `v4`: obtaining the NFSv4 root file handle (RFC 7530)
//!
//! Each function opens its own [`Connection`](crate::protocol::rpc::Connection)
//! or works on one handed in by the caller; none keeps state between calls.

pub mod mount;
pub mod portmap;
pub mod v4;
