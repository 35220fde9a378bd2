//! ONC RPC version 2 client transport (RFC 5531).
//!
//! Everything the protocol clients need to exchange calls and replies with a
//! server over TCP:
//!
//! 1. Record marking for message framing on a stream socket
//! 2. Connection setup with bounded connect retries
//! 3. Call/reply correlation by transaction id
//! 4. Response timeouts and retransmission
//! 5. A readiness-driven service loop that needs no background tasks
//!
//! A connection is driven by whoever owns it: `poll` waits for socket
//! readiness, `service` performs the I/O and delivers replies. The
//! [`run_until`] helper packages the loop for the common case.

mod transport;
mod wire;

pub use transport::{
    run_until, Connection, ReadinessEvent, ReplyCallback, RetryPolicy, RpcResult,
    DEFAULT_RETRIES, DEFAULT_TIMEOUT,
};
pub use wire::{write_record, RecordReader, MAX_RPC_RECORD_LENGTH};
