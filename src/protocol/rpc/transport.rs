//! Client side of one ONC RPC connection over TCP.
//!
//! A [`Connection`] owns a non-blocking socket, an outbound byte queue and
//! the table of calls waiting for a reply. It does no waiting of its own
//! except in [`Connection::poll`]: the caller drives it with the classic
//! loop of "wait for readiness, then service the socket", checking its own
//! completion flag in between. Replies are matched to calls by xid and
//! delivered through the callback registered with the call, exactly once.

use std::collections::HashMap;
use std::io::{self, Cursor};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

use super::wire::{write_record, RecordReader};
use crate::error::QueryError;
use crate::protocol::xdr::rpc::{
    accept_body, call_message, opaque_auth, rejected_reply, reply_body, rpc_body, rpc_msg,
};
use crate::protocol::xdr::{deserialize, Serialize};

/// Response timeout applied to connects and to every call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Connect retries after a timed out attempt, and retransmissions per call.
pub const DEFAULT_RETRIES: u32 = 2;

const READ_CHUNK: usize = 16 * 1024;

/// How long to wait for the peer and how often to try again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, retries: DEFAULT_RETRIES }
    }
}

impl RetryPolicy {
    /// Longest a call can stay unanswered: the first attempt plus every retry.
    pub fn budget(&self) -> Duration {
        self.timeout.saturating_mul(self.retries.saturating_add(1))
    }
}

/// Procedure results (the bytes after the accepted reply header), or the
/// reason there are none.
pub type RpcResult = Result<Vec<u8>, QueryError>;

/// Receives the outcome of one call.
pub type ReplyCallback = Box<dyn FnOnce(RpcResult) + Send>;

/// Socket readiness reported by [`Connection::poll`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadinessEvent(Ready);

impl ReadinessEvent {
    /// No readiness; servicing it only checks call deadlines.
    pub fn none() -> Self {
        Self(Ready::EMPTY)
    }

    pub fn is_readable(&self) -> bool {
        self.0.is_readable() || self.0.is_read_closed()
    }

    pub fn is_writable(&self) -> bool {
        self.0.is_writable()
    }
}

struct PendingCall {
    /// Framed call, kept for retransmission
    record: Vec<u8>,
    deadline: Instant,
    retries_left: u32,
    callback: ReplyCallback,
}

/// One TCP connection to an RPC program on a remote host.
///
/// Dropping the connection closes the socket and fails every outstanding
/// call, so no callback is ever lost.
pub struct Connection {
    stream: TcpStream,
    target: String,
    peer: SocketAddr,
    program: u32,
    version: u32,
    credential: opaque_auth,
    policy: RetryPolicy,
    outbound: Vec<u8>,
    reader: RecordReader,
    pending: HashMap<u32, PendingCall>,
    next_xid: u32,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("rpc::Connection")
            .field("target", &self.target)
            .field("peer", &self.peer)
            .field("program", &self.program)
            .field("version", &self.version)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Connection {
    /// Connects to `program`/`version` served on `host:port`.
    ///
    /// Every resolved address is tried in turn. A round in which some attempt
    /// timed out is repeated up to `policy.retries` times; a refused
    /// connection is final.
    pub async fn open(
        host: &str,
        port: u16,
        program: u32,
        version: u32,
        policy: RetryPolicy,
    ) -> Result<Self, QueryError> {
        let target = format!("{host}:{port}");
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| QueryError::connect(&target, e))?
            .collect();
        if addrs.is_empty() {
            return Err(QueryError::connect(
                target,
                io::Error::new(io::ErrorKind::NotFound, "host has no addresses"),
            ));
        }

        let mut last_error = None;
        for attempt in 0..=policy.retries {
            let mut timed_out = false;
            for addr in &addrs {
                match timeout(policy.timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(stream)) => {
                        let _ = stream.set_nodelay(true);
                        debug!("Connected to {} ({}) for program {}", target, addr, program);
                        return Ok(Self::new(stream, target, *addr, program, version, policy));
                    }
                    Ok(Err(e)) => {
                        debug!("Connect to {} failed: {}", addr, e);
                        last_error = Some(e);
                    }
                    Err(_) => {
                        debug!("Connect to {} timed out (attempt {})", addr, attempt + 1);
                        timed_out = true;
                        last_error =
                            Some(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"));
                    }
                }
            }
            if !timed_out {
                break;
            }
        }

        let source = last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no connect attempt"));
        Err(QueryError::connect(target, source))
    }

    fn new(
        stream: TcpStream,
        target: String,
        peer: SocketAddr,
        program: u32,
        version: u32,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            stream,
            target,
            peer,
            program,
            version,
            credential: opaque_auth::null(),
            policy,
            outbound: Vec::new(),
            reader: RecordReader::new(),
            pending: HashMap::new(),
            next_xid: initial_xid(),
        }
    }

    /// Credential sent with subsequent calls (AUTH_NULL by default).
    pub fn set_credential(&mut self, credential: opaque_auth) {
        self.credential = credential;
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Events the next [`poll`](Self::poll) should wait for: always readable,
    /// writable while queued bytes remain.
    pub fn interest(&self) -> Interest {
        if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE.add(Interest::WRITABLE)
        }
    }

    /// Queues a call to procedure `proc` with arguments `args`.
    ///
    /// `callback` runs exactly once: with the procedure results, with the
    /// error carried by the reply, on timeout, or when the connection is
    /// dropped. If the call cannot even be encoded, it runs before this
    /// returns the same error.
    pub fn call<A: Serialize + ?Sized>(
        &mut self,
        proc: u32,
        args: &A,
        callback: ReplyCallback,
    ) -> Result<u32, QueryError> {
        let xid = self.allocate_xid();
        let mut message = Vec::new();
        let encoded = call_message(xid, self.program, self.version, proc, self.credential.clone())
            .serialize(&mut message)
            .and_then(|_| args.serialize(&mut message));
        if let Err(e) = encoded {
            let reason = format!("cannot encode call to procedure {proc}: {e}");
            callback(Err(QueryError::Protocol(reason.clone())));
            return Err(QueryError::Protocol(reason));
        }

        let mut record = Vec::with_capacity(message.len() + 4);
        write_record(&mut record, &message);
        self.outbound.extend_from_slice(&record);
        self.pending.insert(
            xid,
            PendingCall {
                record,
                deadline: Instant::now() + self.policy.timeout,
                retries_left: self.policy.retries,
                callback,
            },
        );
        debug!(
            "Queued call xid:{} prog:{} vers:{} proc:{} to {}",
            xid, self.program, self.version, proc, self.target
        );
        Ok(xid)
    }

    /// Waits up to `budget` for the socket to become ready for
    /// [`interest`](Self::interest).
    ///
    /// The wait is cut short at the earliest call deadline. When nothing
    /// became ready, overdue calls are retransmitted or failed with
    /// [`QueryError::Timeout`] and the poll itself fails with `Timeout`.
    pub async fn poll(&mut self, budget: Duration) -> Result<ReadinessEvent, QueryError> {
        let now = Instant::now();
        let wait = match self.next_deadline() {
            Some(deadline) => budget.min(deadline.saturating_duration_since(now)),
            None => budget,
        };
        let interest = self.interest();

        match timeout(wait, self.stream.ready(interest)).await {
            Ok(Ok(ready)) => {
                trace!("Socket to {} ready: {:?}", self.target, ready);
                Ok(ReadinessEvent(ready))
            }
            Ok(Err(e)) => Err(QueryError::Io(e)),
            Err(_) => {
                self.expire_overdue(Instant::now());
                Err(QueryError::Timeout(wait))
            }
        }
    }

    /// Performs the I/O `event` allows and delivers every complete reply.
    ///
    /// Fails with [`QueryError::Protocol`] on a malformed record or message,
    /// and with [`QueryError::Io`] on a socket error or when the peer closed
    /// the connection. Replies that arrived before the close are still
    /// delivered.
    pub fn service(&mut self, event: ReadinessEvent) -> Result<(), QueryError> {
        if event.is_writable() {
            self.flush()?;
        }
        let mut closed = false;
        if event.is_readable() {
            closed = self.fill()?;
            while let Some(record) = self.reader.next_record()? {
                self.deliver(record)?;
            }
        }
        self.expire_overdue(Instant::now());

        if closed {
            return Err(QueryError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection to {} closed by peer", self.target),
            )));
        }
        Ok(())
    }

    /// Closes the socket. Outstanding calls fail with a closed-connection error.
    pub fn close(self) {
        debug!("Closing connection to {}", self.target);
    }

    /// Sends `args` to `proc` and drives the connection until the reply.
    pub async fn call_and_wait<A: Serialize + ?Sized>(
        &mut self,
        proc: u32,
        args: &A,
    ) -> RpcResult {
        let slot: Arc<Mutex<Option<RpcResult>>> = Arc::default();
        let sink = Arc::clone(&slot);
        self.call(
            proc,
            args,
            Box::new(move |result| {
                *sink.lock().expect("unable to lock reply slot") = Some(result);
            }),
        )?;

        let interval = self.policy.timeout;
        run_until(self, interval, || slot.lock().expect("unable to lock reply slot").is_some())
            .await?;

        let reply = slot.lock().expect("unable to lock reply slot").take();
        reply.unwrap_or_else(|| Err(QueryError::connection_closed()))
    }

    fn allocate_xid(&mut self) -> u32 {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        xid
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|call| call.deadline).min()
    }

    fn flush(&mut self) -> Result<(), QueryError> {
        while !self.outbound.is_empty() {
            match self.stream.try_write(&self.outbound) {
                Ok(0) => return Err(QueryError::Io(io::ErrorKind::WriteZero.into())),
                Ok(n) => {
                    trace!("Wrote {} bytes to {}", n, self.target);
                    self.outbound.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Reads everything currently available. Returns true on end of stream.
    fn fill(&mut self) -> Result<bool, QueryError> {
        let mut buf = [0_u8; READ_CHUNK];
        loop {
            match self.stream.try_read(&mut buf) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    trace!("Read {} bytes from {}", n, self.target);
                    self.reader.extend(&buf[..n]);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn deliver(&mut self, record: Vec<u8>) -> Result<(), QueryError> {
        let mut cursor = Cursor::new(record);
        let msg = deserialize::<rpc_msg>(&mut cursor)
            .map_err(|e| QueryError::decode("malformed RPC reply", e))?;
        let reply = match msg.body {
            rpc_body::REPLY(reply) => reply,
            rpc_body::CALL(call) => {
                return Err(QueryError::Protocol(format!(
                    "expected a reply, received a call to program {}",
                    call.prog
                )));
            }
        };

        let Some(call) = self.pending.remove(&msg.xid) else {
            debug!("Dropping reply with unknown xid {} from {}", msg.xid, self.target);
            return Ok(());
        };
        trace!("Reply for xid {} from {}", msg.xid, self.target);

        let result = self.check_reply(reply).map(|()| {
            let offset = cursor.position() as usize;
            cursor.into_inner().split_off(offset)
        });
        (call.callback)(result);
        Ok(())
    }

    fn check_reply(&self, reply: reply_body) -> Result<(), QueryError> {
        match reply {
            reply_body::MSG_ACCEPTED(accepted) => match accepted.reply_data {
                accept_body::SUCCESS => Ok(()),
                accept_body::PROG_UNAVAIL => Err(QueryError::Protocol(format!(
                    "program {} unavailable on {}",
                    self.program, self.target
                ))),
                accept_body::PROG_MISMATCH(info) => Err(QueryError::Protocol(format!(
                    "program {} version {} unsupported, server has {}..={}",
                    self.program, self.version, info.low, info.high
                ))),
                accept_body::PROC_UNAVAIL => {
                    Err(QueryError::Protocol("procedure unavailable".to_string()))
                }
                accept_body::GARBAGE_ARGS => {
                    Err(QueryError::Protocol("server could not decode arguments".to_string()))
                }
                accept_body::SYSTEM_ERR => {
                    Err(QueryError::Protocol("server system error".to_string()))
                }
            },
            reply_body::MSG_DENIED(rejected_reply::AUTH_ERROR(stat)) => {
                Err(QueryError::MountDenied(format!("authentication failed: {stat:?}")))
            }
            reply_body::MSG_DENIED(rejected_reply::RPC_MISMATCH(info)) => {
                Err(QueryError::Protocol(format!(
                    "RPC version mismatch, server has {}..={}",
                    info.low, info.high
                )))
            }
        }
    }

    /// Retransmits calls whose deadline passed, failing those out of retries.
    fn expire_overdue(&mut self, now: Instant) {
        let overdue: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(xid, _)| *xid)
            .collect();

        for xid in overdue {
            let Some(call) = self.pending.get_mut(&xid) else {
                continue;
            };
            if call.retries_left > 0 {
                call.retries_left -= 1;
                call.deadline = now + self.policy.timeout;
                self.outbound.extend_from_slice(&call.record);
                debug!(
                    "Retransmitting xid {} to {} ({} retries left)",
                    xid, self.target, call.retries_left
                );
            } else if let Some(call) = self.pending.remove(&xid) {
                warn!("Call xid {} to {} timed out", xid, self.target);
                (call.callback)(Err(QueryError::Timeout(self.policy.budget())));
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for (xid, call) in self.pending.drain() {
            trace!("Failing xid {} on close of {}", xid, self.target);
            (call.callback)(Err(QueryError::connection_closed()));
        }
    }
}

/// Drives `conn` until `done` reports completion.
///
/// Each round waits up to `interval` for readiness and services the socket.
/// Poll timeouts are not fatal: they are the point where overdue calls get
/// retransmitted or expired, which in turn completes the caller's state. The
/// loop ends with an error on socket or protocol failure, or when no call is
/// left that could complete it.
pub async fn run_until(
    conn: &mut Connection,
    interval: Duration,
    mut done: impl FnMut() -> bool,
) -> Result<(), QueryError> {
    loop {
        if done() {
            return Ok(());
        }
        if conn.pending_calls() == 0 {
            return Err(QueryError::Protocol("no outstanding call left to wait for".to_string()));
        }

        let event = match conn.poll(interval).await {
            Ok(event) => event,
            Err(QueryError::Timeout(waited)) => {
                trace!("Poll on {} idle for {:?}", conn.target, waited);
                continue;
            }
            Err(e) => return Err(e),
        };

        let serviced = conn.service(event);
        // A reply may arrive in the same read as the peer closing the socket.
        if done() {
            return Ok(());
        }
        serviced?;
    }
}

fn initial_xid() -> u32 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.subsec_nanos() ^ (now.as_secs() as u32) ^ std::process::id().rotate_left(16)
}
