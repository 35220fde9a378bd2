//! In-process ONC RPC servers for exercising the client against real sockets.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use nfs_showmount::protocol::rpc::{write_record, RecordReader};
use nfs_showmount::xdr::mount::{exportnode, exports};
use nfs_showmount::xdr::nfs4::{nfs_resop4, status4, COMPOUND4res};
use nfs_showmount::xdr::rpc::{
    accept_body, accepted_reply_message, auth_error_reply_message, auth_stat, opaque_auth,
    rpc_body, rpc_msg, success_reply_message,
};
use nfs_showmount::xdr::{deserialize, Serialize};
use nfs_showmount::{ExportEntry, QueryOptions};

/// What the server does with one call.
#[derive(Clone, Debug)]
pub enum Reply {
    /// SUCCESS followed by these procedure results
    Success(Vec<u8>),
    /// Accepted with a non-SUCCESS status
    Accepted(accept_body),
    AuthError(auth_stat),
    /// Hang up without answering
    Close,
    /// Swallow the call
    Ignore,
}

/// Header fields of a call the server received.
#[derive(Clone, Debug)]
pub struct ReceivedCall {
    pub xid: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: opaque_auth,
}

type Responder = dyn Fn(&ReceivedCall) -> Reply + Send + Sync;

pub struct FakeServer {
    addr: SocketAddr,
    calls: Arc<Mutex<Vec<ReceivedCall>>>,
    accepted: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    accept_loop: JoinHandle<()>,
}

impl FakeServer {
    /// Starts a server on an ephemeral loopback port answering every call
    /// with `responder`.
    pub async fn spawn<F>(responder: F) -> FakeServer
    where
        F: Fn(&ReceivedCall) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = listener.local_addr().expect("fake server address");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let accepted = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&calls);
        let (opened, closed) = (Arc::clone(&accepted), Arc::clone(&finished));
        let accept_loop = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                opened.fetch_add(1, Ordering::SeqCst);
                let (responder, seen, closed) =
                    (Arc::clone(&responder), Arc::clone(&seen), Arc::clone(&closed));
                tokio::spawn(async move {
                    serve(socket, responder, seen).await;
                    closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        FakeServer { addr, calls, accepted, finished, accept_loop }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn calls(&self) -> Vec<ReceivedCall> {
        self.calls.lock().expect("lock received calls").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock received calls").len()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections on which the server read end of stream (or hung up itself).
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Waits until the server accepted `expected` connections and read end of
    /// stream on each of them.
    ///
    /// The server only notices a close on its next read, so the loopback gets
    /// a moment before this fails.
    pub async fn assert_all_closed(&self, expected: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.accepted() < expected || self.finished() < self.accepted() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "{} of {} connections still open ({} expected)",
                self.accepted() - self.finished(),
                self.accepted(),
                expected
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(self.accepted(), expected);
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<ReceivedCall>>>,
) {
    let mut reader = RecordReader::new();
    let mut buf = [0_u8; 4096];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        reader.extend(&buf[..n]);
        while let Ok(Some(record)) = reader.next_record() {
            let msg = deserialize::<rpc_msg>(&mut Cursor::new(record)).expect("decode call");
            let call = match msg.body {
                rpc_body::CALL(call) => ReceivedCall {
                    xid: msg.xid,
                    prog: call.prog,
                    vers: call.vers,
                    proc: call.proc,
                    cred: call.cred,
                },
                rpc_body::REPLY(_) => panic!("fake server received a reply"),
            };
            calls.lock().expect("lock received calls").push(call.clone());

            let mut message = Vec::new();
            match responder(&call) {
                Reply::Success(results) => {
                    success_reply_message(call.xid).serialize(&mut message).expect("encode");
                    message.extend_from_slice(&results);
                }
                Reply::Accepted(status) => {
                    accepted_reply_message(call.xid, status)
                        .serialize(&mut message)
                        .expect("encode");
                }
                Reply::AuthError(stat) => {
                    auth_error_reply_message(call.xid, stat).serialize(&mut message).expect("encode");
                }
                Reply::Close => return,
                Reply::Ignore => continue,
            }
            let mut record = Vec::new();
            write_record(&mut record, &message);
            if socket.write_all(&record).await.is_err() {
                return;
            }
        }
    }
}

/// `MOUNTPROC_EXPORT` results listing `entries`.
pub fn export_results(entries: &[ExportEntry]) -> Vec<u8> {
    let list = exports(entries.iter().map(exportnode::from).collect());
    let mut buf = Vec::new();
    list.serialize(&mut buf).expect("encode exports");
    buf
}

/// `PMAPPROC_GETPORT` results.
pub fn port_results(port: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    u32::from(port).serialize(&mut buf).expect("encode port");
    buf
}

/// `COMPOUND` results of a successful `PUTROOTFH; GETFH`.
pub fn root_granted() -> Vec<u8> {
    compound_results(COMPOUND4res {
        status: status4(0),
        tag: Vec::new(),
        resarray: vec![
            nfs_resop4::OP_PUTROOTFH(status4(0)),
            nfs_resop4::OP_GETFH(status4(0), vec![0xab; 16]),
        ],
    })
}

/// `COMPOUND` results of a `PUTROOTFH` refused with `status`.
pub fn root_refused(status: u32) -> Vec<u8> {
    compound_results(COMPOUND4res {
        status: status4(status),
        tag: Vec::new(),
        resarray: vec![nfs_resop4::OP_PUTROOTFH(status4(status))],
    })
}

pub fn compound_results(res: COMPOUND4res) -> Vec<u8> {
    let mut buf = Vec::new();
    res.serialize(&mut buf).expect("encode compound");
    buf
}

/// A loopback port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind probe listener");
    let port = listener.local_addr().expect("probe address").port();
    drop(listener);
    port
}

/// Options with short timeouts and both ports pinned to loopback servers.
pub fn fast_options(mount_port: u16, nfs_port: u16) -> QueryOptions {
    QueryOptions::new()
        .with_timeout(Duration::from_millis(200))
        .with_retries(1)
        .with_mount_port(mount_port)
        .with_nfs_port(nfs_port)
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
