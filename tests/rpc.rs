use std::sync::{Arc, Mutex};
use std::time::Duration;

mod support;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use nfs_showmount::protocol::rpc::{run_until, write_record, Connection, RetryPolicy, RpcResult};
use nfs_showmount::xdr::rpc::{accept_body, auth_stat, success_reply_message};
use nfs_showmount::xdr::Serialize;
use nfs_showmount::ErrorKind;

use support::{closed_port, init_logging, port_results, FakeServer, Reply};

const TEST_PROGRAM: u32 = 400_001;

fn policy(timeout_ms: u64, retries: u32) -> RetryPolicy {
    RetryPolicy { timeout: Duration::from_millis(timeout_ms), retries }
}

async fn connect(port: u16, policy: RetryPolicy) -> Connection {
    Connection::open("127.0.0.1", port, TEST_PROGRAM, 1, policy).await.expect("connect")
}

#[tokio::test]
async fn returns_procedure_results() {
    let server = FakeServer::spawn(|_| Reply::Success(port_results(2049))).await;
    let mut conn = connect(server.port(), policy(500, 0)).await;

    let body = conn.call_and_wait(3, &()).await.expect("reply");
    assert_eq!(body, vec![0, 0, 0x08, 0x01]);
    assert_eq!(conn.pending_calls(), 0);

    let call = &server.calls()[0];
    assert_eq!((call.prog, call.vers, call.proc), (TEST_PROGRAM, 1, 3));
}

#[tokio::test]
async fn retransmits_with_same_xid_then_times_out() {
    init_logging();
    let server = FakeServer::spawn(|_| Reply::Ignore).await;
    let mut conn = connect(server.port(), policy(100, 2)).await;

    let err = conn.call_and_wait(0, &()).await.expect_err("no reply");
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let calls = server.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|call| call.xid == calls[0].xid));
}

#[tokio::test]
async fn maps_reply_status_to_error_kind() {
    let unavailable = FakeServer::spawn(|_| Reply::Accepted(accept_body::PROG_UNAVAIL)).await;
    let denied = FakeServer::spawn(|_| Reply::AuthError(auth_stat::AUTH_BADCRED)).await;

    let mut conn = connect(unavailable.port(), policy(500, 0)).await;
    let err = conn.call_and_wait(0, &()).await.expect_err("refused");
    assert_eq!(err.kind(), ErrorKind::Protocol);

    let mut conn = connect(denied.port(), policy(500, 0)).await;
    let err = conn.call_and_wait(0, &()).await.expect_err("denied");
    assert_eq!(err.kind(), ErrorKind::MountDenied);
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let port = closed_port().await;
    let err = Connection::open("127.0.0.1", port, TEST_PROGRAM, 1, policy(200, 2))
        .await
        .expect_err("nothing listens");
    assert_eq!(err.kind(), ErrorKind::Connect);
}

#[tokio::test]
async fn drop_fails_outstanding_calls() {
    let server = FakeServer::spawn(|_| Reply::Ignore).await;
    let mut conn = connect(server.port(), policy(1000, 0)).await;

    let slot: Arc<Mutex<Vec<RpcResult>>> = Arc::default();
    let sink = Arc::clone(&slot);
    conn.call(0, &(), Box::new(move |result| sink.lock().unwrap().push(result)))
        .expect("queue call");
    assert_eq!(conn.pending_calls(), 1);
    conn.close();

    let results = slot.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().expect_err("closed").kind(), ErrorKind::Io);
}

#[tokio::test]
async fn ignores_replies_to_unknown_calls() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("address").port();
    let (xid_tx, xid_rx) = tokio::sync::oneshot::channel::<u32>();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let xid = xid_rx.await.expect("xid");
        for reply_xid in [xid.wrapping_add(1000), xid] {
            let mut message = Vec::new();
            success_reply_message(reply_xid).serialize(&mut message).expect("encode");
            7_u32.serialize(&mut message).expect("encode");
            let mut record = Vec::new();
            write_record(&mut record, &message);
            socket.write_all(&record).await.expect("write");
        }
        socket
    });

    let mut conn = connect(port, policy(1000, 0)).await;
    let slot: Arc<Mutex<Option<RpcResult>>> = Arc::default();
    let sink = Arc::clone(&slot);
    let xid = conn
        .call(0, &(), Box::new(move |result| *sink.lock().unwrap() = Some(result)))
        .expect("queue call");
    xid_tx.send(xid).expect("send xid");

    run_until(&mut conn, Duration::from_millis(100), || slot.lock().unwrap().is_some())
        .await
        .expect("reply");
    let body = slot.lock().unwrap().take().expect("delivered").expect("success");
    assert_eq!(body, vec![0, 0, 0, 7]);
    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn peer_close_ends_the_loop() {
    let server = FakeServer::spawn(|_| Reply::Close).await;
    let mut conn = connect(server.port(), policy(1000, 0)).await;

    let err = conn.call_and_wait(0, &()).await.expect_err("closed");
    assert_eq!(err.kind(), ErrorKind::Io);
}
