use std::fmt::Debug;
use std::io::Cursor;

use nfs_showmount::protocol::nfs::{mount::decode_exports, v4::root_handle};
use nfs_showmount::xdr::mount::{exportnode, exports, MNTNAMLEN, MNTPATHLEN};
use nfs_showmount::xdr::nfs4::{nfs_resop4, status4, COMPOUND4args, COMPOUND4res, nfsstat4};
use nfs_showmount::xdr::rpc::{auth_flavor, auth_unix, call_message, opaque_auth, rpc_body, rpc_msg};
use nfs_showmount::xdr::{deserialize, Deserialize, Serialize};
use nfs_showmount::{ErrorKind, ExportEntry};

#[derive(Default)]
struct Context {
    buf: Vec<u8>,
}

trait TestValue: Deserialize + Serialize + Eq + Default + Debug + Clone {}
impl<T: Deserialize + Serialize + Eq + Default + Debug + Clone> TestValue for T {}

impl Context {
    /// Encodes after `offset` garbage bytes and decodes the value back.
    fn check<T: TestValue>(&mut self, src_value: &T) {
        for offset in 0..4 {
            self.buf = vec![0xee; offset];
            src_value.serialize(&mut self.buf).expect("cannot serialize");
            assert_eq!((self.buf.len() - offset) % 4, 0);

            let result_value =
                deserialize::<T>(&mut &self.buf[offset..]).expect("cannot deserialize");
            assert_eq!(src_value, &result_value);
        }
    }

    fn check_multi<T: TestValue>(&mut self, src_values: &[T]) {
        src_values.iter().for_each(|i| self.check(i));
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.serialize(&mut buf).expect("cannot serialize");
    buf
}

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

#[test]
fn test_scalar_bijection() {
    let mut ctx = Context::default();

    ctx.check_multi(&[true, false]);
    ctx.check_multi(&[i32::MIN, -1i32, 0i32, 1i32, i32::MAX]);
    ctx.check_multi(&[u32::MIN, 1u32, 2u32, u32::MAX]);
    ctx.check_multi(&[u64::MIN, 1u64, u64::MAX]);
}

#[test]
fn test_string_and_option_bijection() {
    let mut ctx = Context::default();

    ctx.check_multi(&[String::new(), String::from("a"), String::from("/export/home")]);
    ctx.check_multi(&[None, Some(7u32)]);
    ctx.check(&auth_unix {
        stamp: 1,
        machinename: b"client".to_vec(),
        uid: 65534,
        gid: 65534,
        gids: vec![1, 2],
    });
}

#[test]
fn exports_wire_layout() {
    let list = exports(vec![exportnode {
        ex_dir: "/data".to_string(),
        ex_groups: vec!["a".to_string(), "b".to_string()],
    }]);

    let mut expected = words(&[1, 5]);
    expected.extend_from_slice(b"/data\0\0\0");
    expected.extend(words(&[1, 1]));
    expected.extend_from_slice(b"a\0\0\0");
    expected.extend(words(&[1, 1]));
    expected.extend_from_slice(b"b\0\0\0");
    expected.extend(words(&[0, 0]));
    assert_eq!(encode(&list), expected);

    let decoded = decode_exports(&expected).expect("decode");
    assert_eq!(decoded, vec![ExportEntry::with_groups("/data", ["a", "b"])]);
}

#[test]
fn empty_exports_is_a_single_false() {
    assert_eq!(encode(&exports(Vec::new())), words(&[0]));
    assert!(decode_exports(&words(&[0])).expect("decode").is_empty());
}

#[test]
fn long_export_list_decodes_in_order() {
    let entries: Vec<ExportEntry> =
        (0..5000).map(|i| ExportEntry::with_groups(format!("/vol/{i}"), [format!("h{i}")])).collect();
    let list = exports(entries.iter().map(exportnode::from).collect());

    assert_eq!(decode_exports(&encode(&list)).expect("decode"), entries);
}

#[test]
fn entries_without_a_path_are_dropped() {
    let list = exports(vec![
        exportnode { ex_dir: String::new(), ex_groups: vec!["x".to_string()] },
        exportnode { ex_dir: "/ok".to_string(), ex_groups: Vec::new() },
    ]);
    assert_eq!(decode_exports(&encode(&list)).expect("decode"), vec![ExportEntry::new("/ok")]);
}

#[test]
fn rejects_oversized_path_and_group() {
    let long_path = "p".repeat(MNTPATHLEN as usize + 1);
    let list = exports(vec![exportnode { ex_dir: long_path, ex_groups: Vec::new() }]);
    let err = decode_exports(&encode(&list)).expect_err("path too long");
    assert_eq!(err.kind(), ErrorKind::Protocol);

    let long_group = "g".repeat(MNTNAMLEN as usize + 1);
    let list = exports(vec![exportnode { ex_dir: "/d".to_string(), ex_groups: vec![long_group] }]);
    assert!(decode_exports(&encode(&list)).is_err());
}

#[test]
fn rejects_truncated_list() {
    let mut bytes = encode(&exports(vec![exportnode::from(&ExportEntry::new("/data"))]));
    bytes.truncate(bytes.len() - 4);
    let err = decode_exports(&bytes).expect_err("missing terminator");
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn invalid_utf8_is_replaced() {
    let mut bytes = words(&[1, 3]);
    bytes.extend_from_slice(&[b'/', 0xff, b'x', 0]);
    bytes.extend(words(&[0, 0]));

    let decoded = decode_exports(&bytes).expect("decode");
    assert_eq!(decoded[0].path, "/\u{fffd}x");
}

#[test]
fn call_header_layout() {
    let msg = call_message(0x1234, 100005, 3, 5, opaque_auth::null());
    let mut expected = words(&[0x1234, 0, 2, 100005, 3, 5]);
    expected.extend(words(&[0, 0, 0, 0]));
    assert_eq!(encode(&msg), expected);

    let decoded = deserialize::<rpc_msg>(&mut Cursor::new(expected)).expect("decode");
    match decoded.body {
        rpc_body::CALL(call) => {
            assert_eq!((call.prog, call.vers, call.proc), (100005, 3, 5));
            assert_eq!(call.cred.flavor, auth_flavor::AUTH_NULL);
        }
        other => panic!("expected a call, got {other:?}"),
    }
}

#[test]
fn anonymous_unix_credential() {
    let cred = opaque_auth::anonymous_unix("host").expect("encode");
    assert_eq!(cred.flavor, auth_flavor::AUTH_UNIX);

    let body = deserialize::<auth_unix>(&mut Cursor::new(cred.body)).expect("decode");
    assert_eq!((body.uid, body.gid), (65534, 65534));
    assert_eq!(body.machinename, b"host".to_vec());
    assert!(body.gids.is_empty());
}

#[test]
fn root_compound_layout() {
    assert_eq!(encode(&COMPOUND4args::root_handle()), words(&[0, 0, 2, 24, 10]));
}

#[test]
fn root_handle_from_compound_reply() {
    let granted = COMPOUND4res {
        status: status4(0),
        tag: Vec::new(),
        resarray: vec![
            nfs_resop4::OP_PUTROOTFH(status4(0)),
            nfs_resop4::OP_GETFH(status4(0), vec![1, 2, 3]),
        ],
    };
    let decoded = deserialize::<COMPOUND4res>(&mut Cursor::new(encode(&granted))).expect("decode");
    assert_eq!(decoded, granted);
    assert_eq!(root_handle(decoded).expect("handle"), vec![1, 2, 3]);

    let refused = COMPOUND4res {
        status: status4(nfsstat4::NFS4ERR_WRONGSEC as u32),
        tag: Vec::new(),
        resarray: vec![nfs_resop4::OP_PUTROOTFH(status4(nfsstat4::NFS4ERR_WRONGSEC as u32))],
    };
    let err = root_handle(refused).expect_err("refused");
    assert_eq!(err.kind(), ErrorKind::MountDenied);
    assert!(err.to_string().contains("NFS4ERR_WRONGSEC"));

    let empty = COMPOUND4res {
        status: status4(0),
        tag: Vec::new(),
        resarray: vec![
            nfs_resop4::OP_PUTROOTFH(status4(0)),
            nfs_resop4::OP_GETFH(status4(0), Vec::new()),
        ],
    };
    assert_eq!(root_handle(empty).expect_err("no handle").kind(), ErrorKind::Protocol);
}

#[test]
fn unknown_status_is_kept() {
    let status = status4(99_999);
    assert!(!status.is_ok());
    assert_eq!(status.known(), None);
    assert_eq!(status.to_string(), "nfsstat4(99999)");
}
