use bytes::{Bytes, BytesMut};
use cinder::*;
use std::sync::Arc;

fn dispatcher(store: Store) -> Dispatcher {
    Dispatcher::new(Arc::new(store), Arc::new(Config::default()))
}

fn exec(d: &Dispatcher, cmd: Cmd) -> Vec<u8> {
    let mut out = BytesMut::new();
    d.exec(cmd, &mut out);
    out.to_vec()
}

fn handle(d: &Dispatcher, frame: Frame) -> Vec<u8> {
    let mut out = BytesMut::new();
    d.handle(frame, &mut out);
    out.to_vec()
}

fn args(parts: &[&'static str]) -> Frame {
    Frame::Request(parts.iter().map(|p| Bytes::from_static(p.as_bytes())).collect())
}

#[test]
fn get_live_and_missing_keys() {
    let store = Store::new();
    store.insert(Bytes::from_static(b"k1"), Bytes::from_static(b"v1"), None);
    let d = dispatcher(store);

    assert_eq!(exec(&d, Cmd::Get(Bytes::from_static(b"k1"))), protocol::resp_bulk(b"v1"));
    assert_eq!(exec(&d, Cmd::Get(Bytes::from_static(b"nosuchkey"))), b"$-1\r\n");
}

#[test]
fn get_purges_expired_key() {
    let store = Store::new();
    store.insert(Bytes::from_static(b"k2"), Bytes::from_static(b"v2"), Some(1));
    let d = dispatcher(store);

    assert_eq!(exec(&d, Cmd::Type(Bytes::from_static(b"k2"))), b"+string\r\n");
    assert_eq!(exec(&d, Cmd::Get(Bytes::from_static(b"k2"))), protocol::resp_null());
    assert_eq!(exec(&d, Cmd::Type(Bytes::from_static(b"k2"))), b"+none\r\n");
    assert!(d.store().is_empty());
}

#[test]
fn info_replication() {
    let d = dispatcher(Store::new());
    assert_eq!(handle(&d, args(&["INFO", "replication"])), b"$9\r\nrole:master\r\n");
    assert_eq!(handle(&d, args(&["info", "Replication"])), b"$9\r\nrole:master\r\n");
    assert_eq!(
        handle(&d, args(&["INFO", "somethingelse"])),
        protocol::resp_error("unsupported INFO section")
    );
    assert_eq!(handle(&d, args(&["INFO"])), protocol::resp_error("unsupported INFO section"));
}

#[test]
fn errors_for_bad_requests() {
    let d = dispatcher(Store::new());
    assert_eq!(handle(&d, args(&["GET"])), b"-ERR invalid GET syntax\r\n");
    assert_eq!(handle(&d, args(&["GET", "a", "b"])), b"-ERR invalid GET syntax\r\n");
    assert_eq!(handle(&d, args(&["SET", "a", "b"])), b"-ERR unknown command\r\n");
    assert_eq!(
        handle(&d, Frame::Invalid(CommandError::MultibulkLength)),
        b"-ERR Protocol error: invalid multibulk length\r\n"
    );
}

#[test]
fn silent_frames() {
    let d = dispatcher(Store::new());
    assert!(handle(&d, Frame::Skipped).is_empty());
    assert!(handle(&d, Frame::Request(vec![])).is_empty());
}

#[test]
fn config_get() {
    let config = Config {
        dir: "/data".into(),
        dbfilename: "x.rdb".into(),
        ..Config::default()
    };
    let d = Dispatcher::new(Arc::new(Store::new()), Arc::new(config));

    assert_eq!(
        handle(&d, args(&["CONFIG", "GET", "dir"])),
        b"*2\r\n$3\r\ndir\r\n$5\r\n/data\r\n"
    );
    assert_eq!(
        handle(&d, args(&["config", "get", "dbfilename"])),
        b"*2\r\n$10\r\ndbfilename\r\n$5\r\nx.rdb\r\n"
    );
    assert_eq!(handle(&d, args(&["CONFIG", "GET", "appendonly"])), b"*0\r\n");
}
