use cinder::replica::{spawn_ack_client, REPLCONF_ACK};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::Duration;

#[test]
fn replica_acks_master_getack() {
    let master = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = master.local_addr().unwrap();

    let client = spawn_ack_client(addr.to_string()).unwrap();

    let (mut sock, _) = master.accept().unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(10))).unwrap();

    let mut buf = vec![0u8; REPLCONF_ACK.len()];
    sock.read_exact(&mut buf).unwrap();
    assert_eq!(buf, REPLCONF_ACK);

    sock.write_all(b"*3\r\n$8\r\nREPLCONF\r\n$6\r\nGETACK\r\n$1\r\n*\r\n").unwrap();
    sock.read_exact(&mut buf).unwrap();
    assert_eq!(buf, REPLCONF_ACK);

    drop(sock);
    client.join().unwrap();
}

#[test]
fn unreachable_master_ends_quietly() {
    // Bind then drop to get a port nobody listens on
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let client = spawn_ack_client(addr.to_string()).unwrap();
    client.join().unwrap();
}
