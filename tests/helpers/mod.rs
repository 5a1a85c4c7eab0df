#![allow(dead_code)]
pub mod upstream_mock;

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sinkdns::Config;
use tempfile::TempDir;
use tokio::net::UdpSocket;
use trust_dns_proto::op::{Message, MessageType, OpCode, Query};
use trust_dns_proto::rr::{Name, RecordType};

pub const BLOCK_LIST_FILE: &str = "block_list.config";

/// Config bound to loopback ephemeral ports, reading its files from `dir`.
pub fn test_config(dir: &Path, upstream: SocketAddr) -> Config {
    Config {
        dns_bind: "127.0.0.1:0".parse().unwrap(),
        http_bind: "127.0.0.1:0".parse().unwrap(),
        upstream,
        block_list: dir.join(BLOCK_LIST_FILE),
        static_dir: dir.to_path_buf(),
        forward_timeout: Duration::from_millis(500),
        recv_timeout: Duration::from_millis(100),
        ..Config::default()
    }
}

pub fn write_block_list(dir: &Path, json: &str) {
    let mut file = std::fs::File::create(dir.join(BLOCK_LIST_FILE)).unwrap();
    file.write_all(json.as_bytes()).unwrap();
}

pub fn workdir() -> TempDir {
    tempfile::tempdir().unwrap()
}

pub fn query(id: u16, name: &str, rtype: RecordType) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_str(name).unwrap(), rtype));
    msg.to_vec().unwrap()
}

/// Encode a query by hand so the label spelling reaches the wire unchanged.
pub fn wire_query(id: u16, name: &str, rtype: RecordType) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(&id.to_be_bytes());
    // RD set, one question.
    raw.extend_from_slice(&[0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    for label in name.split('.').filter(|l| !l.is_empty()) {
        raw.push(u8::try_from(label.len()).unwrap());
        raw.extend_from_slice(label.as_bytes());
    }
    raw.push(0);
    raw.extend_from_slice(&u16::from(rtype).to_be_bytes());
    raw.extend_from_slice(&[0x00, 0x01]);
    raw
}

/// Send `packet` from a fresh client socket and wait briefly for one reply.
pub async fn exchange(server: SocketAddr, packet: &[u8], wait: Duration) -> Option<Vec<u8>> {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    exchange_from(&client, server, packet, wait).await
}

pub async fn exchange_from(
    client: &UdpSocket,
    server: SocketAddr,
    packet: &[u8],
    wait: Duration,
) -> Option<Vec<u8>> {
    client.send_to(packet, server).await.unwrap();
    let mut buf = vec![0u8; 4096];
    match tokio::time::timeout(wait, client.recv_from(&mut buf)).await {
        Ok(Ok((n, from))) => {
            assert_eq!(from, server, "reply must come from the listening socket");
            buf.truncate(n);
            Some(buf)
        }
        _ => None,
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
