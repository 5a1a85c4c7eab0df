#![allow(dead_code)]
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use trust_dns_proto::op::{Message, MessageType, ResponseCode};
use trust_dns_proto::rr::rdata::A;
use trust_dns_proto::rr::{RData, Record};

pub const UPSTREAM_ANSWER: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

/// Stand-in upstream resolver on a loopback port.
pub struct MockUpstream {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockUpstream {
    /// Answers every query with [`expected_reply`], after a small id-dependent delay
    /// so replies complete out of arrival order.
    pub async fn start() -> Self {
        Self::spawn(true).await
    }

    /// Reads queries but never answers.
    pub async fn silent() -> Self {
        Self::spawn(false).await
    }

    async fn spawn(answer: bool) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let counter = queries.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = socket.recv_from(&mut buf) => {
                        let Ok((len, peer)) = result else { continue };
                        counter.fetch_add(1, Ordering::SeqCst);
                        if !answer {
                            continue;
                        }
                        let query = buf[..len].to_vec();
                        let socket = socket.clone();
                        tokio::spawn(async move {
                            let id = u16::from_be_bytes([query[0], query[1]]);
                            tokio::time::sleep(Duration::from_millis(u64::from(id % 5) * 20)).await;
                            let _ = socket.send_to(&expected_reply(&query), peer).await;
                        });
                    }
                }
            }
        });

        Self {
            addr,
            queries,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// The exact bytes the mock sends back for `query`.
///
/// Uses a non-standard TTL so a relayed reply is distinguishable from a
/// synthesized one.
pub fn expected_reply(query: &[u8]) -> Vec<u8> {
    let request = Message::from_vec(query).unwrap();
    let mut resp = Message::new();
    resp.set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);
    if let Some(q) = request.queries().first() {
        resp.add_query(q.clone());
        resp.add_answer(Record::from_rdata(
            q.name().clone(),
            1234,
            RData::A(A(UPSTREAM_ANSWER)),
        ));
    }
    resp.to_vec().unwrap()
}
