//! Per-datagram resolution: decode, decide block vs. forward, produce bytes.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info};
use trust_dns_proto::error::ProtoError;
use trust_dns_proto::op::{Message, MessageType, ResponseCode};
use trust_dns_proto::rr::rdata::A as ARecord;
use trust_dns_proto::rr::{Name, RData, Record, RecordType};

use crate::error::{DecodeError, ForwardError, QueryError};
use crate::state::ServerState;

/// TTL carried by every synthesized block answer.
pub const BLOCK_TTL: u32 = 60;

/// Largest upstream reply relayed back to a client.
pub const MAX_RELAY_SIZE: usize = 4096;

/// A decoded inbound query. `raw` is kept verbatim for forwarding.
#[derive(Debug)]
pub struct DnsQuery<'a> {
    pub id: u16,
    /// Question name without the trailing root label.
    pub name: String,
    pub query_type: RecordType,
    pub message: Message,
    pub raw: &'a [u8],
}

/// What goes back to the client for a successfully handled datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Locally synthesized sinkhole answer.
    Blocked(Vec<u8>),
    /// Upstream reply, byte for byte.
    Forwarded(Vec<u8>),
}

impl Resolution {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Resolution::Blocked(b) | Resolution::Forwarded(b) => b,
        }
    }
}

pub fn decode_query(raw: &[u8]) -> Result<DnsQuery<'_>, DecodeError> {
    let message = Message::from_vec(raw)?;
    let id = message.id();
    if message.message_type() != MessageType::Query {
        return Err(DecodeError::NotAQuery { id });
    }
    let question = message
        .queries()
        .first()
        .ok_or(DecodeError::NoQuestion { id })?;
    let name = question_name(question.name());
    let query_type = question.query_type();
    Ok(DnsQuery {
        id,
        name,
        query_type,
        message,
        raw,
    })
}

fn question_name(name: &Name) -> String {
    let ascii = name.to_ascii();
    match ascii.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => ascii,
    }
}

/// Build the sinkhole answer for `query`.
///
/// The answer is always a single A record, whatever type was asked for.
pub fn build_block_response(query: &Message, sinkhole: Ipv4Addr) -> Result<Vec<u8>, ProtoError> {
    let mut resp = Message::new();
    resp.set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_authoritative(true)
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);
    if let Some(q) = query.queries().first() {
        resp.add_query(q.clone());
        resp.add_answer(Record::from_rdata(
            q.name().clone(),
            BLOCK_TTL,
            RData::A(ARecord(sinkhole)),
        ));
    }
    resp.to_vec()
}

const HEADER_LEN: usize = 12;

/// Copy the question section of `query` over the one in `response`.
///
/// The encoder lowercases names, so this puts the client's own spelling back,
/// which resolvers that randomise query case check for. Nothing is changed
/// unless both sections have the same length and match ignoring ASCII case.
pub fn restore_question(response: &mut [u8], query: &[u8]) {
    let Some(len) = question_len(query) else {
        return;
    };
    let end = HEADER_LEN + len;
    if response.len() < end || query.len() < end {
        return;
    }
    let theirs = &query[HEADER_LEN..end];
    let ours = &mut response[HEADER_LEN..end];
    if ours.eq_ignore_ascii_case(theirs) {
        ours.copy_from_slice(theirs);
    }
}

/// Wire length of the first question (name, type, class).
fn question_len(packet: &[u8]) -> Option<usize> {
    let mut pos = HEADER_LEN;
    loop {
        let label = usize::from(*packet.get(pos)?);
        match label {
            0 => {
                pos += 1;
                break;
            }
            l if l & 0xc0 == 0xc0 => {
                pos += 2;
                break;
            }
            l if l & 0xc0 != 0 => return None,
            l => pos += 1 + l,
        }
    }
    let end = pos + 4;
    (end <= packet.len()).then(|| end - HEADER_LEN)
}

/// Send `packet` unchanged to `upstream` over a fresh socket and wait for one reply.
///
/// The socket lives only for this call.
pub async fn forward_to_upstream(
    packet: &[u8],
    upstream: SocketAddr,
    timeout: Duration,
) -> Result<Vec<u8>, ForwardError> {
    let local: SocketAddr = if upstream.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let sock = UdpSocket::bind(local).await.map_err(ForwardError::Bind)?;
    sock.connect(upstream)
        .await
        .map_err(|source| ForwardError::Send { upstream, source })?;
    sock.send(packet)
        .await
        .map_err(|source| ForwardError::Send { upstream, source })?;

    let mut buf = vec![0u8; MAX_RELAY_SIZE];
    match tokio::time::timeout(timeout, sock.recv(&mut buf)).await {
        Ok(Ok(n)) => {
            buf.truncate(n);
            Ok(buf)
        }
        Ok(Err(source)) => Err(ForwardError::Recv { upstream, source }),
        Err(_) => Err(ForwardError::Timeout { upstream, timeout }),
    }
}

/// Decides, for each datagram, whether to sinkhole or forward it.
#[derive(Debug, Clone)]
pub struct QueryHandler {
    state: Arc<ServerState>,
    sinkhole: Ipv4Addr,
    upstream: SocketAddr,
    forward_timeout: Duration,
}

impl QueryHandler {
    pub fn new(
        state: Arc<ServerState>,
        sinkhole: Ipv4Addr,
        upstream: SocketAddr,
        forward_timeout: Duration,
    ) -> Self {
        Self {
            state,
            sinkhole,
            upstream,
            forward_timeout,
        }
    }

    pub async fn resolve(&self, packet: &[u8]) -> Result<Resolution, QueryError> {
        let query = decode_query(packet)?;

        if self.state.blocklist.is_blocked(&query.name) {
            info!(domain = %query.name, qtype = %query.query_type, "blocked request");
            let mut bytes =
                build_block_response(&query.message, self.sinkhole).map_err(QueryError::Encode)?;
            restore_question(&mut bytes, query.raw);
            return Ok(Resolution::Blocked(bytes));
        }

        debug!(domain = %query.name, qtype = %query.query_type, upstream = %self.upstream, "forwarding request");
        let bytes = forward_to_upstream(query.raw, self.upstream, self.forward_timeout).await?;
        Ok(Resolution::Forwarded(bytes))
    }
}
