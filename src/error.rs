use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use trust_dns_proto::error::ProtoError;

/// Reading the persisted block list failed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read block list {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("block list {} is not a domain to reason mapping: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// An inbound datagram could not be treated as a DNS query.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed DNS message: {0}")]
    Malformed(#[from] ProtoError),

    #[error("message {id} carries no question")]
    NoQuestion { id: u16 },

    #[error("message {id} is a response, not a query")]
    NotAQuery { id: u16 },
}

/// Relaying a query to the upstream resolver failed.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to open forwarding socket: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to send query to upstream {upstream}: {source}")]
    Send {
        upstream: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to receive reply from upstream {upstream}: {source}")]
    Recv {
        upstream: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("upstream {upstream} did not answer within {timeout:?}")]
    Timeout {
        upstream: SocketAddr,
        timeout: Duration,
    },
}

/// Outcome of handling one datagram that did not produce a reply.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to encode block response: {0}")]
    Encode(#[source] ProtoError),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

/// A listener could not claim its address.
#[derive(Debug, Error)]
#[error("failed to bind {protocol} listener on {addr}: {source}")]
pub struct BindError {
    pub protocol: &'static str,
    pub addr: SocketAddr,
    #[source]
    pub source: io::Error,
}

impl BindError {
    pub fn dns(addr: SocketAddr, source: io::Error) -> Self {
        Self { protocol: "DNS", addr, source }
    }

    pub fn http(addr: SocketAddr, source: io::Error) -> Self {
        Self { protocol: "HTTP", addr, source }
    }
}
