use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{BindError, QueryError};
use crate::handler::{QueryHandler, Resolution};
use crate::state::{ServerState, Stats};

/// Classic DNS-over-UDP size ceiling for inbound queries.
pub const MAX_QUERY_SIZE: usize = 512;

#[derive(Debug)]
struct Datagram {
    packet: Vec<u8>,
    src: SocketAddr,
}

type Queue = Arc<Mutex<mpsc::Receiver<Datagram>>>;

/// UDP listener that sinkholes blocked names and relays the rest.
pub struct DnsServer {
    socket: Arc<UdpSocket>,
    handler: Arc<QueryHandler>,
    state: Arc<ServerState>,
    workers: usize,
    queue_capacity: usize,
    recv_timeout: Duration,
}

impl DnsServer {
    pub async fn bind(config: &Config, state: Arc<ServerState>) -> Result<Self, BindError> {
        let socket = UdpSocket::bind(config.dns_bind)
            .await
            .map_err(|e| BindError::dns(config.dns_bind, e))?;
        let handler = QueryHandler::new(
            state.clone(),
            config.sinkhole_addr,
            config.upstream,
            config.forward_timeout,
        );
        Ok(Self {
            socket: Arc::new(socket),
            handler: Arc::new(handler),
            state,
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            recv_timeout: config.recv_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive until `shutdown` flips to true, then let in-flight queries finish.
    ///
    /// Datagrams arriving while the queue is full are dropped, as are queued
    /// datagrams no worker has picked up by the time the loop stops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = self.local_addr() {
            info!(addr = %addr, workers = self.workers, queue = self.queue_capacity, "DNS UDP listening");
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let queue: Queue = Arc::new(Mutex::new(rx));
        let stopping = Arc::new(AtomicBool::new(false));
        let mut pool = JoinSet::new();
        for id in 0..self.workers {
            pool.spawn(worker(
                id,
                queue.clone(),
                stopping.clone(),
                self.socket.clone(),
                self.handler.clone(),
                self.state.clone(),
            ));
        }

        let mut buf = [0u8; MAX_QUERY_SIZE];
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = tokio::time::timeout(self.recv_timeout, self.socket.recv_from(&mut buf)) => {
                    let (len, src) = match received {
                        Err(_) => continue,
                        Ok(Err(e)) => {
                            warn!(error = %e, "DNS receive failed");
                            continue;
                        }
                        Ok(Ok(r)) => r,
                    };
                    Stats::incr(&self.state.stats.received);
                    let datagram = Datagram { packet: buf[..len].to_vec(), src };
                    match tx.try_send(datagram) {
                        Ok(()) => {}
                        Err(TrySendError::Full(d)) => {
                            Stats::incr(&self.state.stats.rejected);
                            warn!(client = %d.src, "query queue full, dropping datagram");
                        }
                        Err(TrySendError::Closed(_)) => {
                            error!("all DNS workers exited");
                            break;
                        }
                    }
                }
            }
        }

        stopping.store(true, Ordering::Release);
        drop(tx);
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "DNS worker ended abnormally");
            }
        }
        info!("DNS server stopped");
    }
}

async fn worker(
    id: usize,
    queue: Queue,
    stopping: Arc<AtomicBool>,
    socket: Arc<UdpSocket>,
    handler: Arc<QueryHandler>,
    state: Arc<ServerState>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(datagram) = next else {
            break;
        };
        if stopping.load(Ordering::Acquire) {
            Stats::incr(&state.stats.rejected);
            debug!(worker = id, client = %datagram.src, "discarding queued datagram on shutdown");
            continue;
        }
        // Run each query in its own task so a panic only loses that query.
        let task = tokio::spawn(respond(
            socket.clone(),
            handler.clone(),
            state.clone(),
            datagram,
        ));
        if let Err(e) = task.await {
            error!(worker = id, error = %e, "query handling panicked");
        }
    }
    debug!(worker = id, "DNS worker exiting");
}

async fn respond(
    socket: Arc<UdpSocket>,
    handler: Arc<QueryHandler>,
    state: Arc<ServerState>,
    datagram: Datagram,
) {
    let stats = &state.stats;
    let resolution = match handler.resolve(&datagram.packet).await {
        Ok(r) => r,
        Err(QueryError::Decode(e)) => {
            Stats::incr(&stats.dropped);
            warn!(client = %datagram.src, error = %e, "dropping undecodable datagram");
            return;
        }
        Err(e) => {
            Stats::incr(&stats.failed);
            warn!(client = %datagram.src, error = %e, "query left unanswered");
            return;
        }
    };

    match &resolution {
        Resolution::Blocked(_) => Stats::incr(&stats.blocked),
        Resolution::Forwarded(_) => Stats::incr(&stats.forwarded),
    }
    if let Err(e) = socket.send_to(resolution.bytes(), datagram.src).await {
        warn!(client = %datagram.src, error = %e, "failed to send DNS response");
    }
}
