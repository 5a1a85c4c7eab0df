use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::blocklist::BlockList;
use crate::config::Config;
use crate::error::BindError;
use crate::page::BlockPageServer;
use crate::server::DnsServer;
use crate::state::{ServerState, StatsSnapshot};

/// Both listeners, running, sharing one block list snapshot.
pub struct Sinkhole {
    dns_addr: SocketAddr,
    http_addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_grace: Duration,
    shutdown_tx: watch::Sender<bool>,
    dns_task: JoinHandle<()>,
    http_task: JoinHandle<io::Result<()>>,
}

impl Sinkhole {
    /// Load the block list named in `config`, bind both listeners and start serving.
    pub async fn start(config: &Config) -> Result<Self, BindError> {
        let blocklist = BlockList::load(&config.block_list).await;
        Self::start_with(config, blocklist).await
    }

    pub async fn start_with(config: &Config, blocklist: BlockList) -> Result<Self, BindError> {
        let state = Arc::new(ServerState::new(blocklist));

        // Bind both before spawning so a taken port fails startup as a whole.
        let dns = DnsServer::bind(config, state.clone()).await?;
        let http = BlockPageServer::bind(config, state.clone()).await?;
        let dns_addr = dns
            .local_addr()
            .map_err(|e| BindError::dns(config.dns_bind, e))?;
        let http_addr = http
            .local_addr()
            .map_err(|e| BindError::http(config.http_bind, e))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dns_task = tokio::spawn(dns.run(shutdown_rx.clone()));
        let http_task = tokio::spawn(http.run(shutdown_rx));

        info!(
            dns = %dns_addr,
            http = %http_addr,
            upstream = %config.upstream,
            sinkhole = %config.sinkhole_addr,
            domains = state.blocklist.len(),
            "sinkhole started"
        );

        Ok(Self {
            dns_addr,
            http_addr,
            state,
            shutdown_grace: config.shutdown_grace,
            shutdown_tx,
            dns_task,
            http_task,
        })
    }

    pub fn dns_addr(&self) -> SocketAddr {
        self.dns_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn blocklist(&self) -> &BlockList {
        &self.state.blocklist
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }

    /// Signal both listeners to stop and wait for them to wind down.
    ///
    /// HTTP connections still open after the grace period are dropped.
    pub async fn shutdown(mut self) -> Result<StatsSnapshot> {
        let _ = self.shutdown_tx.send(true);
        self.dns_task.await.context("DNS listener task failed")?;
        match tokio::time::timeout(self.shutdown_grace, &mut self.http_task).await {
            Ok(joined) => joined
                .context("HTTP listener task failed")?
                .context("HTTP listener stopped with an error")?,
            Err(_) => {
                warn!(grace = ?self.shutdown_grace, "HTTP connections still open, closing them");
                self.http_task.abort();
            }
        }
        let stats = self.state.stats.snapshot();
        info!(
            received = stats.received,
            blocked = stats.blocked,
            forwarded = stats.forwarded,
            dropped = stats.dropped,
            failed = stats.failed,
            rejected = stats.rejected,
            "sinkhole stopped"
        );
        Ok(stats)
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received interrupt"),
        _ = terminate => info!("received terminate"),
    }
}

/// Run until interrupted or terminated.
pub async fn run(config: Config) -> Result<()> {
    let sinkhole = Sinkhole::start(&config).await?;
    shutdown_signal().await;
    info!("shutting down");
    sinkhole.shutdown().await?;
    Ok(())
}
