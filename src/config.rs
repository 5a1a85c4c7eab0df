use anyhow::{bail, Context, Result};
use std::env;
use std::fmt::Display;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const ENV_DNS_BIND: &str = "SINKDNS_DNS_BIND";
pub const ENV_HTTP_BIND: &str = "SINKDNS_HTTP_BIND";
pub const ENV_UPSTREAM: &str = "SINKDNS_UPSTREAM";
pub const ENV_SINKHOLE_ADDR: &str = "SINKDNS_SINKHOLE_ADDR";
pub const ENV_BLOCK_LIST: &str = "SINKDNS_BLOCK_LIST";
pub const ENV_STATIC_DIR: &str = "SINKDNS_STATIC_DIR";
pub const ENV_WORKERS: &str = "SINKDNS_WORKERS";
pub const ENV_QUEUE_CAPACITY: &str = "SINKDNS_QUEUE_CAPACITY";
pub const ENV_FORWARD_TIMEOUT_MS: &str = "SINKDNS_FORWARD_TIMEOUT_MS";
pub const ENV_RECV_TIMEOUT_MS: &str = "SINKDNS_RECV_TIMEOUT_MS";
pub const ENV_SHUTDOWN_GRACE_MS: &str = "SINKDNS_SHUTDOWN_GRACE_MS";
pub const ENV_LOG: &str = "SINKDNS_LOG";

/// Runtime settings for both listeners.
#[derive(Debug, Clone)]
pub struct Config {
    /// UDP address the DNS listener binds.
    pub dns_bind: SocketAddr,
    /// TCP address the block page listener binds.
    pub http_bind: SocketAddr,
    /// Resolver that receives every query not on the block list.
    pub upstream: SocketAddr,
    /// Address handed out for blocked names.
    pub sinkhole_addr: Ipv4Addr,
    pub block_list: PathBuf,
    /// Directory holding `logo.png`.
    pub static_dir: PathBuf,
    pub workers: usize,
    pub queue_capacity: usize,
    pub forward_timeout: Duration,
    pub recv_timeout: Duration,
    /// How long open HTTP connections may linger after shutdown before they are cut.
    pub shutdown_grace: Duration,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dns_bind: SocketAddr::from(([0, 0, 0, 0], 53)),
            http_bind: SocketAddr::from(([0, 0, 0, 0], 80)),
            upstream: SocketAddr::from(([8, 8, 8, 8], 53)),
            sinkhole_addr: Ipv4Addr::LOCALHOST,
            block_list: PathBuf::from("block_list.config"),
            static_dir: PathBuf::from("static"),
            workers: 10,
            queue_capacity: 256,
            forward_timeout: Duration::from_secs(3),
            recv_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
            log_level: Level::INFO,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from `lookup`, using defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            dns_bind: parse_var(&lookup, ENV_DNS_BIND, defaults.dns_bind)?,
            http_bind: parse_var(&lookup, ENV_HTTP_BIND, defaults.http_bind)?,
            upstream: parse_var(&lookup, ENV_UPSTREAM, defaults.upstream)?,
            sinkhole_addr: parse_var(&lookup, ENV_SINKHOLE_ADDR, defaults.sinkhole_addr)?,
            block_list: lookup(ENV_BLOCK_LIST).map_or(defaults.block_list, PathBuf::from),
            static_dir: lookup(ENV_STATIC_DIR).map_or(defaults.static_dir, PathBuf::from),
            workers: parse_var(&lookup, ENV_WORKERS, defaults.workers)?,
            queue_capacity: parse_var(&lookup, ENV_QUEUE_CAPACITY, defaults.queue_capacity)?,
            forward_timeout: parse_millis(&lookup, ENV_FORWARD_TIMEOUT_MS, defaults.forward_timeout)?,
            recv_timeout: parse_millis(&lookup, ENV_RECV_TIMEOUT_MS, defaults.recv_timeout)?,
            shutdown_grace: parse_millis(&lookup, ENV_SHUTDOWN_GRACE_MS, defaults.shutdown_grace)?,
            log_level: parse_var(&lookup, ENV_LOG, defaults.log_level)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("{ENV_WORKERS} must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("{ENV_QUEUE_CAPACITY} must be at least 1");
        }
        if self.forward_timeout.is_zero() || self.recv_timeout.is_zero() {
            bail!("timeouts must be greater than zero");
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value {raw:?} for {key}")),
        None => Ok(default),
    }
}

fn parse_millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_var(lookup, key, default_ms).map(Duration::from_millis)
}
