use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::blocklist::BlockList;

/// State shared by the DNS and HTTP listeners.
///
/// The block list is never written after construction; only the counters move.
#[derive(Debug, Default)]
pub struct ServerState {
    pub blocklist: BlockList,
    pub stats: Stats,
}

impl ServerState {
    pub fn new(blocklist: BlockList) -> Self {
        Self {
            blocklist,
            stats: Stats::default(),
        }
    }
}

/// Per-process query counters.
#[derive(Debug, Default)]
pub struct Stats {
    pub received: AtomicU64,
    pub blocked: AtomicU64,
    pub forwarded: AtomicU64,
    pub dropped: AtomicU64,
    pub failed: AtomicU64,
    pub rejected: AtomicU64,
}

impl Stats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub blocked: u64,
    pub forwarded: u64,
    /// Datagrams that did not decode as a query.
    pub dropped: u64,
    /// Forwarded queries the upstream never answered.
    pub failed: u64,
    /// Datagrams turned away because the worker queue was full, or still
    /// queued when the listener stopped.
    pub rejected: u64,
}
