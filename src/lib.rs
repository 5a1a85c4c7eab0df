//! DNS sinkhole: answers blocked names with a fixed address, relays everything
//! else upstream, and serves a block page to clients that follow the answer.

pub mod blocklist;
pub mod config;
pub mod error;
pub mod handler;
pub mod page;
pub mod runner;
pub mod server;
pub mod state;

pub use blocklist::{BlockEntry, BlockList};
pub use config::Config;
pub use runner::Sinkhole;
pub use state::StatsSnapshot;
