//! tombola: multi-agency lottery draw server.
//!
//! Agencies connect over TCP, submit bet batches, confirm readiness for
//! the draw, and collect their winners. A single coordinator task owns
//! all draw state; the wire protocol is newline-delimited text.

pub mod bet;
pub mod config;
pub mod monitor;
pub mod server;
pub mod store;
pub mod wire;

pub use bet::{Bet, WINNING_NUMBER, has_won};
pub use config::Config;
pub use monitor::{DrawMonitor, MonitorError, MonitorHandle};
pub use server::Server;
pub use store::{BetStore, FileBetStore, MemoryBetStore, StoreError};
