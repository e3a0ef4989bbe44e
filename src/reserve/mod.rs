//! Reserve Poller
//!
//! Reads pool reserves from a full node and emits deduplicated snapshots.
//! Three strategies:
//! - per-pool: one `getReserves()` per pool, back to back, no delay
//! - bulk: one batch-reader call for all pools, no delay
//! - bulk-on-head: one batch-reader call per new block header
//!
//! Every snapshot is stamped with the tracker's height at emission time.
//! A failed read is fatal.

pub mod poller;
pub mod source;

pub use poller::ReservePoller;
pub use source::ContractReserveSource;

use crate::lifecycle::fatal;
use crate::types::ReserveTuple;
use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;

/// Where reserve tuples come from
#[async_trait]
pub trait ReserveSource: Send + Sync {
    async fn reserves(&self, pair: Address) -> Result<ReserveTuple>;

    /// One tuple per pair, in input order
    async fn reserves_bulk(&self, pairs: &[Address]) -> Result<Vec<ReserveTuple>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PollStrategy {
    PerPool,
    Bulk,
    BulkOnHead,
}

impl PollStrategy {
    pub fn default_output(self) -> &'static str {
        match self {
            PollStrategy::PerPool => "fullnode-pair-reserve.json",
            PollStrategy::Bulk => "fullnode-pair-reserve-bulk.json",
            PollStrategy::BulkOnHead => "fullnode-pair-reserve-bulk-head.json",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("getReserves failed for {pair}: {reason}")]
    Read { pair: Address, reason: String },
    #[error("bulk reserve read failed: {0}")]
    BulkRead(String),
    #[error("bulk reader returned {got} tuples for {expected} pairs")]
    LengthMismatch { expected: usize, got: usize },
}

/// Run a poll loop in the background. Any error terminates the process.
pub fn spawn_fatal<F>(poll: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = Result<(), PollError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = poll.await {
            fatal("reserve poller", e);
        }
    })
}
