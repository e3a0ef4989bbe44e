//! Feed Latency Benchmark Library
//!
//! Records the same chain events (pending txs, new blocks, pool reserves) from
//! a full node, a relay network and a mempool vendor into timestamped JSONL
//! files for offline arrival-time comparison.
//!
//! Created: 2026-02-03

pub mod block_number;
pub mod codec;
pub mod config;
pub mod contracts;
pub mod dedup;
pub mod lifecycle;
pub mod reserve;
pub mod sink;
pub mod sources;
pub mod types;

// Re-export commonly used types
pub use block_number::BlockNumber;
pub use codec::CodecError;
pub use dedup::DedupLedger;
pub use lifecycle::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use reserve::{PollError, PollStrategy, ReservePoller, ReserveSource};
pub use sink::SinkStats;
pub use types::{BlockHead, HashRecord, NodeTx, PairReserve, ReserveTuple, TxRecord, VendorTx};
