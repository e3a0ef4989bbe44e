//! Event Source Adapters
//!
//! One module per upstream. Every adapter returns its records on an mpsc
//! receiver. Setup failures come back as `Err`; after that, per-item problems
//! are handled inside the adapter and the consumer only sees the channel close.

pub mod blocknative;
pub mod bloxroute;
pub mod filter;
pub mod fullnode;

pub use blocknative::{BlocknativeClient, BlocknativeConfig};
pub use bloxroute::BloxrouteClient;
pub use filter::AllowList;
pub use fullnode::{PendingTxOptions, TxResolver};
