//! Core record types
//!
//! Every adapter normalizes its upstream payload into one of these before it
//! reaches the sink. All records are immutable once built.
//!
//! Created: 2026-02-03

use crate::codec;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Source tag for vendor-sourced transactions
pub const VENDOR_SOURCE: &str = "blocknative";

/// Transaction observed on a full node, resolved from its pending hash.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTx {
    pub hash: B256,
    pub input: Bytes,
    pub gas: u64,
    pub gas_price: U256,
    pub value: U256,
    pub nonce: u64,
    pub to: Option<Address>,
    /// Sender as recovered by the node; None when unknown
    pub from: Option<Address>,
    /// Still in the mempool when resolved
    pub pending: bool,
    pub source: String,
}

impl NodeTx {
    /// Normalize an RPC transaction.
    pub fn from_rpc(tx: &alloy::rpc::types::Transaction, source: &str) -> Self {
        use alloy::consensus::Transaction as _;

        let envelope = tx.inner.inner();
        let gas_price = tx.gas_price().unwrap_or_else(|| tx.max_fee_per_gas());

        Self {
            hash: *envelope.tx_hash(),
            input: tx.input().clone(),
            gas: tx.gas_limit(),
            gas_price: U256::from(gas_price),
            value: tx.value(),
            nonce: tx.nonce(),
            to: tx.to(),
            from: Some(tx.inner.signer()),
            pending: tx.block_number.is_none(),
            source: source.to_string(),
        }
    }

    /// Contract interaction: has a recipient and non-empty call data
    pub fn interacts_with_contract(&self) -> bool {
        self.to.is_some() && !self.input.is_empty()
    }
}

/// Transaction reported by the mempool vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorTx {
    pub hash: B256,
    pub input: Bytes,
    pub gas: u64,
    pub gas_price: U256,
    pub value: U256,
    pub nonce: u64,
    pub to: Option<Address>,
    pub from: Option<Address>,
    /// Vendor-side first-seen time, kept verbatim
    pub pending_time_stamp: Option<String>,
}

/// A pending transaction from either transaction source.
#[derive(Debug, Clone, PartialEq)]
pub enum TxRecord {
    Node(NodeTx),
    Vendor(VendorTx),
}

impl TxRecord {
    pub fn data(&self) -> &Bytes {
        match self {
            TxRecord::Node(tx) => &tx.input,
            TxRecord::Vendor(tx) => &tx.input,
        }
    }

    pub fn gas(&self) -> u64 {
        match self {
            TxRecord::Node(tx) => tx.gas,
            TxRecord::Vendor(tx) => tx.gas,
        }
    }

    pub fn gas_price(&self) -> U256 {
        match self {
            TxRecord::Node(tx) => tx.gas_price,
            TxRecord::Vendor(tx) => tx.gas_price,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            TxRecord::Node(tx) => tx.value,
            TxRecord::Vendor(tx) => tx.value,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            TxRecord::Node(tx) => tx.nonce,
            TxRecord::Vendor(tx) => tx.nonce,
        }
    }

    pub fn to(&self) -> Option<Address> {
        match self {
            TxRecord::Node(tx) => tx.to,
            TxRecord::Vendor(tx) => tx.to,
        }
    }

    pub fn from(&self) -> Option<Address> {
        match self {
            TxRecord::Node(tx) => tx.from,
            TxRecord::Vendor(tx) => tx.from,
        }
    }

    pub fn hash(&self) -> B256 {
        match self {
            TxRecord::Node(tx) => tx.hash,
            TxRecord::Vendor(tx) => tx.hash,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            TxRecord::Node(tx) => &tx.source,
            TxRecord::Vendor(_) => VENDOR_SOURCE,
        }
    }
}

/// Flat line layout shared by both variants
#[derive(Serialize)]
struct TxLine<'a> {
    hash: B256,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Address>,
    to: Option<Address>,
    nonce: u64,
    gas: u64,
    #[serde(with = "codec::hex")]
    gas_price: U256,
    #[serde(with = "codec::hex")]
    value: U256,
    input: &'a Bytes,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_time_stamp: Option<&'a str>,
}

impl Serialize for TxRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pending_time_stamp = match self {
            TxRecord::Vendor(tx) => tx.pending_time_stamp.as_deref(),
            TxRecord::Node(_) => None,
        };
        TxLine {
            hash: self.hash(),
            from: self.from(),
            to: self.to(),
            nonce: self.nonce(),
            gas: self.gas(),
            gas_price: self.gas_price(),
            value: self.value(),
            input: self.data(),
            source: self.source(),
            pending_time_stamp,
        }
        .serialize(serializer)
    }
}

/// Raw `(reserve0, reserve1, blockTimestampLast)` as read from a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveTuple {
    pub reserve0: U256,
    pub reserve1: U256,
    pub block_timestamp_last: u32,
}

/// Reserve snapshot of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReserve {
    pub pair: Address,
    #[serde(with = "codec::hex")]
    pub reserve0: U256,
    #[serde(with = "codec::hex")]
    pub reserve1: U256,
    pub block_timestamp_last: u32,
    pub block_number: i64,
}

impl PairReserve {
    pub fn new(pair: Address, reserves: ReserveTuple, block_number: i64) -> Self {
        Self {
            pair,
            reserve0: reserves.reserve0,
            reserve1: reserves.reserve1,
            block_timestamp_last: reserves.block_timestamp_last,
            block_number,
        }
    }

    /// Dedup fingerprint. Not an identity key: collisions are tolerated.
    ///
    /// keccak256 over pair bytes, minimal big-endian reserves, then the
    /// little-endian timestamp and block number. Low 8 bytes of the digest.
    pub fn fingerprint(&self) -> u64 {
        let mut buf = Vec::with_capacity(20 + 64 + 4 + 8);
        buf.extend_from_slice(self.pair.as_slice());
        buf.extend_from_slice(&self.reserve0.to_be_bytes_trimmed_vec());
        buf.extend_from_slice(&self.reserve1.to_be_bytes_trimmed_vec());
        buf.extend_from_slice(&self.block_timestamp_last.to_le_bytes());
        buf.extend_from_slice(&(self.block_number as u64).to_le_bytes());

        let digest = keccak256(&buf);
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest[24..32]);
        u64::from_be_bytes(low)
    }
}

/// `{"hash": ...}` line for hash-only feeds (pending tx hashes, block hashes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub hash: B256,
}

/// Minimal new-head notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHead {
    pub number: u64,
    pub hash: B256,
}
