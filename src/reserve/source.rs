//! On-chain reserve reads through alloy contract bindings

use crate::contracts::{IBulkReader, IUniswapV2Pair};
use crate::reserve::ReserveSource;
use crate::types::ReserveTuple;
use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;

pub struct ContractReserveSource {
    provider: DynProvider,
    bulk_reader: Address,
}

impl ContractReserveSource {
    pub fn new(provider: DynProvider, bulk_reader: Address) -> Self {
        Self {
            provider,
            bulk_reader,
        }
    }
}

/// `[reserve0, reserve1, blockTimestampLast]` row from the batch reader.
/// The timestamp is truncated to its low 32 bits.
fn tuple_from_row(row: &[U256; 3]) -> ReserveTuple {
    ReserveTuple {
        reserve0: row[0],
        reserve1: row[1],
        block_timestamp_last: row[2].as_limbs()[0] as u32,
    }
}

#[async_trait]
impl ReserveSource for ContractReserveSource {
    async fn reserves(&self, pair: Address) -> Result<ReserveTuple> {
        let contract = IUniswapV2Pair::new(pair, self.provider.clone());
        let ret = contract
            .getReserves()
            .call()
            .await
            .with_context(|| format!("getReserves() on {:?}", pair))?;

        Ok(ReserveTuple {
            reserve0: U256::from(ret.reserve0),
            reserve1: U256::from(ret.reserve1),
            block_timestamp_last: ret.blockTimestampLast,
        })
    }

    async fn reserves_bulk(&self, pairs: &[Address]) -> Result<Vec<ReserveTuple>> {
        let reader = IBulkReader::new(self.bulk_reader, self.provider.clone());
        let rows = reader
            .getReservesForBenchmark(pairs.to_vec())
            .call()
            .await
            .with_context(|| format!("getReservesForBenchmark() for {} pairs", pairs.len()))?;

        Ok(rows.iter().map(tuple_from_row).collect())
    }
}
