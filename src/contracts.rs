//! Contract Definitions
//!
//! Solidity interfaces for the reserve reads, defined using alloy's `sol!` macro.
//! `#[sol(rpc)]` generates instance types that call through any alloy Provider.
//!
//! Created: 2026-02-04

use alloy::sol;

// ── Uniswap V2 pair ──────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
}

// ── Batch reader ─────────────────────────────────────────────────────

sol! {
    /// Returns `[reserve0, reserve1, blockTimestampLast]` per pair, in input order
    #[sol(rpc)]
    interface IBulkReader {
        function getReservesForBenchmark(address[] calldata _pairs) external view returns (uint256[3][] memory);
    }
}
