//! Configuration
//! Constants shared by every benchmark mode, plus .env loading.
//! Endpoint URLs and credentials come from CLI flags or the environment (see main.rs).

use alloy::primitives::{address, Address};
use std::time::Duration;

/// Load `.env` if present. Missing file is not an error.
pub fn load_env() {
    dotenv::dotenv().ok();
}

// ── Chain / contracts (BSC mainnet) ──────────────────────────────

/// Pools watched when no `--pairs` list is given
pub const DEFAULT_PAIRS: [Address; 5] = [
    address!("58f876857a02d6762e0101bb5c46a8c1ed44dc16"), // WBNB/BUSD
    address!("7efaef62fddcca950418312c6c91aef321375a00"), // USDT/BUSD
    address!("0ed7e52944161450477ee417de9cd3a859b14fd0"), // CAKE/WBNB
    address!("16b9a82891338f9ba80e2d6970fdda79d1eb0dae"), // USDT/WBNB
    address!("2354ef4df11afacb85a5c7f98b624072eccddbb1"), // USDC/BUSD
];

/// Batch reserve reader contract
pub const BULK_READER_ADDRESS: Address = address!("45974B68d81Be55E71F7ACD5c1378a9d52CF02Be");

/// PancakeSwap V2 router
pub const PANCAKE_ROUTER_V2: Address = address!("10ED43C718714eb63d5aA57B78B54704E256024E");

/// Router methods that add liquidity
pub const LIQUIDITY_METHODS: [&str; 2] = ["addLiquidityETH", "addLiquidity"];

/// `getReserves()` selector
pub const GET_RESERVES_SELECTOR: &str = "0x0902f1ac";

// ── Full node ────────────────────────────────────────────────────

/// Lookups per pending hash before it is dropped (1ms, 2ms, ... ~1s total)
pub const DEFAULT_RESOLVE_ATTEMPTS: u32 = 11;

/// In-flight hash resolutions
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 256;

/// First retry delay; doubles per attempt
pub const RESOLVE_INITIAL_BACKOFF: Duration = Duration::from_millis(1);

pub const FULLNODE_SOURCE: &str = "fullnode";

// ── Relay network ────────────────────────────────────────────────

pub const RELAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const RELAY_SUBSCRIPTION_BUFFER: usize = 4096;

/// Relay cloud API for BSC mainnet, used when no gateway is given
pub const BLOXROUTE_CLOUD_URL: &str = "wss://bsc.api.blxrbdn.com/ws";
pub const BLOXROUTE_CERT_FILE: &str = "external_gateway_cert.pem";
pub const BLOXROUTE_KEY_FILE: &str = "external_gateway_key.pem";

// ── Mempool vendor ───────────────────────────────────────────────

pub const BLOCKNATIVE_URL: &str = "wss://api.blocknative.com/v0";
pub const BLOCKNATIVE_SYSTEM: &str = "ethereum";
/// BSC mainnet network id as the vendor names it
pub const BLOCKNATIVE_NETWORK: &str = "bsc-main";
pub const BLOCKNATIVE_VERSION: &str = "1";

// ── Sink / process ───────────────────────────────────────────────

/// Buffered lines between producers and the writer task
pub const SINK_CHANNEL_CAPACITY: usize = 65_536;
pub const SINK_BUFFER_BYTES: usize = 32 * 1024;
pub const SINK_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Adapter-to-sink channel capacity
pub const RECORD_CHANNEL_CAPACITY: usize = 4096;

/// Time allowed for in-flight writes after shutdown is broadcast
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pairs_distinct() {
        let mut pairs = DEFAULT_PAIRS.to_vec();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), DEFAULT_PAIRS.len(), "duplicate default pair");
        assert!(!pairs.contains(&BULK_READER_ADDRESS));
    }
}
