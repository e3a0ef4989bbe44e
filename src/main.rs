//! Feed latency benchmark driver
//!
//! One subcommand per benchmark mode. Each mode wires one adapter into the
//! JSONL sink, runs until SIGINT/SIGTERM, broadcasts shutdown and gives the
//! sink a short grace period to drain.
//!
//! Usage:
//!   feed-bench fullnode-tx --fullnode wss://...
//!   feed-bench fullnode-pair-reserve --strategy bulk-on-head
//!   feed-bench bloxroute-block --gateway ws://127.0.0.1:28333/ws --header "..."
//!   feed-bench bloxroute-pair-reserve --cert gw_cert.pem --key gw_key.pem
//!   feed-bench blocknative-tx --apikey ...
//!
//! Created: 2026-02-05

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use feed_bench::config::{
    self, BLOCKNATIVE_NETWORK, BLOCKNATIVE_SYSTEM, BLOCKNATIVE_URL, BLOXROUTE_CERT_FILE,
    BLOXROUTE_CLOUD_URL, BLOXROUTE_KEY_FILE, BULK_READER_ADDRESS, DEFAULT_PAIRS,
    DEFAULT_RESOLVE_ATTEMPTS, DEFAULT_RESOLVE_CONCURRENCY, RECORD_CHANNEL_CAPACITY, SHUTDOWN_GRACE,
};
use feed_bench::lifecycle::{self, shutdown_channel, ShutdownTrigger};
use feed_bench::reserve::{spawn_fatal, ContractReserveSource, PollStrategy, ReservePoller};
use feed_bench::sink;
use feed_bench::sources::{
    bloxroute, fullnode, AllowList, BlocknativeClient, BlocknativeConfig, BloxrouteClient,
    PendingTxOptions,
};
use feed_bench::BlockNumber;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Feed latency benchmark: full node vs relay network vs mempool vendor
#[derive(Parser)]
#[command(name = "feed-bench")]
struct Cli {
    /// Output file (default depends on the mode)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct NodeArgs {
    /// Full node WebSocket URL
    #[arg(long = "fullnode", env = "FULLNODE_URL")]
    url: String,
}

/// Gateway when `--gateway` is set, cloud API otherwise
#[derive(Args)]
struct RelayArgs {
    /// Relay gateway WebSocket URL
    #[arg(long = "gateway", env = "BLOXROUTE_URL")]
    gateway: Option<String>,

    /// Authorization header for the gateway
    #[arg(long = "header", env = "BLOXROUTE_AUTH_HEADER")]
    auth_header: Option<String>,

    /// Cloud API WebSocket URL
    #[arg(long = "cloud", env = "BLOXROUTE_CLOUD_URL", default_value = BLOXROUTE_CLOUD_URL)]
    cloud_url: String,

    /// Client certificate for the cloud API (PEM)
    #[arg(long, env = "BLOXROUTE_CERT_FILE", default_value = BLOXROUTE_CERT_FILE)]
    cert: PathBuf,

    /// Client key for the cloud API (PEM)
    #[arg(long, env = "BLOXROUTE_KEY_FILE", default_value = BLOXROUTE_KEY_FILE)]
    key: PathBuf,
}

impl RelayArgs {
    /// `bloxroute-block.json` via a gateway, `bloxroute-block-cloud.json` via the cloud
    fn output(&self, stem: &str) -> String {
        match self.gateway {
            Some(_) => format!("{}.json", stem),
            None => format!("{}-cloud.json", stem),
        }
    }
}

#[derive(Args)]
struct AllowArgs {
    /// Sender allow-list (comma separated)
    #[arg(long, value_delimiter = ',')]
    from: Vec<Address>,

    /// Recipient allow-list (comma separated)
    #[arg(long, value_delimiter = ',')]
    to: Vec<Address>,
}

#[derive(Subcommand)]
enum Mode {
    /// Pending transactions from the full node, resolved and filtered
    FullnodeTx {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        allow: AllowArgs,
        /// Lookups per pending hash
        #[arg(long, default_value_t = DEFAULT_RESOLVE_ATTEMPTS)]
        attempts: u32,
        /// Hashes resolved at once
        #[arg(long, default_value_t = DEFAULT_RESOLVE_CONCURRENCY)]
        concurrency: usize,
    },
    /// Pending transaction hashes from the full node
    FullnodeTxHash {
        #[command(flatten)]
        node: NodeArgs,
    },
    /// Block hashes from the full node's newHeads
    FullnodeBlock {
        #[command(flatten)]
        node: NodeArgs,
    },
    /// Pool reserves polled from the full node
    FullnodePairReserve {
        #[command(flatten)]
        node: NodeArgs,
        #[arg(long, value_enum, default_value_t = PollStrategy::PerPool)]
        strategy: PollStrategy,
        /// Pools to watch (comma separated)
        #[arg(long, value_delimiter = ',')]
        pairs: Vec<Address>,
        /// Batch reader contract
        #[arg(long, default_value_t = BULK_READER_ADDRESS)]
        bulk_reader: Address,
    },
    /// Block hashes from the relay's bdnBlocks stream
    BloxrouteBlock {
        #[command(flatten)]
        relay: RelayArgs,
    },
    /// Pending transaction hashes from the relay's newTxs stream
    BloxrouteTx {
        #[command(flatten)]
        relay: RelayArgs,
    },
    /// Pool reserves evaluated by the relay on every block
    BloxroutePairReserve {
        #[command(flatten)]
        relay: RelayArgs,
        /// Pools to watch (comma separated)
        #[arg(long, value_delimiter = ',')]
        pairs: Vec<Address>,
    },
    /// Pending transactions from the mempool vendor
    BlocknativeTx {
        /// Vendor API key
        #[arg(long = "apikey", env = "BLOCKNATIVE_API_KEY")]
        api_key: String,
        #[arg(long, env = "BLOCKNATIVE_URL", default_value = BLOCKNATIVE_URL)]
        url: String,
        #[arg(long, default_value = BLOCKNATIVE_NETWORK)]
        network: String,
        #[command(flatten)]
        allow: AllowArgs,
    },
}

impl Mode {
    fn default_output(&self) -> String {
        match self {
            Mode::FullnodeTx { .. } => "fullnode-tx.json".to_string(),
            Mode::FullnodeTxHash { .. } => "fullnode-tx-hash.json".to_string(),
            Mode::FullnodeBlock { .. } => "fullnode-block.json".to_string(),
            Mode::FullnodePairReserve { strategy, .. } => strategy.default_output().to_string(),
            Mode::BloxrouteBlock { relay } => relay.output("bloxroute-block"),
            Mode::BloxrouteTx { relay } => relay.output("bloxroute-tx"),
            Mode::BloxroutePairReserve { relay, .. } => relay.output("bloxroute-pair-reserve"),
            Mode::BlocknativeTx { .. } => "blocknative-tx.json".to_string(),
        }
    }
}

fn pairs_or_default(pairs: Vec<Address>) -> Vec<Address> {
    if pairs.is_empty() {
        DEFAULT_PAIRS.to_vec()
    } else {
        pairs
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(cli.mode.default_output()));

    info!("===========================================");
    info!("   Feed Latency Benchmark");
    info!("===========================================");

    let (trigger, shutdown) = shutdown_channel();

    match cli.mode {
        Mode::FullnodeTx {
            node,
            allow,
            attempts,
            concurrency,
        } => {
            let provider = fullnode::connect(&node.url).await?;
            let options = PendingTxOptions {
                allow_list: AllowList::new(allow.from, allow.to),
                attempts,
                concurrency,
            };
            let rx = fullnode::subscribe_pending_txs(provider, options, shutdown).await?;
            drive(rx, &output, trigger, lifecycle::wait_for_signal()).await
        }
        Mode::FullnodeTxHash { node } => {
            let provider = fullnode::connect(&node.url).await?;
            let rx = fullnode::subscribe_pending_tx_hashes(provider, shutdown).await?;
            drive(rx, &output, trigger, lifecycle::wait_for_signal()).await
        }
        Mode::FullnodeBlock { node } => {
            let provider = fullnode::connect(&node.url).await?;
            let rx = fullnode::subscribe_block_hashes(provider, shutdown).await?;
            drive(rx, &output, trigger, lifecycle::wait_for_signal()).await
        }
        Mode::FullnodePairReserve {
            node,
            strategy,
            pairs,
            bulk_reader,
        } => {
            let pairs = pairs_or_default(pairs);
            let provider = fullnode::connect(&node.url).await?;
            let block_number = BlockNumber::on_fullnode(provider.clone(), shutdown.clone()).await?;

            let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
            let source = ContractReserveSource::new(provider.clone(), bulk_reader);
            let poller = ReservePoller::new(source, pairs, block_number, tx);
            match strategy {
                PollStrategy::PerPool => spawn_fatal(poller.run_per_pool(shutdown)),
                PollStrategy::Bulk => spawn_fatal(poller.run_bulk(shutdown)),
                PollStrategy::BulkOnHead => {
                    let heads = fullnode::subscribe_new_heads(provider, shutdown.clone()).await?;
                    spawn_fatal(poller.run_bulk_on_heads(heads, shutdown))
                }
            };
            drive(rx, &output, trigger, lifecycle::wait_for_signal()).await
        }
        Mode::BloxrouteBlock { relay } => {
            let client = connect_relay(&relay).await?;
            let rx = bloxroute::subscribe_bdn_blocks(client.clone(), shutdown).await?;
            let result = drive(rx, &output, trigger, lifecycle::wait_for_signal()).await;
            client.close().await;
            result
        }
        Mode::BloxrouteTx { relay } => {
            let client = connect_relay(&relay).await?;
            let rx = bloxroute::subscribe_new_txs(client.clone(), shutdown).await?;
            let result = drive(rx, &output, trigger, lifecycle::wait_for_signal()).await;
            client.close().await;
            result
        }
        Mode::BloxroutePairReserve { relay, pairs } => {
            let pairs = pairs_or_default(pairs);
            let client = connect_relay(&relay).await?;
            // every response carries its own block height, no tracker needed
            let rx = bloxroute::subscribe_pair_reserves(client.clone(), &pairs, shutdown).await?;
            let result = drive(rx, &output, trigger, lifecycle::wait_for_signal()).await;
            client.close().await;
            result
        }
        Mode::BlocknativeTx {
            api_key,
            url,
            network,
            allow,
        } => {
            let config = BlocknativeConfig {
                url,
                api_key,
                system: BLOCKNATIVE_SYSTEM.to_string(),
                network,
                from_allow: allow.from.into_iter().collect(),
                to_allow: allow.to.into_iter().collect(),
            };
            let client = BlocknativeClient::connect(config).await?;
            let rx = client.subscribe(shutdown).await?;
            drive(rx, &output, trigger, lifecycle::wait_for_signal()).await
        }
    }
}

async fn connect_relay(relay: &RelayArgs) -> Result<Arc<BloxrouteClient>> {
    let client = match &relay.gateway {
        Some(url) => {
            let Some(header) = relay.auth_header.as_deref() else {
                bail!("--header must be present if --gateway is present");
            };
            BloxrouteClient::connect(url, Some(header)).await?
        }
        None => {
            info!("No gateway given, connecting to the relay cloud API");
            BloxrouteClient::connect_with_cert(&relay.cloud_url, &relay.cert, &relay.key).await?
        }
    };
    Ok(Arc::new(client))
}

/// Record `rx` until `stop` resolves or upstream closes.
async fn drive<T, F>(
    rx: mpsc::Receiver<T>,
    output: &Path,
    trigger: ShutdownTrigger,
    stop: F,
) -> Result<()>
where
    T: Serialize + Send + 'static,
    F: Future<Output = Result<()>>,
{
    let path = output.to_path_buf();
    let mut recorder = tokio::spawn(async move { sink::run(ReceiverStream::new(rx), path).await });

    tokio::select! {
        signal = stop => signal?,
        finished = &mut recorder => {
            warn!("Upstream closed, output drained");
            finished.context("Sink task panicked")??;
            return Ok(());
        }
    }

    trigger.trigger();
    match tokio::time::timeout(SHUTDOWN_GRACE, recorder).await {
        Ok(joined) => {
            let stats = joined.context("Sink task panicked")??;
            info!("Shutdown complete: {} records", stats.records);
        }
        Err(_) => warn!("Sink still busy after {:?}, exiting", SHUTDOWN_GRACE),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use feed_bench::types::HashRecord;
    use std::fs;
    use std::time::{Duration, Instant};

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("feed_bench_driver_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    async fn after(delay: Duration) -> Result<()> {
        tokio::time::sleep(delay).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_drains_to_clean_file() {
        let path = temp_file("drain.json");
        let (trigger, mut shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);

        // emits until told to stop, like every adapter
        let producer = tokio::spawn(async move {
            let mut sent = 0u64;
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(Duration::from_millis(1)) => {
                        let hash = B256::left_padding_from(&sent.to_be_bytes());
                        if tx.send(HashRecord { hash }).await.is_err() {
                            break;
                        }
                        sent += 1;
                    }
                }
            }
            sent
        });

        let started = Instant::now();
        drive(rx, &path, trigger, after(Duration::from_millis(100))).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100) + SHUTDOWN_GRACE);

        let sent = producer.await.unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(sent > 0);
        assert!(content.ends_with('\n'), "no partial trailing line");
        for line in content.lines() {
            let v: serde_json::Value = serde_json::from_str(line).expect("each line is valid JSON");
            assert!(v["received_at"].is_i64());
        }
        assert_eq!(content.lines().count() as u64, sent, "everything sent was recorded");

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_stuck_producer_bounded_by_grace() {
        let path = temp_file("stuck.json");
        let (trigger, _shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel::<HashRecord>(4);

        let started = Instant::now();
        drive(rx, &path, trigger, after(Duration::from_millis(20))).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= SHUTDOWN_GRACE, "waited for the sink");
        assert!(elapsed < SHUTDOWN_GRACE + Duration::from_millis(500), "took {:?}", elapsed);

        drop(tx);
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_upstream_end_finishes_without_signal() {
        let path = temp_file("upstream_end.json");
        let (trigger, _shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(4);
        tx.send(HashRecord { hash: B256::ZERO }).await.unwrap();
        drop(tx);

        drive(rx, &path, trigger, std::future::pending::<Result<()>>()).await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_relay_output_names() {
        let cli = Cli::parse_from(["feed-bench", "bloxroute-block"]);
        assert_eq!(cli.mode.default_output(), "bloxroute-block-cloud.json");

        let cli = Cli::parse_from([
            "feed-bench",
            "bloxroute-pair-reserve",
            "--gateway",
            "ws://127.0.0.1:28333/ws",
            "--header",
            "secret",
        ]);
        assert_eq!(cli.mode.default_output(), "bloxroute-pair-reserve.json");
    }
}
