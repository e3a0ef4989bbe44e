//! Full Node Adapter
//!
//! Subscriptions over one alloy WebSocket provider:
//! - pending tx hashes, resolved with bounded retry and allow-list filtered
//! - raw pending tx hashes
//! - new heads (block number + hash)
//!
//! A node often announces a pending hash before `eth_getTransactionByHash`
//! can serve it. Lookups retry with 1ms, 2ms, 4ms... delays and hashes that
//! never resolve are dropped.
//!
//! Created: 2026-02-04

use crate::config::{
    DEFAULT_RESOLVE_ATTEMPTS, DEFAULT_RESOLVE_CONCURRENCY, FULLNODE_SOURCE,
    RECORD_CHANNEL_CAPACITY, RESOLVE_INITIAL_BACKOFF,
};
use crate::lifecycle::Shutdown;
use crate::sources::filter::AllowList;
use crate::types::{BlockHead, HashRecord, NodeTx, TxRecord};
use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Connect a WebSocket provider.
pub async fn connect(url: &str) -> Result<DynProvider> {
    let ws = WsConnect::new(url);
    let provider = ProviderBuilder::new()
        .connect_ws(ws)
        .await
        .context("Full node WS connect failed")?;
    let shown: String = url.chars().take(50).collect();
    info!("Full node: connected to {}", shown);
    Ok(provider.erased())
}

/// Transaction lookup by hash. `Ok(None)` means "not queryable yet".
#[async_trait]
pub trait TxResolver: Send + Sync {
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<NodeTx>>;
}

#[async_trait]
impl TxResolver for DynProvider {
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<NodeTx>> {
        let tx = self.get_transaction_by_hash(hash).await?;
        Ok(tx.map(|tx| NodeTx::from_rpc(&tx, FULLNODE_SOURCE)))
    }
}

/// Resolve a hash, retrying only while the node answers "not found".
/// Any error (typically a syncing node) ends the attempt.
pub async fn resolve_with_retry<R: TxResolver + ?Sized>(
    resolver: &R,
    hash: B256,
    attempts: u32,
) -> Option<NodeTx> {
    let mut delay = RESOLVE_INITIAL_BACKOFF;
    for attempt in 1..=attempts {
        match resolver.transaction_by_hash(hash).await {
            Ok(Some(tx)) => return Some(tx),
            Ok(None) => {}
            Err(e) => {
                debug!("Resolve {} failed: {}", hash, e);
                return None;
            }
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
    debug!("Resolve {} gave up after {} attempts", hash, attempts);
    None
}

#[derive(Debug, Clone)]
pub struct PendingTxOptions {
    pub allow_list: AllowList,
    /// Lookups per hash
    pub attempts: u32,
    /// Hashes resolved at once
    pub concurrency: usize,
}

impl Default for PendingTxOptions {
    fn default() -> Self {
        Self {
            allow_list: AllowList::default(),
            attempts: DEFAULT_RESOLVE_ATTEMPTS,
            concurrency: DEFAULT_RESOLVE_CONCURRENCY,
        }
    }
}

/// Resolve every hash of `hashes` with up to `concurrency` lookups in flight.
/// Only still-pending, admitted transactions reach `out`. Order is best-effort.
///
/// Shutdown drops every in-flight lookup, backoff sleeps included.
pub async fn resolve_pending<R, S>(
    resolver: &R,
    hashes: S,
    options: &PendingTxOptions,
    out: mpsc::Sender<TxRecord>,
    mut shutdown: Shutdown,
) where
    R: TxResolver + ?Sized,
    S: Stream<Item = B256>,
{
    let work = hashes.for_each_concurrent(options.concurrency.max(1), |hash| {
        let out = out.clone();
        async move {
            let Some(tx) = resolve_with_retry(resolver, hash, options.attempts).await else {
                return;
            };
            if !tx.pending || !options.allow_list.admits(&tx) {
                return;
            }
            let _ = out.send(TxRecord::Node(tx)).await;
        }
    });

    tokio::select! {
        _ = shutdown.wait() => debug!("Pending resolution stopped, in-flight lookups dropped"),
        _ = work => {}
    }
}

/// Pending transactions, resolved and filtered.
pub async fn subscribe_pending_txs(
    provider: DynProvider,
    options: PendingTxOptions,
    shutdown: Shutdown,
) -> Result<mpsc::Receiver<TxRecord>> {
    let sub = provider
        .subscribe_pending_transactions()
        .await
        .context("newPendingTransactions subscription failed")?;
    let sub_id = *sub.local_id();
    info!(
        "Full node: pending tx subscription active ({} attempts, {} in flight)",
        options.attempts, options.concurrency
    );

    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        resolve_pending(&provider, sub.into_stream(), &options, tx, shutdown).await;
        release(&provider, sub_id).await;
    });
    Ok(rx)
}

/// Pending transaction hashes, unresolved.
pub async fn subscribe_pending_tx_hashes(
    provider: DynProvider,
    shutdown: Shutdown,
) -> Result<mpsc::Receiver<HashRecord>> {
    let sub = provider
        .subscribe_pending_transactions()
        .await
        .context("newPendingTransactions subscription failed")?;
    let sub_id = *sub.local_id();
    info!("Full node: pending hash subscription active");

    Ok(forward(provider, sub_id, sub.into_stream(), shutdown, |hash| {
        HashRecord { hash }
    }))
}

/// New block headers.
pub async fn subscribe_new_heads(
    provider: DynProvider,
    shutdown: Shutdown,
) -> Result<mpsc::Receiver<BlockHead>> {
    let sub = provider
        .subscribe_blocks()
        .await
        .context("newHeads subscription failed")?;
    let sub_id = *sub.local_id();
    info!("Full node: newHeads subscription active");

    Ok(forward(provider, sub_id, sub.into_stream(), shutdown, |header| {
        BlockHead {
            number: header.number,
            hash: header.hash,
        }
    }))
}

/// Block hash per new head.
pub async fn subscribe_block_hashes(
    provider: DynProvider,
    shutdown: Shutdown,
) -> Result<mpsc::Receiver<HashRecord>> {
    let mut heads = subscribe_new_heads(provider, shutdown).await?;
    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(head) = heads.recv().await {
            if tx.send(HashRecord { hash: head.hash }).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

fn forward<T, U, S, F>(
    provider: DynProvider,
    sub_id: B256,
    stream: S,
    mut shutdown: Shutdown,
    map: F,
) -> mpsc::Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Stream<Item = T> + Send + 'static,
    F: Fn(T) -> U + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                item = stream.next() => {
                    let Some(item) = item else { break };
                    if tx.send(map(item)).await.is_err() {
                        break;
                    }
                }
            }
        }
        // consumer first, the node may be slow to answer
        drop(tx);
        release(&provider, sub_id).await;
    });
    rx
}

async fn release(provider: &DynProvider, sub_id: B256) {
    if let Err(e) = provider.unsubscribe(sub_id).await {
        debug!("Unsubscribe {} failed: {}", sub_id, e);
    }
}
