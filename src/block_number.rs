//! Block-Height Tracker
//!
//! Latest chain height as a watch cell. One background updater writes it,
//! any number of readers copy it out with `get()` and never touch upstream.
//!
//! Sources:
//! - full node: newHeads subscription, seeded with `eth_blockNumber`
//! - relay: `ethOnBlock` stream with an `eth_blockNumber` call named `block_number`
//!
//! After shutdown the updater is gone and `get()` keeps returning the last value.
//!
//! Created: 2026-02-04

use crate::lifecycle::Shutdown;
use crate::sources::bloxroute::{self, BloxrouteClient, EthOnBlockResponse};
use alloy::providers::{DynProvider, Provider};
use anyhow::{anyhow, Context, Result};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// ethOnBlock call name carrying the height
pub const BLOCK_NUMBER_CALL: &str = "block_number";

#[derive(Debug, Clone)]
pub struct BlockNumber {
    rx: watch::Receiver<u64>,
}

impl BlockNumber {
    /// Current height, no network IO.
    pub fn get(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Constant height, for tests and offline use
    pub fn fixed(number: u64) -> Self {
        let (_tx, rx) = watch::channel(number);
        Self { rx }
    }

    /// Track a stream of heights.
    ///
    /// With `initial = None` this waits for the first item before returning.
    /// `release` runs once the updater stops (shutdown or stream end).
    pub async fn from_updates<S, R>(
        initial: Option<u64>,
        updates: S,
        release: R,
        mut shutdown: Shutdown,
    ) -> Result<Self>
    where
        S: Stream<Item = u64> + Send + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let mut updates = Box::pin(updates);
        let first = match initial {
            Some(n) => n,
            None => updates
                .next()
                .await
                .ok_or_else(|| anyhow!("Block height stream ended before first value"))?,
        };

        let (tx, rx) = watch::channel(first);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    next = updates.next() => match next {
                        Some(n) => {
                            tx.send_replace(n);
                        }
                        None => {
                            warn!("Block height stream ended at {}", *tx.borrow());
                            break;
                        }
                    },
                }
            }
            release.await;
            debug!("Block height updater stopped");
        });

        Ok(Self { rx })
    }

    /// Height from a full node's newHeads.
    pub async fn on_fullnode(provider: DynProvider, shutdown: Shutdown) -> Result<Self> {
        // subscribe before the initial query: no head may fall in between
        let sub = provider
            .subscribe_blocks()
            .await
            .context("newHeads subscription failed")?;
        let sub_id = *sub.local_id();
        let initial = provider
            .get_block_number()
            .await
            .context("eth_blockNumber failed")?;
        info!("Block height: {} (full node)", initial);

        let updates = sub.into_stream().map(|header| header.number);
        let release = async move {
            if let Err(e) = provider.unsubscribe(sub_id).await {
                debug!("Unsubscribe {} failed: {}", sub_id, e);
            }
        };
        Self::from_updates(Some(initial), updates, release, shutdown).await
    }

    /// Height from the relay's `ethOnBlock` stream. Waits for the first value.
    pub async fn on_bloxroute(client: Arc<BloxrouteClient>, shutdown: Shutdown) -> Result<Self> {
        let call = json!({"name": BLOCK_NUMBER_CALL, "method": "eth_blockNumber"});
        let sub = bloxroute::subscribe_eth_on_block(&client, vec![call]).await?;
        let sub_id = sub.id.clone();

        let updates = tokio_stream::wrappers::ReceiverStream::new(sub.items)
            .filter_map(|v| async move { height_of(v) });
        let release = async move {
            if let Err(e) = client.unsubscribe(&sub_id).await {
                debug!("Relay unsubscribe {}: {}", sub_id, e);
            }
        };

        let tracker = Self::from_updates(None, updates, release, shutdown).await?;
        info!("Block height: {} (relay)", tracker.get());
        Ok(tracker)
    }
}

fn height_of(value: serde_json::Value) -> Option<u64> {
    let resp: EthOnBlockResponse = serde_json::from_value(value).ok()?;
    if resp.name != BLOCK_NUMBER_CALL {
        return None;
    }
    match crate::codec::parse_quantity(&resp.response).map(u64::try_from) {
        Ok(Ok(n)) => Some(n),
        _ => {
            warn!("Unparsable block number: {}", resp.response);
            None
        }
    }
}
