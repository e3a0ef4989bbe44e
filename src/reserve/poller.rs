//! Poll loops for the three strategies
//!
//! Unthrottled loops yield to the scheduler once per iteration and check for
//! shutdown before each read.
//!
//! Created: 2026-02-05

use crate::block_number::BlockNumber;
use crate::dedup::DedupLedger;
use crate::lifecycle::Shutdown;
use crate::reserve::{PollError, ReserveSource};
use crate::types::{BlockHead, PairReserve, ReserveTuple};
use alloy::primitives::Address;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct ReservePoller<S> {
    source: S,
    pairs: Vec<Address>,
    block_number: BlockNumber,
    ledger: DedupLedger,
    out: mpsc::Sender<PairReserve>,
    emitted: u64,
}

impl<S: ReserveSource> ReservePoller<S> {
    pub fn new(
        source: S,
        pairs: Vec<Address>,
        block_number: BlockNumber,
        out: mpsc::Sender<PairReserve>,
    ) -> Self {
        Self {
            source,
            pairs,
            block_number,
            ledger: DedupLedger::new(),
            out,
            emitted: 0,
        }
    }

    /// Emit unless already seen. False once the consumer is gone.
    async fn emit(&mut self, pair: Address, reserves: ReserveTuple) -> bool {
        let snapshot = PairReserve::new(pair, reserves, self.block_number.get() as i64);
        if !self.ledger.first_sighting(snapshot.fingerprint()) {
            return true;
        }
        self.emitted += 1;
        self.out.send(snapshot).await.is_ok()
    }

    async fn emit_all(&mut self, tuples: Vec<ReserveTuple>) -> Result<bool, PollError> {
        if tuples.len() != self.pairs.len() {
            return Err(PollError::LengthMismatch {
                expected: self.pairs.len(),
                got: tuples.len(),
            });
        }
        for (i, reserves) in tuples.into_iter().enumerate() {
            let pair = self.pairs[i];
            if !self.emit(pair, reserves).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn read_bulk(&self) -> Result<Vec<ReserveTuple>, PollError> {
        self.source
            .reserves_bulk(&self.pairs)
            .await
            .map_err(|e| PollError::BulkRead(format!("{:#}", e)))
    }

    fn finish(&self, strategy: &str) {
        info!(
            "Reserve poller ({}) stopped: {} snapshots, {} distinct",
            strategy,
            self.emitted,
            self.ledger.len()
        );
    }

    /// One read per pool, back to back.
    pub async fn run_per_pool(mut self, mut shutdown: Shutdown) -> Result<(), PollError> {
        info!("Polling getReserves() of {} pools", self.pairs.len());
        'poll: loop {
            for i in 0..self.pairs.len() {
                if shutdown.is_triggered() {
                    break 'poll;
                }
                let pair = self.pairs[i];
                let read = tokio::select! {
                    _ = shutdown.wait() => break 'poll,
                    read = self.source.reserves(pair) => read,
                };
                let reserves = read.map_err(|e| PollError::Read {
                    pair,
                    reason: format!("{:#}", e),
                })?;
                if !self.emit(pair, reserves).await {
                    break 'poll;
                }
            }
            tokio::task::yield_now().await;
        }
        self.finish("per-pool");
        Ok(())
    }

    /// One batch read per iteration, back to back.
    pub async fn run_bulk(mut self, mut shutdown: Shutdown) -> Result<(), PollError> {
        info!("Polling bulk reserves of {} pools", self.pairs.len());
        loop {
            if shutdown.is_triggered() {
                break;
            }
            let tuples = tokio::select! {
                _ = shutdown.wait() => break,
                tuples = self.read_bulk() => tuples?,
            };
            if !self.emit_all(tuples).await? {
                break;
            }
            tokio::task::yield_now().await;
        }
        self.finish("bulk");
        Ok(())
    }

    /// One batch read per new head.
    pub async fn run_bulk_on_heads(
        mut self,
        mut heads: mpsc::Receiver<BlockHead>,
        mut shutdown: Shutdown,
    ) -> Result<(), PollError> {
        info!("Polling bulk reserves of {} pools on new heads", self.pairs.len());
        loop {
            let head = tokio::select! {
                _ = shutdown.wait() => break,
                head = heads.recv() => head,
            };
            let Some(head) = head else {
                debug!("Head stream ended");
                break;
            };
            debug!("Head {} -> bulk read", head.number);

            let tuples = self.read_bulk().await?;
            if !self.emit_all(tuples).await? {
                break;
            }
        }
        self.finish("bulk-on-head");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{shutdown_channel, ShutdownTrigger};
    use alloy::primitives::{B256, U256};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tuple(r0: u64) -> ReserveTuple {
        ReserveTuple {
            reserve0: U256::from(r0),
            reserve1: U256::from(2_000u64),
            block_timestamp_last: 1648442477,
        }
    }

    /// Serves a fixed snapshot and pulls the trigger after `stop_after` reads.
    /// From read `change_at` on, reserve0 is bumped.
    struct CannedSource {
        calls: AtomicU32,
        stop_after: u32,
        change_at: Option<u32>,
        trigger: ShutdownTrigger,
        fail: bool,
        short: bool,
    }

    impl CannedSource {
        fn new(stop_after: u32, trigger: ShutdownTrigger) -> Self {
            Self {
                calls: AtomicU32::new(0),
                stop_after,
                change_at: None,
                trigger,
                fail: false,
                short: false,
            }
        }

        fn next(&self) -> ReserveTuple {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.stop_after {
                self.trigger.trigger();
            }
            match self.change_at {
                Some(at) if n >= at => tuple(1_001),
                _ => tuple(1_000),
            }
        }
    }

    #[async_trait]
    impl ReserveSource for CannedSource {
        async fn reserves(&self, _pair: Address) -> Result<ReserveTuple> {
            if self.fail {
                return Err(anyhow!("execution reverted"));
            }
            Ok(self.next())
        }

        async fn reserves_bulk(&self, pairs: &[Address]) -> Result<Vec<ReserveTuple>> {
            if self.fail {
                return Err(anyhow!("execution reverted"));
            }
            let t = self.next();
            let n = if self.short { pairs.len() - 1 } else { pairs.len() };
            Ok(vec![t; n])
        }
    }

    async fn collect(mut rx: mpsc::Receiver<PairReserve>) -> Vec<PairReserve> {
        let mut got = Vec::new();
        while let Some(r) = rx.recv().await {
            got.push(r);
        }
        got
    }

    fn pairs(n: u8) -> Vec<Address> {
        (1..=n).map(Address::repeat_byte).collect()
    }

    #[tokio::test]
    async fn test_same_snapshot_emitted_once() {
        let (trigger, shutdown) = shutdown_channel();
        let source = CannedSource::new(50, trigger);
        let (tx, rx) = mpsc::channel(64);

        let poller = ReservePoller::new(source, pairs(1), BlockNumber::fixed(16448132), tx);
        poller.run_per_pool(shutdown).await.unwrap();

        let got = collect(rx).await;
        assert_eq!(got.len(), 1, "50 identical reads, one record");
        assert_eq!(got[0].block_number, 16448132);
        assert_eq!(got[0].reserve0, U256::from(1_000u64));
    }

    #[tokio::test]
    async fn test_changed_snapshot_emitted_again() {
        let (trigger, shutdown) = shutdown_channel();
        let mut source = CannedSource::new(20, trigger);
        source.change_at = Some(10);
        let (tx, rx) = mpsc::channel(64);

        let poller = ReservePoller::new(source, pairs(1), BlockNumber::fixed(1), tx);
        poller.run_per_pool(shutdown).await.unwrap();

        let got = collect(rx).await;
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].reserve0, U256::from(1_001u64));
    }

    #[tokio::test]
    async fn test_bulk_emits_in_pair_order() {
        let (trigger, shutdown) = shutdown_channel();
        let source = CannedSource::new(5, trigger);
        let (tx, rx) = mpsc::channel(64);

        let poller = ReservePoller::new(source, pairs(3), BlockNumber::fixed(1), tx);
        poller.run_bulk(shutdown).await.unwrap();

        let got: Vec<Address> = collect(rx).await.into_iter().map(|r| r.pair).collect();
        assert_eq!(got, pairs(3), "one record per pair, iteration order");
    }

    #[tokio::test]
    async fn test_read_error_is_returned() {
        let (trigger, shutdown) = shutdown_channel();
        let mut source = CannedSource::new(u32::MAX, trigger);
        source.fail = true;
        let (tx, _rx) = mpsc::channel(64);

        let poller = ReservePoller::new(source, pairs(2), BlockNumber::fixed(1), tx);
        let err = poller.run_per_pool(shutdown).await.unwrap_err();
        assert!(matches!(err, PollError::Read { pair, .. } if pair == Address::repeat_byte(1)));
    }

    #[tokio::test]
    async fn test_bulk_length_mismatch() {
        let (trigger, shutdown) = shutdown_channel();
        let mut source = CannedSource::new(u32::MAX, trigger);
        source.short = true;
        let (tx, _rx) = mpsc::channel(64);

        let poller = ReservePoller::new(source, pairs(3), BlockNumber::fixed(1), tx);
        let err = poller.run_bulk(shutdown).await.unwrap_err();
        assert_eq!(err, PollError::LengthMismatch { expected: 3, got: 2 });
    }

    #[tokio::test]
    async fn test_bulk_on_heads_reads_per_head() {
        let (trigger, shutdown) = shutdown_channel();
        let mut source = CannedSource::new(u32::MAX, trigger);
        source.change_at = Some(3);
        let (tx, rx) = mpsc::channel(64);
        let (head_tx, head_rx) = mpsc::channel(8);

        for n in 0..4u64 {
            head_tx.send(BlockHead { number: n, hash: B256::ZERO }).await.unwrap();
        }
        drop(head_tx);

        let poller = ReservePoller::new(source, pairs(2), BlockNumber::fixed(1), tx);
        poller.run_bulk_on_heads(head_rx, shutdown).await.unwrap();

        let got = collect(rx).await;
        // heads 1-2 unchanged, heads 3-4 changed once
        assert_eq!(got.len(), 4);
    }
}
