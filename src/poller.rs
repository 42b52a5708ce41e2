//! Fixed-interval block poller.
//!
//! Heights are processed strictly in ascending order and `last_block_seen`
//! only moves past a height once every intent in it has been recorded. A
//! failed height stops the cycle and is retried first on the next tick.

use crate::classifier::{ActivityIntent, IntentSource, classify, is_candidate, observed_swaps};
use crate::connection::{ConnectError, ConnectionManager};
use crate::price::{PriceSource, estimate_cost_usd};
use crate::recorder::{RecordOutcome, Recorder};
use crate::rpc::{ChainRpc, ChainTransaction};
use crate::watchlist::{WatchSet, WatchSetReceiver};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt, stream};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub poll_interval: Duration,
    /// Decimals assumed when turning a raw amount into a USD cost.
    pub token_decimals: u8,
    /// Transactions fetched concurrently within one block.
    pub fetch_concurrency: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        PollerSettings {
            poll_interval: Duration::from_secs(15),
            token_decimals: 18,
            fetch_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Height query failed; nothing was attempted.
    Unreachable,
    /// First successful cycle, cursor placed just below the head.
    Initialized { last_block_seen: u64 },
    UpToDate { height: u64 },
    Advanced { from: u64, to: u64, recorded: usize },
    /// Stopped at `failed_height`; the cursor stays at `last_block_seen`.
    Stalled {
        failed_height: u64,
        last_block_seen: u64,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeightReport {
    pub transactions: usize,
    pub intents: usize,
    pub recorded: usize,
}

pub struct BlockPoller<R: ChainRpc, P: PriceSource> {
    chain: Arc<ConnectionManager<R>>,
    watch: WatchSetReceiver,
    recorder: Recorder,
    prices: P,
    settings: PollerSettings,
    last_block_seen: Option<u64>,
}

impl<R: ChainRpc, P: PriceSource> BlockPoller<R, P> {
    pub fn new(
        chain: Arc<ConnectionManager<R>>,
        watch: WatchSetReceiver,
        recorder: Recorder,
        prices: P,
        settings: PollerSettings,
    ) -> Self {
        BlockPoller {
            chain,
            watch,
            recorder,
            prices,
            settings,
            last_block_seen: None,
        }
    }

    pub fn last_block_seen(&self) -> Option<u64> {
        self.last_block_seen
    }

    /// Ticks every `poll_interval` until shutdown. A cycle always runs to
    /// completion; ticks that fire while it runs are dropped, not queued.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_cycle().await;
                }
                _ = shutdown.changed() => {
                    info!(last_block_seen = ?self.last_block_seen, "Poller stopped");
                    return;
                }
            }
        }
    }

    pub async fn poll_cycle(&mut self) -> CycleOutcome {
        let height = match self.chain.current_height().await {
            Ok(height) => height,
            Err(ConnectError::NotConnected) => {
                debug!("No active RPC connection, skipping cycle");
                return CycleOutcome::Unreachable;
            }
            Err(e) => {
                warn!(error = %e, "Could not read chain height, skipping cycle");
                return CycleOutcome::Unreachable;
            }
        };

        let Some(last) = self.last_block_seen else {
            let start = height.saturating_sub(1);
            self.last_block_seen = Some(start);
            info!(height, "Tracking from current head");
            return CycleOutcome::Initialized {
                last_block_seen: start,
            };
        };

        if height <= last {
            return CycleOutcome::UpToDate { height };
        }

        // One snapshot for the whole cycle
        let watch = self.watch.borrow().clone();
        let started = Instant::now();
        let mut recorded = 0;

        for block in (last + 1)..=height {
            match self.process_height(block, &watch).await {
                Ok(report) => {
                    recorded += report.recorded;
                    self.last_block_seen = Some(block);
                    debug!(
                        block,
                        transactions = report.transactions,
                        intents = report.intents,
                        recorded = report.recorded,
                        "Block processed"
                    );
                }
                Err(e) => {
                    warn!(
                        block,
                        error = %format!("{e:#}"),
                        "Block failed, will retry next cycle"
                    );
                    return CycleOutcome::Stalled {
                        failed_height: block,
                        last_block_seen: self.last_block_seen.unwrap_or(last),
                    };
                }
            }
        }

        info!(
            from = last + 1,
            to = height,
            recorded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Processed blocks"
        );
        CycleOutcome::Advanced {
            from: last + 1,
            to: height,
            recorded,
        }
    }

    /// Fetches, classifies and records one block. Any fetch or persistence
    /// failure fails the whole height.
    pub async fn process_height(&self, height: u64, watch: &WatchSet) -> Result<HeightReport> {
        let hashes = self
            .chain
            .block_transaction_hashes(height)
            .await
            .with_context(|| format!("Failed to fetch block {height}"))?;

        let transactions: Vec<ChainTransaction> = stream::iter(hashes)
            .map(|hash| self.chain.transaction(hash))
            .buffered(self.settings.fetch_concurrency.max(1))
            .try_collect()
            .await
            .with_context(|| format!("Failed to fetch transactions of block {height}"))?;

        let mut report = HeightReport {
            transactions: transactions.len(),
            ..HeightReport::default()
        };
        let mut prices: HashMap<Address, Option<Decimal>> = HashMap::new();

        for tx in transactions.iter().filter(|tx| is_candidate(tx, watch)) {
            let logs = self
                .chain
                .transaction_logs(tx.hash)
                .await
                .with_context(|| format!("Failed to fetch receipt for {:?}", tx.hash))?;

            for swap in observed_swaps(&logs) {
                debug!(
                    tx = ?tx.hash,
                    pair = ?swap.pair_address,
                    sender = ?swap.sender,
                    to = ?swap.to,
                    amount0_in = %swap.amount0_in,
                    amount1_in = %swap.amount1_in,
                    amount0_out = %swap.amount0_out,
                    amount1_out = %swap.amount1_out,
                    "Swap observed"
                );
            }

            for intent in classify(tx, &logs, watch) {
                report.intents += 1;
                // The amount of a direct purchase is native wei, not token units
                let price = match intent.source {
                    IntentSource::TokenTransfer => {
                        self.cached_price(&mut prices, intent.token).await
                    }
                    IntentSource::DirectPurchase => None,
                };
                if self.record_intent(&intent, price)? != RecordOutcome::SkippedZero {
                    report.recorded += 1;
                }
            }
        }

        Ok(report)
    }

    async fn cached_price(
        &self,
        cache: &mut HashMap<Address, Option<Decimal>>,
        token: Address,
    ) -> Option<Decimal> {
        if let Some(price) = cache.get(&token) {
            return *price;
        }
        let price = self.prices.price_usd(token).await;
        cache.insert(token, price);
        price
    }

    fn record_intent(&self, intent: &ActivityIntent, price: Option<Decimal>) -> Result<RecordOutcome> {
        let cost = price.and_then(|price| {
            estimate_cost_usd(price, &intent.amount, self.settings.token_decimals)
        });
        info!(
            actor = ?intent.actor,
            token = ?intent.token,
            tx = ?intent.tx_hash,
            amount = %intent.amount,
            direction = ?intent.direction,
            cost_usd = ?cost,
            "Activity detected"
        );
        self.recorder.record(
            &intent.actor,
            &intent.token,
            &intent.tx_hash,
            &intent.amount,
            cost,
            intent.direction.is_buy(),
        )
    }
}
