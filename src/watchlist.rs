//! Tracked tokens and watched wallets, refreshed from the store.
//!
//! Each refresh builds a fresh `WatchSet` and publishes it whole through a
//! `watch` channel. Readers hold an `Arc` to one complete snapshot, so a
//! refresh never shows up half-applied.

use crate::repository::{Database, WatchListRepository, WatchTable};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSet {
    pub tracked_tokens: HashSet<Address>,
    pub watched_addresses: HashSet<Address>,
    pub refreshed_at: DateTime<Utc>,
}

impl WatchSet {
    pub fn new(
        tracked_tokens: impl IntoIterator<Item = Address>,
        watched_addresses: impl IntoIterator<Item = Address>,
    ) -> Self {
        WatchSet {
            tracked_tokens: tracked_tokens.into_iter().collect(),
            watched_addresses: watched_addresses.into_iter().collect(),
            refreshed_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        WatchSet {
            tracked_tokens: HashSet::new(),
            watched_addresses: HashSet::new(),
            refreshed_at: Utc::now(),
        }
    }

    pub fn is_tracked(&self, token: &Address) -> bool {
        self.tracked_tokens.contains(token)
    }

    pub fn is_watched(&self, address: &Address) -> bool {
        self.watched_addresses.contains(address)
    }
}

/// Read side of the published watch set.
pub type WatchSetReceiver = watch::Receiver<Arc<WatchSet>>;

pub struct WatchListLoader {
    db: Database,
    sender: watch::Sender<Arc<WatchSet>>,
}

impl WatchListLoader {
    pub fn new(db: Database) -> Self {
        let (sender, _) = watch::channel(Arc::new(WatchSet::empty()));
        WatchListLoader { db, sender }
    }

    pub fn subscribe(&self) -> WatchSetReceiver {
        self.sender.subscribe()
    }

    pub fn current(&self) -> Arc<WatchSet> {
        self.sender.borrow().clone()
    }

    fn load(&self) -> Result<WatchSet> {
        let conn = self.db.lock()?;
        let repo = WatchListRepository::new(&conn);
        let tokens = repo
            .list(WatchTable::TrackedTokens)
            .context("Failed to read tracked tokens")?;
        let holders = repo
            .list(WatchTable::WatchedAddresses)
            .context("Failed to read watched addresses")?;
        Ok(WatchSet::new(
            tokens.into_iter().map(|entry| entry.address),
            holders.into_iter().map(|entry| entry.address),
        ))
    }

    /// Reads both lists and replaces the published set. On failure the
    /// previous set stays in place.
    pub fn refresh(&self) -> Result<Arc<WatchSet>> {
        let set = Arc::new(self.load()?);
        info!(
            tracked_tokens = set.tracked_tokens.len(),
            watched_addresses = set.watched_addresses.len(),
            "Watch list refreshed"
        );
        self.sender.send_replace(set.clone());
        Ok(set)
    }

    /// Periodic refresh until shutdown. The first tick fires after `period`,
    /// the initial load happens at startup.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh() {
                        warn!(error = %e, "Watch list refresh failed, keeping previous set");
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const TOKEN_A: Address = address!("00000000000000000000000000000000000000a1");
    const TOKEN_B: Address = address!("00000000000000000000000000000000000000b2");
    const HOLDER: Address = address!("00000000000000000000000000000000000000c3");

    fn add(db: &Database, table: WatchTable, address: Address) {
        let conn = db.lock().unwrap();
        WatchListRepository::new(&conn)
            .add(table, &address, None)
            .unwrap();
    }

    fn remove(db: &Database, table: WatchTable, address: Address) {
        let conn = db.lock().unwrap();
        WatchListRepository::new(&conn)
            .remove(table, &address)
            .unwrap();
    }

    #[test]
    fn test_refresh_replaces_instead_of_merging() {
        let db = Database::in_memory().unwrap();
        add(&db, WatchTable::TrackedTokens, TOKEN_A);
        add(&db, WatchTable::WatchedAddresses, HOLDER);

        let loader = WatchListLoader::new(db.clone());
        let first = loader.refresh().unwrap();
        assert!(first.is_tracked(&TOKEN_A));
        assert!(first.is_watched(&HOLDER));

        remove(&db, WatchTable::TrackedTokens, TOKEN_A);
        add(&db, WatchTable::TrackedTokens, TOKEN_B);
        let second = loader.refresh().unwrap();

        assert!(!second.is_tracked(&TOKEN_A));
        assert!(second.is_tracked(&TOKEN_B));
        // Snapshot held by an earlier reader is untouched
        assert!(first.is_tracked(&TOKEN_A));
        assert!(!first.is_tracked(&TOKEN_B));
    }

    #[test]
    fn test_failed_refresh_keeps_previous_set() {
        let db = Database::in_memory().unwrap();
        add(&db, WatchTable::TrackedTokens, TOKEN_A);
        let loader = WatchListLoader::new(db.clone());
        loader.refresh().unwrap();

        db.lock()
            .unwrap()
            .execute("DROP TABLE tracked_tokens", [])
            .unwrap();

        assert!(loader.refresh().is_err());
        assert!(loader.current().is_tracked(&TOKEN_A));
    }

    #[tokio::test]
    async fn test_readers_only_see_whole_snapshots() {
        let db = Database::in_memory().unwrap();
        let loader = Arc::new(WatchListLoader::new(db.clone()));
        let before: HashSet<Address> = [TOKEN_A].into_iter().collect();
        let after: HashSet<Address> = [TOKEN_B].into_iter().collect();

        add(&db, WatchTable::TrackedTokens, TOKEN_A);
        loader.refresh().unwrap();

        let reader = {
            let receiver = loader.subscribe();
            let before = before.clone();
            let after = after.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = receiver.borrow().clone();
                    assert!(
                        snapshot.tracked_tokens == before || snapshot.tracked_tokens == after,
                        "mixed snapshot observed"
                    );
                    tokio::task::yield_now().await;
                }
            })
        };

        for round in 0..100 {
            {
                let conn = db.lock().unwrap();
                let repo = WatchListRepository::new(&conn);
                let (gone, kept) = if round % 2 == 0 {
                    (TOKEN_A, TOKEN_B)
                } else {
                    (TOKEN_B, TOKEN_A)
                };
                repo.remove(WatchTable::TrackedTokens, &gone).unwrap();
                repo.add(WatchTable::TrackedTokens, &kept, None).unwrap();
            }
            loader.refresh().unwrap();
            tokio::task::yield_now().await;
        }

        reader.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_refreshes_on_interval_and_stops_on_shutdown() {
        let db = Database::in_memory().unwrap();
        let loader = Arc::new(WatchListLoader::new(db.clone()));
        let mut receiver = loader.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.run(Duration::from_secs(60), shutdown_rx).await })
        };

        add(&db, WatchTable::WatchedAddresses, HOLDER);
        receiver.changed().await.unwrap();
        assert!(receiver.borrow().is_watched(&HOLDER));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
