//! Single active RPC connection with ordered failover.
//!
//! The manager is the only writer of the connection status. A failed call
//! marks the connection `Disconnected` and wakes the supervisor task, which
//! moves on to the endpoint after the one that failed. Once every endpoint
//! has failed it backs off and starts again from the primary.

use crate::rpc::{ChainRpc, ChainTransaction, RawLog};
use alloy_primitives::B256;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, broadcast, watch};
use tokio::time::{sleep, timeout};
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionStatus::Connecting,
            2 => ConnectionStatus::Connected,
            _ => ConnectionStatus::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionStatus::Disconnected => 0,
            ConnectionStatus::Connecting => 1,
            ConnectionStatus::Connected => 2,
        }
    }
}

/// Point-in-time copy of the manager's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub endpoint_url: String,
    pub status: ConnectionStatus,
    pub last_block_seen: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no RPC endpoints configured")]
    NoEndpoints,
    #[error("not connected to any RPC endpoint")]
    NotConnected,
    #[error("{operation} timed out after {seconds}s on {url}")]
    Timeout {
        operation: &'static str,
        url: String,
        seconds: u64,
    },
    #[error("{operation} failed on {url}: {message}")]
    Rpc {
        operation: &'static str,
        url: String,
        message: String,
    },
    #[error("all {0} RPC endpoints failed")]
    Exhausted(usize),
    #[error("no RPC endpoint at index {0}")]
    UnknownEndpoint(usize),
}

#[derive(Debug, Clone)]
pub struct BackoffSettings {
    /// Pause before trying the next endpoint in the list.
    pub fallback_delay: Duration,
    /// Pause after every endpoint has failed, before restarting at the primary.
    pub full_backoff: Duration,
    pub request_timeout: Duration,
    /// Extra attempts per call on the active endpoint before failing over.
    pub call_retries: usize,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        BackoffSettings {
            fallback_delay: Duration::from_secs(5),
            full_backoff: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            call_retries: 2,
        }
    }
}

struct Endpoint<R> {
    url: String,
    rpc: R,
}

pub struct ConnectionManager<R: ChainRpc> {
    endpoints: Vec<Endpoint<R>>,
    active: AtomicUsize,
    status: AtomicU8,
    last_block_seen: AtomicU64,
    /// Bumped on every successful connect, so failures of calls issued
    /// against an older connection are ignored.
    generation: AtomicU64,
    transitions: broadcast::Sender<ConnectionStatus>,
    disconnected: Notify,
    settings: BackoffSettings,
}

const NO_BLOCK: u64 = u64::MAX;

impl<R: ChainRpc> ConnectionManager<R> {
    /// `endpoints` is `(url, client)` with the primary first.
    pub fn new(endpoints: Vec<(String, R)>, settings: BackoffSettings) -> Result<Self, ConnectError> {
        if endpoints.is_empty() {
            return Err(ConnectError::NoEndpoints);
        }
        let (transitions, _) = broadcast::channel(64);
        Ok(ConnectionManager {
            endpoints: endpoints
                .into_iter()
                .map(|(url, rpc)| Endpoint { url, rpc })
                .collect(),
            active: AtomicUsize::new(0),
            status: AtomicU8::new(ConnectionStatus::Disconnected.as_u8()),
            last_block_seen: AtomicU64::new(NO_BLOCK),
            generation: AtomicU64::new(0),
            transitions,
            disconnected: Notify::new(),
            settings,
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn state(&self) -> ConnectionState {
        let last = self.last_block_seen.load(Ordering::Acquire);
        ConnectionState {
            endpoint_url: self.current_url().to_string(),
            status: self.status(),
            last_block_seen: (last != NO_BLOCK).then_some(last),
        }
    }

    pub fn current_url(&self) -> &str {
        &self.endpoints[self.active_index()].url
    }

    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire) % self.endpoints.len()
    }

    /// Every status change, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.transitions.subscribe()
    }

    fn set_status(&self, next: ConnectionStatus) {
        let previous = ConnectionStatus::from_u8(self.status.swap(next.as_u8(), Ordering::AcqRel));
        if previous == next {
            return;
        }
        info!(
            url = self.current_url(),
            from = ?previous,
            to = ?next,
            "RPC connection state changed"
        );
        let _ = self.transitions.send(next);
    }

    /// Marks a live connection down after a failed call, unless the
    /// connection has been replaced since the call started.
    fn mark_down(&self, generation: u64) {
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("Ignoring failure from a superseded connection");
            return;
        }
        let was_connected = self
            .status
            .compare_exchange(
                ConnectionStatus::Connected.as_u8(),
                ConnectionStatus::Disconnected.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !was_connected {
            return;
        }
        info!(
            url = self.current_url(),
            from = ?ConnectionStatus::Connected,
            to = ?ConnectionStatus::Disconnected,
            "RPC connection state changed"
        );
        let _ = self.transitions.send(ConnectionStatus::Disconnected);
        self.disconnected.notify_one();
    }

    /// Probes a single endpoint and makes it the active one on success.
    pub async fn connect(&self, index: usize) -> Result<u64, ConnectError> {
        let endpoint = self
            .endpoints
            .get(index)
            .ok_or(ConnectError::UnknownEndpoint(index))?;
        self.active.store(index, Ordering::Release);
        self.set_status(ConnectionStatus::Connecting);

        let probe = timeout(self.settings.request_timeout, endpoint.rpc.block_number()).await;
        match probe {
            Ok(Ok(height)) => {
                self.last_block_seen.store(height, Ordering::Release);
                self.generation.fetch_add(1, Ordering::AcqRel);
                self.set_status(ConnectionStatus::Connected);
                Ok(height)
            }
            Ok(Err(e)) => {
                warn!(url = %endpoint.url, error = %e, "RPC endpoint unreachable");
                self.set_status(ConnectionStatus::Disconnected);
                Err(ConnectError::Rpc {
                    operation: "connect",
                    url: endpoint.url.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    url = %endpoint.url,
                    seconds = self.settings.request_timeout.as_secs(),
                    "RPC endpoint probe timed out"
                );
                self.set_status(ConnectionStatus::Disconnected);
                Err(ConnectError::Timeout {
                    operation: "connect",
                    url: endpoint.url.clone(),
                    seconds: self.settings.request_timeout.as_secs(),
                })
            }
        }
    }

    /// One pass over the endpoint list starting at the primary, pausing
    /// `fallback_delay` between attempts.
    pub async fn connect_cycle(&self) -> Result<u64, ConnectError> {
        self.cycle_from(0, false).await
    }

    /// Tries every endpoint once, in list order from `start` with wrap-around.
    async fn cycle_from(&self, start: usize, pause_first: bool) -> Result<u64, ConnectError> {
        let len = self.endpoints.len();
        for step in 0..len {
            if step > 0 || pause_first {
                sleep(self.settings.fallback_delay).await;
            }
            let index = (start + step) % len;
            if let Ok(height) = self.connect(index).await {
                info!(
                    url = %self.endpoints[index].url,
                    fallback = index > 0,
                    height,
                    "Connected to RPC endpoint"
                );
                return Ok(height);
            }
        }
        Err(ConnectError::Exhausted(len))
    }

    /// Recovery after a call failed on `failed`: the following endpoints are
    /// tried first, `fallback_delay` apart. If none answers, falls back to
    /// [`reconnect`](Self::reconnect).
    pub async fn fail_over(&self, failed: usize) -> u64 {
        match self.cycle_from(failed + 1, true).await {
            Ok(height) => height,
            Err(e) => {
                warn!(
                    error = %e,
                    backoff_secs = self.settings.full_backoff.as_secs(),
                    "All RPC endpoints failed, backing off"
                );
                sleep(self.settings.full_backoff).await;
                self.reconnect().await
            }
        }
    }

    /// Cycles until some endpoint answers, with `full_backoff` between cycles.
    pub async fn reconnect(&self) -> u64 {
        loop {
            match self.connect_cycle().await {
                Ok(height) => return height,
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_secs = self.settings.full_backoff.as_secs(),
                        "All RPC endpoints failed, backing off"
                    );
                    sleep(self.settings.full_backoff).await;
                }
            }
        }
    }

    /// Reconnect loop that runs beside the poller until shutdown.
    pub async fn supervise(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if self.status() != ConnectionStatus::Connected {
                tokio::select! {
                    _ = self.reconnect() => {}
                    _ = shutdown.changed() => return,
                }
                continue;
            }
            tokio::select! {
                _ = self.disconnected.notified() => {}
                _ = shutdown.changed() => return,
            }
            if self.status() == ConnectionStatus::Connected {
                continue;
            }
            let failed = self.active_index();
            debug!(url = self.current_url(), "Supervisor woken by disconnect");
            tokio::select! {
                _ = self.fail_over(failed) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Runs `op` against the active endpoint with timeout and retry. A final
    /// failure marks the connection `Disconnected`.
    async fn call<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, ConnectError>
    where
        F: Fn(R) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if self.status() != ConnectionStatus::Connected {
            return Err(ConnectError::NotConnected);
        }
        let generation = self.generation.load(Ordering::Acquire);
        let endpoint = &self.endpoints[self.active_index()];
        let request_timeout = self.settings.request_timeout;
        let op = &op;

        let result = Retry::spawn(retry_strategy(self.settings.call_retries), move || async move {
            match timeout(request_timeout, op(endpoint.rpc.clone())).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    debug!(url = %endpoint.url, operation, error = %e, "RPC call failed");
                    Err(ConnectError::Rpc {
                        operation,
                        url: endpoint.url.clone(),
                        message: e.to_string(),
                    })
                }
                Err(_) => Err(ConnectError::Timeout {
                    operation,
                    url: endpoint.url.clone(),
                    seconds: request_timeout.as_secs(),
                }),
            }
        })
        .await;

        if let Err(e) = &result {
            warn!(error = %e, "RPC call failed, marking connection down");
            self.mark_down(generation);
        }
        result
    }

    pub async fn current_height(&self) -> Result<u64, ConnectError> {
        let height = self
            .call("eth_blockNumber", |rpc| async move { rpc.block_number().await })
            .await?;
        self.last_block_seen.store(height, Ordering::Release);
        Ok(height)
    }

    pub async fn block_transaction_hashes(&self, height: u64) -> Result<Vec<B256>, ConnectError> {
        self.call("eth_getBlockByNumber", |rpc| async move {
            rpc.block_transaction_hashes(height).await
        })
        .await
    }

    pub async fn transaction(&self, hash: B256) -> Result<ChainTransaction, ConnectError> {
        self.call("eth_getTransactionByHash", |rpc| async move {
            rpc.transaction(hash).await
        })
        .await
    }

    pub async fn transaction_logs(&self, hash: B256) -> Result<Vec<RawLog>, ConnectError> {
        self.call("eth_getTransactionReceipt", |rpc| async move {
            rpc.transaction_logs(hash).await
        })
        .await
    }
}

fn retry_strategy(retries: usize) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(100)
        .factor(2)
        .max_delay(Duration::from_secs(2))
        .map(jitter)
        .take(retries)
}
