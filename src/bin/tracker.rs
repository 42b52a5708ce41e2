use anyhow::{Context, Result};
use chain_activity_tracker::config::Config;
use chain_activity_tracker::connection::{BackoffSettings, ConnectionManager};
use chain_activity_tracker::poller::{BlockPoller, PollerSettings};
use chain_activity_tracker::price::PriceOracle;
use chain_activity_tracker::recorder::Recorder;
use chain_activity_tracker::repository::Database;
use chain_activity_tracker::rpc::AlloyEndpoint;
use chain_activity_tracker::shutdown::spawn_shutdown_listener;
use chain_activity_tracker::watchlist::WatchListLoader;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting chain activity tracker");

    let config = Config::from_env()?;
    info!(
        endpoints = config.rpc_urls().len(),
        poll_interval_secs = config.poll_interval.as_secs(),
        "Configuration loaded"
    );

    let db = Database::new(&config.database_url)?;
    info!(database = %config.database_url, "Database initialized");

    let loader = Arc::new(WatchListLoader::new(db.clone()));
    loader.refresh().context("Initial watch list load failed")?;

    let endpoints = config
        .rpc_urls()
        .into_iter()
        .map(|url| AlloyEndpoint::new(&url).map(|rpc| (url, rpc)))
        .collect::<Result<Vec<_>>>()?;
    let chain = Arc::new(ConnectionManager::new(
        endpoints,
        BackoffSettings {
            fallback_delay: config.fallback_delay,
            full_backoff: config.full_backoff,
            request_timeout: config.request_timeout,
            call_retries: config.rpc_call_retries,
        },
    )?);

    if let Err(e) = chain.connect_cycle().await {
        error!(error = %e, "Could not reach any RPC endpoint");
        return Err(e.into());
    }
    info!(url = %chain.current_url(), "RPC connected");

    let prices = PriceOracle::new(&config.price_oracle_url, config.request_timeout)?;
    let recorder = Recorder::new(db);

    let shutdown_rx = spawn_shutdown_listener(tokio::signal::ctrl_c());

    let supervisor = tokio::spawn(chain.clone().supervise(shutdown_rx.clone()));
    let refresher = {
        let loader = loader.clone();
        let period = config.watchlist_refresh_interval;
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { loader.run(period, shutdown).await })
    };

    let mut poller = BlockPoller::new(
        chain,
        loader.subscribe(),
        recorder,
        prices,
        PollerSettings {
            poll_interval: config.poll_interval,
            token_decimals: config.token_decimals,
            fetch_concurrency: config.fetch_concurrency,
        },
    );
    poller.run(shutdown_rx).await;

    let _ = tokio::join!(supervisor, refresher);
    info!("Tracker stopped");
    Ok(())
}
