use anyhow::{Context, Result, ensure};
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./tracker.db";
pub const DEFAULT_PRICE_ORACLE_URL: &str = "https://api.dexscreener.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub fallback_rpc_urls: Vec<String>,
    pub database_url: String,
    pub price_oracle_url: String,
    pub poll_interval: Duration,
    pub fallback_delay: Duration,
    pub full_backoff: Duration,
    pub watchlist_refresh_interval: Duration,
    pub request_timeout: Duration,
    pub rpc_call_retries: usize,
    pub token_decimals: u8,
    pub fetch_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let rpc_url = lookup("RPC_URL")
            .filter(|url| !url.trim().is_empty())
            .context("RPC_URL must be set in .env")?;

        let fallback_rpc_urls = lookup("RPC_FALLBACK_URLS")
            .map(|urls| {
                urls.split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let price_oracle_url = lookup("PRICE_ORACLE_URL")
            .unwrap_or_else(|| DEFAULT_PRICE_ORACLE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        reqwest::Url::parse(&price_oracle_url).context("Invalid PRICE_ORACLE_URL format")?;

        Ok(Config {
            rpc_url: rpc_url.trim().to_string(),
            fallback_rpc_urls,
            database_url,
            price_oracle_url,
            poll_interval: nonzero_secs(&lookup, "POLL_INTERVAL_SECS", 15)?,
            fallback_delay: secs(&lookup, "FALLBACK_DELAY_SECS", 5)?,
            full_backoff: secs(&lookup, "FULL_BACKOFF_SECS", 30)?,
            watchlist_refresh_interval: nonzero_secs(&lookup, "WATCHLIST_REFRESH_SECS", 60)?,
            request_timeout: nonzero_secs(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            rpc_call_retries: number(&lookup, "RPC_CALL_RETRIES", 2)?,
            token_decimals: number(&lookup, "TOKEN_DECIMALS", 18)?,
            fetch_concurrency: number(&lookup, "FETCH_CONCURRENCY", 8)?.max(1),
        })
    }

    /// Primary endpoint first, then fallbacks in configured order.
    pub fn rpc_urls(&self) -> Vec<String> {
        std::iter::once(self.rpc_url.clone())
            .chain(self.fallback_rpc_urls.iter().cloned())
            .collect()
    }

    /// Only the store location, for tools that never touch the chain.
    pub fn database_url_from_env() -> String {
        dotenv::dotenv().ok();
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
    }
}

fn number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        None => Ok(default),
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    number(lookup, key, default).map(Duration::from_secs)
}

/// Timer periods and timeouts; tokio rejects a zero period.
fn nonzero_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration> {
    let period = secs(lookup, key, default)?;
    ensure!(!period.is_zero(), "Invalid {key} value: must be at least 1 second");
    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("RPC_URL", "http://localhost:8545")]).unwrap();
        assert_eq!(config.rpc_urls(), vec!["http://localhost:8545".to_string()]);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.fallback_delay, Duration::from_secs(5));
        assert_eq!(config.full_backoff, Duration::from_secs(30));
        assert_eq!(config.price_oracle_url, DEFAULT_PRICE_ORACLE_URL);
        assert_eq!(config.token_decimals, 18);
    }

    #[test]
    fn test_fallback_order_is_preserved() {
        let config = config_from(&[
            ("RPC_URL", "http://primary"),
            ("RPC_FALLBACK_URLS", " http://a , ,http://b"),
        ])
        .unwrap();
        assert_eq!(
            config.rpc_urls(),
            vec!["http://primary", "http://a", "http://b"]
        );
    }

    #[test]
    fn test_missing_rpc_url() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("RPC_URL", "  ")]).is_err());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = config_from(&[("RPC_URL", "http://x"), ("POLL_INTERVAL_SECS", "soon")])
            .unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_SECS"));
    }

    #[test]
    fn test_zero_periods_are_rejected() {
        for key in [
            "POLL_INTERVAL_SECS",
            "WATCHLIST_REFRESH_SECS",
            "REQUEST_TIMEOUT_SECS",
        ] {
            let err = config_from(&[("RPC_URL", "http://x"), (key, "0")]).unwrap_err();
            assert!(err.to_string().contains(key), "{key} accepted zero");
        }
        // Delays may be zero
        let config = config_from(&[("RPC_URL", "http://x"), ("FALLBACK_DELAY_SECS", "0")]).unwrap();
        assert!(config.fallback_delay.is_zero());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("RPC_URL", "http://x"),
            ("POLL_INTERVAL_SECS", "3"),
            ("PRICE_ORACLE_URL", "http://127.0.0.1:9000/"),
            ("FETCH_CONCURRENCY", "0"),
        ])
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.price_oracle_url, "http://127.0.0.1:9000");
        assert_eq!(config.fetch_concurrency, 1);
    }
}
