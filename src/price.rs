//! Best-effort USD pricing from a DexScreener-compatible aggregator.

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Anything that can price a token. `None` means "unknown" and is never an error.
pub trait PriceSource: Send + Sync {
    fn price_usd(&self, token: Address) -> impl Future<Output = Option<Decimal>> + Send;
}

#[derive(Debug, Deserialize)]
pub struct PairsResponse {
    pub pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
pub struct Pair {
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    pub volume: Option<Volume>,
}

#[derive(Debug, Deserialize)]
pub struct Volume {
    pub h24: Option<f64>,
}

impl Pair {
    fn volume_24h(&self) -> f64 {
        self.volume
            .as_ref()
            .and_then(|v| v.h24)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    fn price(&self) -> Option<Decimal> {
        let raw = self.price_usd.as_deref()?.trim();
        Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .ok()
    }
}

/// Price of the most traded pair that carries a usable price.
pub fn select_price(response: &PairsResponse) -> Option<Decimal> {
    response
        .pairs
        .as_deref()?
        .iter()
        .filter_map(|pair| pair.price().map(|price| (pair.volume_24h(), price)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, price)| price)
}

pub struct PriceOracle {
    client: reqwest::Client,
    base_url: String,
}

impl PriceOracle {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build price oracle HTTP client")?;
        Ok(PriceOracle {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn token_url(&self, token: &Address) -> String {
        format!("{}/latest/dex/tokens/{token:?}", self.base_url)
    }

    async fn fetch_pairs(&self, token: &Address) -> Result<PairsResponse> {
        let response = self
            .client
            .get(self.token_url(token))
            .send()
            .await
            .context("Price oracle request failed")?
            .error_for_status()
            .context("Price oracle returned an error status")?;
        response
            .json::<PairsResponse>()
            .await
            .context("Failed to parse price oracle response")
    }
}

impl PriceSource for PriceOracle {
    async fn price_usd(&self, token: Address) -> Option<Decimal> {
        match self.fetch_pairs(&token).await {
            Ok(response) => {
                let price = select_price(&response);
                if price.is_none() {
                    debug!(token = ?token, "No priced pairs for token");
                }
                price
            }
            Err(e) => {
                debug!(token = ?token, error = %e, "Price unavailable");
                None
            }
        }
    }
}

/// USD value of a raw token amount, `price * amount / 10^decimals`.
/// Returns `None` if the amount does not parse or the result overflows.
pub fn estimate_cost_usd(price: Decimal, amount: &str, decimals: u8) -> Option<Decimal> {
    let amount = U256::from_str(amount).ok()?;
    let scale = U256::from(10u64).checked_pow(U256::from(decimals))?;

    let whole = u128::try_from(amount / scale).ok()?;
    let mut fraction = amount % scale;
    let mut fraction_scale = u32::from(decimals);
    // Decimal keeps at most 28 fractional digits
    if fraction_scale > 28 {
        fraction /= U256::from(10u64).pow(U256::from(fraction_scale - 28));
        fraction_scale = 28;
    }
    let fraction = i128::try_from(fraction).ok()?;

    let tokens = Decimal::from_u128(whole)?
        .checked_add(Decimal::from_i128_with_scale(fraction, fraction_scale))?;
    price.checked_mul(tokens).map(|cost| cost.normalize())
}
