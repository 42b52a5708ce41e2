use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: i64,
    pub user_address: Address,
    pub token_address: Address,
    pub tx_hash: B256,
    /// Raw token amount as a base-10 integer string.
    pub amount: String,
    pub estimated_cost_usd: Option<Decimal>,
    pub is_buy: bool,
    pub observed_at: DateTime<Utc>,
}

/// A row of either watch-list table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub address: Address,
    pub label: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Lowercase `0x` hex, the canonical key format in every table.
pub fn address_key(address: &Address) -> String {
    format!("{address:?}")
}

pub fn hash_key(hash: &B256) -> String {
    format!("{hash:?}")
}
