use crate::query::formatters::{OutputFormat, format_activity, format_watch_entries};
use crate::repository::{ActivityFilter, ActivityRepository, WatchListRepository, WatchTable};
use alloy_primitives::Address;
use anyhow::{Result, bail};
use rusqlite::Connection;
use std::str::FromStr;

fn parse_address(raw: &str, what: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|_| anyhow::anyhow!("Invalid {what} address: {raw}"))
}

fn parse_side(raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "buy" => Ok(true),
        "sell" => Ok(false),
        other => bail!("Invalid side: {other} (expected buy or sell)"),
    }
}

#[derive(Default)]
pub struct ActivityQuery {
    pub user: Option<String>,
    pub token: Option<String>,
    pub side: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl ActivityQuery {
    fn into_filter(self) -> Result<ActivityFilter> {
        let user_address = self
            .user
            .as_deref()
            .map(|addr| parse_address(addr, "user"))
            .transpose()?;
        let token_address = self
            .token
            .as_deref()
            .map(|addr| parse_address(addr, "token"))
            .transpose()?;
        let is_buy = self.side.as_deref().map(parse_side).transpose()?;

        Ok(ActivityFilter {
            user_address,
            token_address,
            is_buy,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

pub fn cmd_activity(
    conn: &Connection,
    query: ActivityQuery,
    decimals: u8,
    format: &OutputFormat,
) -> Result<String> {
    let filter = query.into_filter()?;
    let records = ActivityRepository::new(conn).list(&filter)?;
    Ok(format_activity(&records, decimals, format))
}

fn label_header(table: WatchTable) -> &'static str {
    match table {
        WatchTable::TrackedTokens => "Symbol",
        WatchTable::WatchedAddresses => "Label",
    }
}

pub fn cmd_watch_list(conn: &Connection, table: WatchTable, format: &OutputFormat) -> Result<String> {
    let entries = WatchListRepository::new(conn).list(table)?;
    Ok(format_watch_entries(&entries, label_header(table), format))
}

pub fn cmd_add(
    conn: &Connection,
    table: WatchTable,
    address: &str,
    label: Option<&str>,
) -> Result<String> {
    let address = parse_address(address, "watch-list")?;
    WatchListRepository::new(conn).add(table, &address, label)?;
    Ok(format!("Added {address:?}"))
}

pub fn cmd_remove(conn: &Connection, table: WatchTable, address: &str) -> Result<String> {
    let address = parse_address(address, "watch-list")?;
    if WatchListRepository::new(conn).remove(table, &address)? {
        Ok(format!("Removed {address:?}"))
    } else {
        Ok(format!("{address:?} was not on the list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{ActivityUpsert, Database};
    use alloy_primitives::{B256, address};
    use chrono::Utc;

    const USER: Address = address!("0000000000000000000000000000000000000aaa");
    const TOKEN: Address = address!("0000000000000000000000000000000000000ddd");

    #[test]
    fn test_side_parsing() {
        assert!(parse_side("BUY").unwrap());
        assert!(!parse_side("sell").unwrap());
        assert!(parse_side("hold").is_err());
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        assert!(cmd_add(&conn, WatchTable::WatchedAddresses, "0x123", None).is_err());
        let query = ActivityQuery {
            user: Some("nope".to_string()),
            limit: 10,
            ..Default::default()
        };
        assert!(cmd_activity(&conn, query, 18, &OutputFormat::Json).is_err());
    }

    #[test]
    fn test_add_list_remove() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let raw = format!("{USER:?}");

        cmd_add(&conn, WatchTable::WatchedAddresses, &raw, Some("whale")).unwrap();
        let listed = cmd_watch_list(&conn, WatchTable::WatchedAddresses, &OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(parsed[0]["label"], "whale");

        assert!(cmd_remove(&conn, WatchTable::WatchedAddresses, &raw).unwrap().starts_with("Removed"));
        assert!(cmd_remove(&conn, WatchTable::WatchedAddresses, &raw).unwrap().ends_with("not on the list"));
    }

    #[test]
    fn test_activity_side_filter() {
        let db = Database::in_memory().unwrap();
        let conn = db.lock().unwrap();
        let repo = ActivityRepository::new(&conn);
        for (byte, is_buy) in [(1u8, true), (2, false), (3, true)] {
            repo.upsert(&ActivityUpsert {
                user_address: &USER,
                token_address: &TOKEN,
                tx_hash: &B256::repeat_byte(byte),
                amount: "100",
                estimated_cost_usd: None,
                is_buy,
                observed_at: Utc::now(),
            })
            .unwrap();
        }

        let query = ActivityQuery {
            side: Some("buy".to_string()),
            limit: 10,
            ..Default::default()
        };
        let output = cmd_activity(&conn, query, 18, &OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }
}
