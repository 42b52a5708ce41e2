use super::models::{WatchEntry, address_key};
use alloy_primitives::Address;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use std::str::FromStr;

/// Which of the two watch-list tables an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchTable {
    TrackedTokens,
    WatchedAddresses,
}

impl WatchTable {
    fn select(self) -> &'static str {
        match self {
            WatchTable::TrackedTokens => {
                "SELECT address, symbol, added_at FROM tracked_tokens ORDER BY added_at"
            }
            WatchTable::WatchedAddresses => {
                "SELECT address, label, added_at FROM watched_addresses ORDER BY added_at"
            }
        }
    }

    fn insert(self) -> &'static str {
        match self {
            WatchTable::TrackedTokens => {
                "INSERT OR REPLACE INTO tracked_tokens (address, symbol, added_at) VALUES (?1, ?2, ?3)"
            }
            WatchTable::WatchedAddresses => {
                "INSERT OR REPLACE INTO watched_addresses (address, label, added_at) VALUES (?1, ?2, ?3)"
            }
        }
    }

    fn delete(self) -> &'static str {
        match self {
            WatchTable::TrackedTokens => "DELETE FROM tracked_tokens WHERE address = ?1",
            WatchTable::WatchedAddresses => "DELETE FROM watched_addresses WHERE address = ?1",
        }
    }
}

pub struct WatchListRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> WatchListRepository<'a> {
    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn list(&self, table: WatchTable) -> Result<Vec<WatchEntry>> {
        let mut stmt = self.conn.prepare(table.select())?;
        let entries = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn add(&self, table: WatchTable, address: &Address, label: Option<&str>) -> Result<()> {
        self.conn.execute(
            table.insert(),
            params![address_key(address), label, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Returns whether a row was removed.
    pub fn remove(&self, table: WatchTable, address: &Address) -> Result<bool> {
        let removed = self
            .conn
            .execute(table.delete(), params![address_key(address)])?;
        Ok(removed > 0)
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<WatchEntry> {
        let address = Address::from_str(&row.get::<_, String>(0)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let added_at = DateTime::parse_from_rfc3339(&row.get::<_, String>(2)?)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);

        Ok(WatchEntry {
            address,
            label: row.get(1)?,
            added_at,
        })
    }
}
