use super::models::{ActivityRecord, address_key, hash_key};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, ToSql, params, params_from_iter};
use rust_decimal::Decimal;
use std::str::FromStr;

pub struct ActivityRepository<'a> {
    conn: &'a rusqlite::Connection,
}

/// Key and payload of a single upsert.
#[derive(Debug, Clone)]
pub struct ActivityUpsert<'r> {
    pub user_address: &'r Address,
    pub token_address: &'r Address,
    pub tx_hash: &'r B256,
    pub amount: &'r str,
    pub estimated_cost_usd: Option<Decimal>,
    pub is_buy: bool,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct ActivityFilter {
    pub user_address: Option<Address>,
    pub token_address: Option<Address>,
    pub is_buy: Option<bool>,
    pub limit: usize,
    pub offset: usize,
}

impl<'a> ActivityRepository<'a> {
    // An existing row only changes when a price is supplied.
    const UPSERT_ACTIVITY: &'static str = "INSERT INTO activity (
            user_address, token_address, tx_hash, amount,
            estimated_cost_usd, is_buy, observed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (tx_hash, user_address, token_address) DO UPDATE SET
            estimated_cost_usd = excluded.estimated_cost_usd,
            is_buy = excluded.is_buy
        WHERE excluded.estimated_cost_usd IS NOT NULL";

    const SELECT_ACTIVITY: &'static str = "SELECT id, user_address, token_address, tx_hash, amount, estimated_cost_usd, is_buy, observed_at FROM activity";

    const FIND_BY_KEY: &'static str = " WHERE tx_hash = ?1 AND user_address = ?2 AND token_address = ?3";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn find(
        &self,
        tx_hash: &B256,
        user_address: &Address,
        token_address: &Address,
    ) -> Result<Option<ActivityRecord>> {
        let query = format!("{}{}", Self::SELECT_ACTIVITY, Self::FIND_BY_KEY);
        let record = self
            .conn
            .query_row(
                &query,
                params![
                    hash_key(tx_hash),
                    address_key(user_address),
                    address_key(token_address)
                ],
                Self::row_to_activity,
            )
            .optional()?;
        Ok(record)
    }

    /// Returns the number of rows written (0 when an existing row was left unchanged).
    pub fn upsert(&self, activity: &ActivityUpsert<'_>) -> Result<usize> {
        let changed = self.conn.execute(
            Self::UPSERT_ACTIVITY,
            params![
                address_key(activity.user_address),
                address_key(activity.token_address),
                hash_key(activity.tx_hash),
                activity.amount,
                activity.estimated_cost_usd.map(|cost| cost.to_string()),
                activity.is_buy,
                activity.observed_at.to_rfc3339(),
            ],
        )?;
        Ok(changed)
    }

    pub fn count(&self) -> Result<usize> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM activity", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn list(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(user) = &filter.user_address {
            conditions.push("user_address = ?");
            params.push(Box::new(address_key(user)));
        }

        if let Some(token) = &filter.token_address {
            conditions.push("token_address = ?");
            params.push(Box::new(address_key(token)));
        }

        if let Some(is_buy) = filter.is_buy {
            conditions.push("is_buy = ?");
            params.push(Box::new(is_buy));
        }

        let mut query = Self::SELECT_ACTIVITY.to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(&format!(
            " ORDER BY id DESC LIMIT {} OFFSET {}",
            filter.limit, filter.offset
        ));

        let mut stmt = self.conn.prepare(&query)?;
        let records = stmt
            .query_map(params_from_iter(params), Self::row_to_activity)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn row_to_activity(row: &Row) -> rusqlite::Result<ActivityRecord> {
        let user_address = Address::from_str(&row.get::<_, String>(1)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let token_address = Address::from_str(&row.get::<_, String>(2)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let tx_hash = row.get::<_, String>(3)?.parse::<B256>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let estimated_cost_usd = row
            .get::<_, Option<String>>(5)?
            .map(|cost| Decimal::from_str(&cost))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        let observed_at = DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);

        Ok(ActivityRecord {
            id: row.get(0)?,
            user_address,
            token_address,
            tx_hash,
            amount: row.get(4)?,
            estimated_cost_usd,
            is_buy: row.get(6)?,
            observed_at,
        })
    }
}
