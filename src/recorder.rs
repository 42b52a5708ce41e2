use crate::repository::{ActivityRepository, ActivityUpsert, Database};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// Existing row got a new price and direction.
    Updated,
    /// Existing row left as it was.
    Unchanged,
    /// Zero amounts are approvals or no-ops and are never stored.
    SkippedZero,
}

/// Idempotent writer for activity rows keyed by (tx hash, actor, token).
#[derive(Clone)]
pub struct Recorder {
    db: Database,
}

impl Recorder {
    pub fn new(db: Database) -> Self {
        Recorder { db }
    }

    pub fn record(
        &self,
        actor: &Address,
        token: &Address,
        tx_hash: &B256,
        amount: &str,
        cost_usd: Option<Decimal>,
        is_buy: bool,
    ) -> Result<RecordOutcome> {
        if is_zero_amount(amount) {
            return Ok(RecordOutcome::SkippedZero);
        }

        let result = self.upsert(actor, token, tx_hash, amount, cost_usd, is_buy);
        match &result {
            Ok(outcome) => debug!(
                actor = ?actor,
                token = ?token,
                tx = ?tx_hash,
                outcome = ?outcome,
                "Activity recorded"
            ),
            Err(e) => error!(
                actor = ?actor,
                token = ?token,
                tx = ?tx_hash,
                error = %e,
                "Failed to record activity"
            ),
        }
        result
    }

    fn upsert(
        &self,
        actor: &Address,
        token: &Address,
        tx_hash: &B256,
        amount: &str,
        cost_usd: Option<Decimal>,
        is_buy: bool,
    ) -> Result<RecordOutcome> {
        let conn = self.db.lock()?;
        let repo = ActivityRepository::new(&conn);
        let existing = repo.find(tx_hash, actor, token)?;

        repo.upsert(&ActivityUpsert {
            user_address: actor,
            token_address: token,
            tx_hash,
            amount,
            estimated_cost_usd: cost_usd,
            is_buy,
            observed_at: Utc::now(),
        })?;

        Ok(match (existing, cost_usd) {
            (None, _) => RecordOutcome::Inserted,
            (Some(_), Some(_)) => RecordOutcome::Updated,
            (Some(_), None) => RecordOutcome::Unchanged,
        })
    }
}

fn is_zero_amount(amount: &str) -> bool {
    amount.trim().trim_start_matches('0').is_empty()
}
