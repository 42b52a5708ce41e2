use crate::repository::{ActivityRecord, WatchEntry};
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn format_amount(amount: &str, decimals: u8) -> String {
    U256::from_str(amount)
        .ok()
        .and_then(|value| format_units(value, decimals).ok())
        .unwrap_or_else(|| amount.to_string())
}

fn side(is_buy: bool) -> &'static str {
    if is_buy { "buy" } else { "sell" }
}

fn format_cost(record: &ActivityRecord) -> String {
    record
        .estimated_cost_usd
        .map_or("N/A".to_string(), |cost| cost.round_dp(2).to_string())
}

pub fn format_activity(records: &[ActivityRecord], decimals: u8, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_activity_table(records, decimals),
        OutputFormat::Json => format_activity_json(records, decimals),
        OutputFormat::Csv => format_activity_csv(records, decimals),
    }
}

fn format_activity_table(records: &[ActivityRecord], decimals: u8) -> String {
    if records.is_empty() {
        return "No activity found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Observed",
            "Side",
            "User",
            "Token",
            "Amount",
            "Cost (USD)",
            "Tx Hash",
        ]);

    for record in records {
        table.add_row(vec![
            Cell::new(record.observed_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(side(record.is_buy)),
            Cell::new(format!("{:#}", record.user_address)),
            Cell::new(format!("{:#}", record.token_address)),
            Cell::new(format_amount(&record.amount, decimals)),
            Cell::new(format_cost(record)),
            Cell::new(format_tx_hash(&format!("{:?}", record.tx_hash))),
        ]);
    }

    table.to_string()
}

fn format_activity_json(records: &[ActivityRecord], decimals: u8) -> String {
    let json_records: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "user_address": format!("{:?}", r.user_address),
                "token_address": format!("{:?}", r.token_address),
                "tx_hash": format!("{:?}", r.tx_hash),
                "amount": format_amount(&r.amount, decimals),
                "amount_raw": r.amount,
                "estimated_cost_usd": r.estimated_cost_usd.map(|cost| cost.to_string()),
                "is_buy": r.is_buy,
                "observed_at": r.observed_at.to_rfc3339(),
            })
        })
        .collect();

    serde_json::to_string_pretty(&json_records).unwrap_or_else(|_| "[]".to_string())
}

fn format_activity_csv(records: &[ActivityRecord], decimals: u8) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "observed_at",
        "side",
        "user_address",
        "token_address",
        "amount",
        "amount_raw",
        "estimated_cost_usd",
        "tx_hash",
    ]);

    for record in records {
        let _ = wtr.write_record([
            record.observed_at.to_rfc3339(),
            side(record.is_buy).to_string(),
            format!("{:?}", record.user_address),
            format!("{:?}", record.token_address),
            format_amount(&record.amount, decimals),
            record.amount.clone(),
            record
                .estimated_cost_usd
                .map(|cost| cost.to_string())
                .unwrap_or_default(),
            format!("{:?}", record.tx_hash),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_watch_entries(entries: &[WatchEntry], label_header: &str, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                return "No entries found.".to_string();
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Address", label_header, "Added"]);
            for entry in entries {
                table.add_row(vec![
                    Cell::new(format!("{:#}", entry.address)),
                    Cell::new(entry.label.as_deref().unwrap_or("")),
                    Cell::new(entry.added_at.format("%Y-%m-%d %H:%M:%S")),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_entries: Vec<_> = entries
                .iter()
                .map(|entry| {
                    json!({
                        "address": format!("{:?}", entry.address),
                        "label": entry.label,
                        "added_at": entry.added_at.to_rfc3339(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_entries).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["address", "label", "added_at"]);
            for entry in entries {
                let _ = wtr.write_record([
                    format!("{:?}", entry.address),
                    entry.label.clone().unwrap_or_default(),
                    entry.added_at.to_rfc3339(),
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn format_tx_hash(hash: &str) -> String {
    if hash.len() <= 12 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}
