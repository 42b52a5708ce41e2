//! Buy/sell classification of transactions sent by watched wallets.

use crate::events::{SwapEvent, decode_swap, decode_transfer};
use crate::rpc::{ChainTransaction, RawLog};
use crate::watchlist::WatchSet;
use alloy_primitives::{Address, B256, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn is_buy(self) -> bool {
        self == Direction::Buy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    /// Native value sent straight to a tracked token contract.
    DirectPurchase,
    /// A decoded `Transfer` log of a tracked token.
    TokenTransfer,
}

/// Candidate activity row, before pricing and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityIntent {
    pub actor: Address,
    pub token: Address,
    pub tx_hash: B256,
    pub amount: String,
    pub direction: Direction,
    pub source: IntentSource,
}

/// Whether the transaction deserves a receipt fetch at all.
pub fn is_candidate(tx: &ChainTransaction, watch: &WatchSet) -> bool {
    tx.to.is_some() && watch.is_watched(&tx.from)
}

/// Derives every intent for one transaction from its envelope and receipt logs.
pub fn classify(tx: &ChainTransaction, logs: &[RawLog], watch: &WatchSet) -> Vec<ActivityIntent> {
    if !is_candidate(tx, watch) {
        return Vec::new();
    }
    let Some(to) = tx.to else {
        return Vec::new();
    };

    let mut intents = Vec::new();

    if watch.is_tracked(&to) && tx.value > U256::ZERO {
        intents.push(ActivityIntent {
            actor: tx.from,
            token: to,
            tx_hash: tx.hash,
            amount: tx.value.to_string(),
            direction: Direction::Buy,
            source: IntentSource::DirectPurchase,
        });
    }

    for transfer in logs.iter().filter_map(decode_transfer) {
        if !watch.is_tracked(&transfer.token_address) || transfer.is_zero() {
            continue;
        }
        let direction = if transfer.to == tx.from {
            Direction::Buy
        } else if transfer.from == tx.from {
            Direction::Sell
        } else {
            continue;
        };
        intents.push(ActivityIntent {
            actor: tx.from,
            token: transfer.token_address,
            tx_hash: tx.hash,
            amount: transfer.amount,
            direction,
            source: IntentSource::TokenTransfer,
        });
    }

    intents
}

/// Swaps in the receipt. These are reported but do not drive classification.
pub fn observed_swaps(logs: &[RawLog]) -> Vec<SwapEvent> {
    logs.iter().filter_map(decode_swap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::transfer_log;
    use alloy_primitives::{Bytes, address, b256};
    use std::str::FromStr;

    const WATCHED: Address = address!("0000000000000000000000000000000000000aaa");
    const TOKEN: Address = address!("0000000000000000000000000000000000000ddd");
    const OTHER_TOKEN: Address = address!("0000000000000000000000000000000000000eee");
    const POOL: Address = address!("0000000000000000000000000000000000000bbb");
    const ROUTER: Address = address!("0000000000000000000000000000000000000ccc");
    const TX: B256 = b256!("abababababababababababababababababababababababababababababababab");

    fn watch() -> WatchSet {
        WatchSet::new([TOKEN, OTHER_TOKEN], [WATCHED])
    }

    fn tx(from: Address, to: Option<Address>, value: U256) -> ChainTransaction {
        ChainTransaction {
            hash: TX,
            from,
            to,
            value,
        }
    }

    #[test]
    fn test_dex_buy() {
        let logs = vec![transfer_log(TOKEN, POOL, WATCHED, U256::from(500u64))];
        let intents = classify(&tx(WATCHED, Some(ROUTER), U256::ZERO), &logs, &watch());
        assert_eq!(
            intents,
            vec![ActivityIntent {
                actor: WATCHED,
                token: TOKEN,
                tx_hash: TX,
                amount: "500".to_string(),
                direction: Direction::Buy,
                source: IntentSource::TokenTransfer,
            }]
        );
    }

    #[test]
    fn test_dex_sell() {
        let logs = vec![transfer_log(TOKEN, WATCHED, POOL, U256::from(42u64))];
        let intents = classify(&tx(WATCHED, Some(ROUTER), U256::ZERO), &logs, &watch());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].direction, Direction::Sell);
        assert_eq!(intents[0].amount, "42");
    }

    #[test]
    fn test_direct_purchase_ignores_logs() {
        let value = U256::from_str("1000000000000000000").unwrap();
        let intents = classify(&tx(WATCHED, Some(TOKEN), value), &[], &watch());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].token, TOKEN);
        assert_eq!(intents[0].amount, "1000000000000000000");
        assert!(intents[0].direction.is_buy());
        assert_eq!(intents[0].source, IntentSource::DirectPurchase);
    }

    #[test]
    fn test_zero_value_call_to_token_is_not_a_purchase() {
        let intents = classify(&tx(WATCHED, Some(TOKEN), U256::ZERO), &[], &watch());
        assert!(intents.is_empty());
    }

    #[test]
    fn test_unwatched_sender_is_skipped() {
        let logs = vec![transfer_log(TOKEN, POOL, WATCHED, U256::from(500u64))];
        let intents = classify(&tx(POOL, Some(ROUTER), U256::ZERO), &logs, &watch());
        assert!(intents.is_empty());
    }

    #[test]
    fn test_contract_creation_is_skipped() {
        let logs = vec![transfer_log(TOKEN, POOL, WATCHED, U256::from(500u64))];
        let intents = classify(&tx(WATCHED, None, U256::from(1u64)), &logs, &watch());
        assert!(intents.is_empty());
    }

    #[test]
    fn test_filters_untracked_zero_and_third_party_transfers() {
        let untracked = address!("0000000000000000000000000000000000000fff");
        let logs = vec![
            transfer_log(untracked, POOL, WATCHED, U256::from(1u64)),
            transfer_log(TOKEN, POOL, WATCHED, U256::ZERO),
            transfer_log(TOKEN, POOL, ROUTER, U256::from(9u64)),
            RawLog {
                address: TOKEN,
                topics: vec![],
                data: Bytes::new(),
            },
        ];
        let intents = classify(&tx(WATCHED, Some(ROUTER), U256::ZERO), &logs, &watch());
        assert!(intents.is_empty());
    }

    #[test]
    fn test_swap_touching_two_tracked_tokens_yields_both() {
        let logs = vec![
            transfer_log(OTHER_TOKEN, WATCHED, POOL, U256::from(100u64)),
            transfer_log(TOKEN, POOL, WATCHED, U256::from(300u64)),
        ];
        let intents = classify(&tx(WATCHED, Some(ROUTER), U256::ZERO), &logs, &watch());
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].token, OTHER_TOKEN);
        assert_eq!(intents[0].direction, Direction::Sell);
        assert_eq!(intents[1].token, TOKEN);
        assert_eq!(intents[1].direction, Direction::Buy);
    }

    #[test]
    fn test_direct_purchase_and_transfer_in_same_tx() {
        let logs = vec![transfer_log(OTHER_TOKEN, POOL, WATCHED, U256::from(7u64))];
        let intents = classify(&tx(WATCHED, Some(TOKEN), U256::from(5u64)), &logs, &watch());
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].token, TOKEN);
        assert_eq!(intents[1].token, OTHER_TOKEN);
    }
}
