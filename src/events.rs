//! Total decoders for the two event shapes the tracker understands.
//!
//! Any log that does not match a signature exactly yields `None`; unrelated
//! logs are the common case and are never treated as errors.

use crate::rpc::RawLog;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::Address;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
    event Swap(
        address indexed sender,
        uint256 amount0In,
        uint256 amount1In,
        uint256 amount0Out,
        uint256 amount1Out,
        address indexed to
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    /// Contract that emitted the log.
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    /// Base-10 rendering of the uint256 value.
    pub amount: String,
}

impl TransferEvent {
    pub fn is_zero(&self) -> bool {
        self.amount == "0"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub pair_address: Address,
    pub sender: Address,
    pub amount0_in: String,
    pub amount1_in: String,
    pub amount0_out: String,
    pub amount1_out: String,
    pub to: Address,
}

pub fn decode_transfer(log: &RawLog) -> Option<TransferEvent> {
    if log.topics.first() != Some(&Transfer::SIGNATURE_HASH) {
        return None;
    }
    let decoded = Transfer::decode_raw_log(log.topics.iter().copied(), &log.data).ok()?;
    Some(TransferEvent {
        token_address: log.address,
        from: decoded.from,
        to: decoded.to,
        amount: decoded.value.to_string(),
    })
}

pub fn decode_swap(log: &RawLog) -> Option<SwapEvent> {
    if log.topics.first() != Some(&Swap::SIGNATURE_HASH) {
        return None;
    }
    let decoded = Swap::decode_raw_log(log.topics.iter().copied(), &log.data).ok()?;
    Some(SwapEvent {
        pair_address: log.address,
        sender: decoded.sender,
        amount0_in: decoded.amount0In.to_string(),
        amount1_in: decoded.amount1In.to_string(),
        amount0_out: decoded.amount0Out.to_string(),
        amount1_out: decoded.amount1Out.to_string(),
        to: decoded.to,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::{B256, Bytes, U256, address};

    pub(crate) fn transfer_log(token: Address, from: Address, to: Address, value: U256) -> RawLog {
        RawLog {
            address: token,
            topics: vec![Transfer::SIGNATURE_HASH, from.into_word(), to.into_word()],
            data: Bytes::from(value.to_be_bytes::<32>().to_vec()),
        }
    }

    fn swap_log(pair: Address, sender: Address, to: Address, amounts: [u64; 4]) -> RawLog {
        let mut data = Vec::with_capacity(128);
        for amount in amounts {
            data.extend_from_slice(&U256::from(amount).to_be_bytes::<32>());
        }
        RawLog {
            address: pair,
            topics: vec![Swap::SIGNATURE_HASH, sender.into_word(), to.into_word()],
            data: Bytes::from(data),
        }
    }

    const TOKEN: Address = address!("00000000000000000000000000000000000000bb");
    const POOL: Address = address!("00000000000000000000000000000000000000cc");
    const USER: Address = address!("00000000000000000000000000000000000000aa");

    #[test]
    fn test_decode_transfer() {
        let log = transfer_log(TOKEN, POOL, USER, U256::from(500u64));
        let event = decode_transfer(&log).unwrap();
        assert_eq!(event.token_address, TOKEN);
        assert_eq!(event.from, POOL);
        assert_eq!(event.to, USER);
        assert_eq!(event.amount, "500");
        assert!(decode_swap(&log).is_none());
    }

    #[test]
    fn test_decode_transfer_keeps_full_precision() {
        let log = transfer_log(TOKEN, POOL, USER, U256::MAX);
        let event = decode_transfer(&log).unwrap();
        assert_eq!(event.amount, U256::MAX.to_string());
    }

    #[test]
    fn test_decode_swap() {
        let log = swap_log(POOL, USER, USER, [0, 10, 25, 0]);
        let event = decode_swap(&log).unwrap();
        assert_eq!(event.pair_address, POOL);
        assert_eq!(event.sender, USER);
        assert_eq!(event.amount1_in, "10");
        assert_eq!(event.amount0_out, "25");
        assert!(decode_transfer(&log).is_none());
    }

    #[test]
    fn test_malformed_logs_return_none() {
        let empty = RawLog {
            address: TOKEN,
            topics: vec![],
            data: Bytes::new(),
        };
        assert!(decode_transfer(&empty).is_none());
        assert!(decode_swap(&empty).is_none());

        // Right signature, missing indexed topic
        let mut short_topics = transfer_log(TOKEN, POOL, USER, U256::from(1u64));
        short_topics.topics.pop();
        assert!(decode_transfer(&short_topics).is_none());

        // ERC-721 style transfer carries the id as a fourth topic and no data
        let nft = RawLog {
            address: TOKEN,
            topics: vec![
                Transfer::SIGNATURE_HASH,
                POOL.into_word(),
                USER.into_word(),
                B256::with_last_byte(7),
            ],
            data: Bytes::new(),
        };
        assert!(decode_transfer(&nft).is_none());

        let truncated_swap = RawLog {
            data: Bytes::from(vec![0xff; 40]),
            ..swap_log(POOL, USER, USER, [1, 2, 3, 4])
        };
        assert!(decode_swap(&truncated_swap).is_none());
    }

    #[test]
    fn test_arbitrary_bytes_never_panic() {
        let mut seed: u64 = 0x9e3779b97f4a7c15;
        for round in 0..256usize {
            let mut next = || {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                seed
            };
            let topic_count = (next() % 5) as usize;
            let mut topics: Vec<B256> = (0..topic_count)
                .map(|_| B256::from(U256::from(next()).to_be_bytes::<32>()))
                .collect();
            if round % 3 == 0 && !topics.is_empty() {
                topics[0] = Transfer::SIGNATURE_HASH;
            } else if round % 3 == 1 && !topics.is_empty() {
                topics[0] = Swap::SIGNATURE_HASH;
            }
            let data: Vec<u8> = (0..(next() % 200)).map(|_| next() as u8).collect();
            let log = RawLog {
                address: TOKEN,
                topics,
                data: Bytes::from(data),
            };
            let _ = decode_transfer(&log);
            let _ = decode_swap(&log);
        }
    }
}
