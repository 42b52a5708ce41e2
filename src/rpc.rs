use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::TransactionResponse;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::BlockNumberOrTag;
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::{Context, Result};
use std::future::Future;

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

/// The subset of a transaction the classifier looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: B256,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Read-only view of one JSON-RPC endpoint.
pub trait ChainRpc: Clone + Send + Sync + 'static {
    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    fn block_transaction_hashes(&self, height: u64)
    -> impl Future<Output = Result<Vec<B256>>> + Send;

    fn transaction(&self, hash: B256) -> impl Future<Output = Result<ChainTransaction>> + Send;

    /// Logs from the transaction's receipt.
    fn transaction_logs(&self, hash: B256) -> impl Future<Output = Result<Vec<RawLog>>> + Send;
}

/// HTTP endpoint backed by an alloy provider.
#[derive(Clone)]
pub struct AlloyEndpoint {
    provider: AlloyFullProvider,
}

impl AlloyEndpoint {
    pub fn new(url: &str) -> Result<Self> {
        let parsed_url = url
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
        let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
        Ok(AlloyEndpoint { provider })
    }
}

impl ChainRpc for AlloyEndpoint {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_transaction_hashes(&self, height: u64) -> Result<Vec<B256>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(height))
            .await?
            .with_context(|| format!("Block {height} not found"))?;
        Ok(block.transactions.hashes().collect())
    }

    async fn transaction(&self, hash: B256) -> Result<ChainTransaction> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await?
            .with_context(|| format!("Transaction {hash:?} not found"))?;
        Ok(ChainTransaction {
            hash,
            from: TransactionResponse::from(&tx),
            to: ConsensusTransaction::to(&tx),
            value: ConsensusTransaction::value(&tx),
        })
    }

    async fn transaction_logs(&self, hash: B256) -> Result<Vec<RawLog>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await?
            .with_context(|| format!("Receipt for {hash:?} not found"))?;
        let logs = receipt
            .inner
            .logs()
            .iter()
            .map(|log| RawLog {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
            })
            .collect();
        Ok(logs)
    }
}
