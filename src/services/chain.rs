use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
};
use std::sync::Arc;

/// Receipt lookup seam. The verification engine only ever needs this one
/// call, so tests drive it with a scripted implementation instead of a
/// live RPC endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, ProviderError>;
}

pub struct HttpChainClient {
    provider: Arc<Provider<Http>>,
}

impl HttpChainClient {
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(rpc_url)?);

        // Test connection
        let block_number = provider.get_block_number().await?;
        tracing::info!("Chain RPC connected, current block: {}", block_number);

        Ok(Self { provider })
    }

    pub async fn block_number(&self) -> Result<u64, ProviderError> {
        self.provider.get_block_number().await.map(|n| n.as_u64())
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        self.provider.get_transaction_receipt(tx_hash).await
    }
}
