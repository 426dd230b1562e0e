use anyhow::{Context, Result};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, U256},
};
use std::sync::Arc;

// Read-only ERC-20 surface for the pre-settlement balance check.
abigen!(
    IERC20,
    r#"[
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

/// The buyer's on-chain identity: a local signing key plus a read-only
/// provider. Transfers themselves are executed by the facilitator from the
/// signed authorization, so no signer middleware is needed here.
pub struct WalletClient {
    wallet: LocalWallet,
    provider: Arc<Provider<Http>>,
}

impl WalletClient {
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(rpc_url)?);

        let wallet = private_key
            .parse::<LocalWallet>()
            .context("Invalid private key")?
            .with_chain_id(chain_id);

        Ok(Self { wallet, provider })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.wallet
    }

    pub async fn token_balance(&self, token: Address) -> Result<U256> {
        let erc20 = IERC20::new(token, self.provider.clone());
        let balance = erc20.balance_of(self.address()).call().await?;
        Ok(balance)
    }
}
