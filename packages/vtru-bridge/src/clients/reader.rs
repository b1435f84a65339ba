//! Read Client
//!
//! Read-only contract calls against the registry chains. One HTTP provider is
//! constructed per chain when the reader is built and reused for every call.

use alloy::{
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::collections::HashMap;
use tracing::info;

use crate::contracts::{WrappedVtru, ERC20};
use crate::registry::{ChainKey, ContractRef, Registry};
use crate::types::{to_u128_saturating, CircuitBreakerInfo, UserWrapInfo};

/// Read-only view of contract state
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// Native asset balance of `account` on `chain`
    async fn native_balance(&self, chain: ChainKey, account: Address) -> Result<U256>;

    /// ERC20 balance of `account`
    async fn token_balance(&self, token: ContractRef, account: Address) -> Result<U256>;

    /// ERC20 allowance granted by `owner` to `spender`
    async fn allowance(&self, token: ContractRef, owner: Address, spender: Address)
        -> Result<U256>;

    /// Circuit breaker state of the wrap contract
    async fn circuit_breaker(&self, wrap: ContractRef) -> Result<CircuitBreakerInfo>;

    /// First block of the next wrap epoch
    async fn epoch_next_block(&self, wrap: ContractRef) -> Result<U256>;

    /// Per-account wrap bookkeeping
    async fn user_wrap_info(&self, wrap: ContractRef, account: Address) -> Result<UserWrapInfo>;

    /// Chain ID reported by the chain's RPC endpoint
    async fn chain_id(&self, chain: ChainKey) -> Result<u64>;
}

/// alloy-backed reader with one provider per chain
pub struct EvmReader {
    providers: HashMap<ChainKey, RootProvider<Http<Client>>>,
}

impl EvmReader {
    /// Create providers for every chain in the registry
    pub fn new(registry: &Registry) -> Result<Self> {
        let mut providers = HashMap::new();
        for chain in registry.chains() {
            let url = chain
                .rpc_url
                .parse()
                .wrap_err_with(|| format!("Invalid RPC URL: {}", chain.rpc_url))?;
            providers.insert(chain.key, ProviderBuilder::new().on_http(url));

            info!(
                chain = %chain.key,
                chain_id = chain.chain_id,
                rpc_url = %chain.rpc_url,
                "Created read-only provider"
            );
        }
        Ok(Self { providers })
    }

    fn provider(&self, chain: ChainKey) -> Result<&RootProvider<Http<Client>>> {
        self.providers
            .get(&chain)
            .ok_or_else(|| eyre!("No provider for chain {}", chain))
    }
}

#[async_trait]
impl ContractReader for EvmReader {
    async fn native_balance(&self, chain: ChainKey, account: Address) -> Result<U256> {
        let balance = self
            .provider(chain)?
            .get_balance(account)
            .await
            .map_err(|e| eyre!("Failed to get native balance on {}: {}", chain, e))?;
        Ok(balance)
    }

    async fn token_balance(&self, token: ContractRef, account: Address) -> Result<U256> {
        let contract = ERC20::new(token.address, self.provider(token.chain)?);
        let balance = contract
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| eyre!("Failed to get {} balance: {}", token.key, e))?;
        Ok(balance._0)
    }

    async fn allowance(
        &self,
        token: ContractRef,
        owner: Address,
        spender: Address,
    ) -> Result<U256> {
        let contract = ERC20::new(token.address, self.provider(token.chain)?);
        let allowance = contract
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| eyre!("Failed to get {} allowance: {}", token.key, e))?;
        Ok(allowance._0)
    }

    async fn circuit_breaker(&self, wrap: ContractRef) -> Result<CircuitBreakerInfo> {
        let contract = WrappedVtru::new(wrap.address, self.provider(wrap.chain)?);
        let info = contract
            .circuitBreakerInfo()
            .call()
            .await
            .map_err(|e| eyre!("Failed to get circuit breaker info: {}", e))?;

        Ok(CircuitBreakerInfo {
            price_cents: info.price,
            total_epoch_wrap_limit: info.totalEpochWrapLimit,
            user_period_wrap_limit: info.userPeriodWrapLimit,
            user_period_blocks: info.userPeriodBlocks,
            total_wrapped: info.totalWrapped,
            total_epoch_wrapped: info.totalEpochWrapped,
        })
    }

    async fn epoch_next_block(&self, wrap: ContractRef) -> Result<U256> {
        let contract = WrappedVtru::new(wrap.address, self.provider(wrap.chain)?);
        let block = contract
            .epochNextBlock()
            .call()
            .await
            .map_err(|e| eyre!("Failed to get next epoch block: {}", e))?;
        Ok(block._0)
    }

    async fn user_wrap_info(&self, wrap: ContractRef, account: Address) -> Result<UserWrapInfo> {
        let contract = WrappedVtru::new(wrap.address, self.provider(wrap.chain)?);
        let info = contract
            .userInfo(account)
            .call()
            .await
            .map_err(|e| eyre!("Failed to get user wrap info: {}", e))?;

        Ok(UserWrapInfo {
            last_wrap_block: to_u128_saturating(info.lastWrapBlock),
            next_wrap_block: to_u128_saturating(info.nextWrapBlock),
        })
    }

    async fn chain_id(&self, chain: ChainKey) -> Result<u64> {
        let chain_id = self.provider(chain)?.get_chain_id().await?;
        Ok(chain_id)
    }
}
