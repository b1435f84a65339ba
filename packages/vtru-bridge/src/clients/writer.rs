//! Write Client
//!
//! Signs and submits state-changing contract calls, then waits for the
//! receipt before returning.
//!
//! # Transaction Building
//!
//! Uses Alloy's `ProviderBuilder::with_recommended_fillers()` to populate
//! nonce, gas limit, fee fields and chain ID. An explicit gas limit in
//! [`Overrides`] takes precedence over the estimated one.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::contracts::{ViaBridge, WrappedVtru, ERC20};
use crate::registry::{ChainKey, ContractRef, Registry};

/// Per-transaction overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Native value to attach (wrap deposits)
    pub value: Option<U256>,
    /// Fixed gas limit instead of estimation
    pub gas_limit: Option<u64>,
}

/// A state-changing contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// `wrap()` with the deposit attached as `overrides.value`
    Wrap {
        contract: ContractRef,
        overrides: Overrides,
    },
    /// `unwrap(amount)`
    Unwrap {
        contract: ContractRef,
        amount: U256,
        overrides: Overrides,
    },
    /// ERC20 `approve(spender, amount)`
    Approve {
        token: ContractRef,
        spender: Address,
        amount: U256,
    },
    /// VIA `bridge(to, amount)`
    Bridge {
        via: ContractRef,
        to: Address,
        amount: U256,
    },
}

impl ContractCall {
    /// Chain the call is submitted on
    pub fn chain(&self) -> ChainKey {
        match self {
            ContractCall::Wrap { contract, .. } | ContractCall::Unwrap { contract, .. } => {
                contract.chain
            }
            ContractCall::Approve { token, .. } => token.chain,
            ContractCall::Bridge { via, .. } => via.chain,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::Wrap { .. } => "wrap",
            ContractCall::Unwrap { .. } => "unwrap",
            ContractCall::Approve { .. } => "approve",
            ContractCall::Bridge { .. } => "bridge",
        }
    }
}

impl fmt::Display for ContractCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.method(), self.chain())
    }
}

/// Confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub chain: ChainKey,
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// Submits calls through a connected signer
#[async_trait]
pub trait ContractWriter: Send + Sync {
    /// Submit `call` and wait for it to be mined; reverted transactions are errors
    async fn submit(&self, call: ContractCall) -> Result<TxReceipt>;
}

/// Send a prepared call builder, wait for its receipt and check the status
macro_rules! send_and_confirm {
    ($call:expr, $chain:expr, $method:expr) => {{
        let pending_tx = $call
            .send()
            .await
            .map_err(|e| eyre!("Failed to send {} tx: {}", $method, e))?;

        let tx_hash = *pending_tx.tx_hash();
        info!(tx_hash = %tx_hash, method = $method, chain = %$chain, "Transaction sent");

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get {} receipt: {}", $method, e))?;

        if !receipt.status() {
            return Err(eyre!("{} transaction 0x{:x} reverted", $method, tx_hash));
        }

        TxReceipt {
            chain: $chain,
            tx_hash: format!("0x{:x}", tx_hash),
            block_number: receipt.block_number,
        }
    }};
}

/// alloy-backed writer signing with a local private key
///
/// A writer built with [`EvmWriter::read_only`] has no signer and fails every
/// submission; it backs watch-only deployments.
pub struct EvmWriter {
    registry: Arc<Registry>,
    signer: Option<PrivateKeySigner>,
}

impl EvmWriter {
    pub fn new(registry: Arc<Registry>, signer: PrivateKeySigner) -> Self {
        info!(signer = %signer.address(), "EVM writer initialized");
        Self {
            registry,
            signer: Some(signer),
        }
    }

    /// Writer without a signer
    pub fn read_only(registry: Arc<Registry>) -> Self {
        info!("EVM writer initialized without signer, submissions disabled");
        Self {
            registry,
            signer: None,
        }
    }

    /// Create from a hex private key (with or without 0x prefix)
    pub fn from_private_key(registry: Arc<Registry>, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;
        Ok(Self::new(registry, signer))
    }

    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }
}

#[async_trait]
impl ContractWriter for EvmWriter {
    async fn submit(&self, call: ContractCall) -> Result<TxReceipt> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| eyre!("No signer configured (set WALLET_PRIVATE_KEY)"))?;
        let chain = call.chain();
        let rpc_url = &self.registry.chain(chain)?.rpc_url;

        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(rpc_url.parse().wrap_err("Invalid RPC URL")?);

        debug!(call = %call, from = %signer.address(), "Submitting contract call");

        let receipt = match call {
            ContractCall::Wrap {
                contract,
                overrides,
            } => {
                let wrap = WrappedVtru::new(contract.address, &provider);
                let mut builder = wrap.wrap();
                if let Some(value) = overrides.value {
                    builder = builder.value(value);
                }
                if let Some(gas) = overrides.gas_limit {
                    builder = builder.gas(gas);
                }
                send_and_confirm!(builder, chain, "wrap")
            }
            ContractCall::Unwrap {
                contract,
                amount,
                overrides,
            } => {
                let wrap = WrappedVtru::new(contract.address, &provider);
                let mut builder = wrap.unwrap(amount);
                if let Some(value) = overrides.value {
                    builder = builder.value(value);
                }
                if let Some(gas) = overrides.gas_limit {
                    builder = builder.gas(gas);
                }
                send_and_confirm!(builder, chain, "unwrap")
            }
            ContractCall::Approve {
                token,
                spender,
                amount,
            } => {
                let erc20 = ERC20::new(token.address, &provider);
                let builder = erc20.approve(spender, amount);
                send_and_confirm!(builder, chain, "approve")
            }
            ContractCall::Bridge { via, to, amount } => {
                let bridge = ViaBridge::new(via.address, &provider);
                let builder = bridge.bridge(to, amount);
                send_and_confirm!(builder, chain, "bridge")
            }
        };

        info!(
            tx_hash = %receipt.tx_hash,
            chain = %receipt.chain,
            block = ?receipt.block_number,
            "Transaction confirmed"
        );

        Ok(receipt)
    }
}
