//! Wallet collaborator
//!
//! Tracks the connected account and the chain the wallet is currently
//! pointed at. Account changes are broadcast on a `watch` channel so the
//! balance synchronizer can invalidate its snapshot.

use alloy::primitives::Address;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::info;

use crate::clients::reader::ContractReader;
use crate::registry::Registry;

/// Connected-account and active-chain state of the user's wallet
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Currently connected account, `None` when disconnected
    fn current_account(&self) -> Option<Address>;

    /// Subscribe to account changes
    fn subscribe_account(&self) -> watch::Receiver<Option<Address>>;

    /// Whether the wallet is currently on `chain_id`
    async fn is_on_chain(&self, chain_id: u64) -> bool;

    /// Switch the wallet to `chain_id`, resolving once the switch is confirmed
    async fn switch_to(&self, chain_id: u64) -> Result<()>;
}

/// Wallet backed by a locally held account
///
/// `switch_to` accepts only registry chains and confirms the chain's RPC
/// endpoint reports the expected chain ID before marking it active.
pub struct LocalWallet<R> {
    registry: Arc<Registry>,
    reader: Arc<R>,
    account: watch::Sender<Option<Address>>,
    active_chain: RwLock<Option<u64>>,
}

impl<R: ContractReader> LocalWallet<R> {
    pub fn new(registry: Arc<Registry>, reader: Arc<R>) -> Self {
        let (account, _) = watch::channel(None);
        Self {
            registry,
            reader,
            account,
            active_chain: RwLock::new(None),
        }
    }

    /// Connect an account; replaces any previously connected one
    pub fn connect(&self, address: Address) {
        let previous = self.account.send_replace(Some(address));
        if previous != Some(address) {
            info!(account = %address, "Wallet connected");
        }
    }

    /// Disconnect the current account
    pub fn disconnect(&self) {
        if let Some(previous) = self.account.send_replace(None) {
            info!(account = %previous, "Wallet disconnected");
        }
    }

    /// Native chain ID the wallet is on, if any chain has been selected
    pub async fn active_chain(&self) -> Option<u64> {
        *self.active_chain.read().await
    }
}

#[async_trait]
impl<R: ContractReader> Wallet for LocalWallet<R> {
    fn current_account(&self) -> Option<Address> {
        *self.account.borrow()
    }

    fn subscribe_account(&self) -> watch::Receiver<Option<Address>> {
        self.account.subscribe()
    }

    async fn is_on_chain(&self, chain_id: u64) -> bool {
        *self.active_chain.read().await == Some(chain_id)
    }

    async fn switch_to(&self, chain_id: u64) -> Result<()> {
        let chain = self
            .registry
            .chain_by_id(chain_id)
            .ok_or_else(|| eyre!("Chain {} is not supported", chain_id))?;

        let reported = self.reader.chain_id(chain.key).await?;
        if reported != chain_id {
            return Err(eyre!(
                "RPC for {} reports chain ID {}, expected {}",
                chain.key,
                reported,
                chain_id
            ));
        }

        *self.active_chain.write().await = Some(chain_id);
        info!(chain = %chain.key, chain_id = chain_id, "Switched wallet chain");
        Ok(())
    }
}
