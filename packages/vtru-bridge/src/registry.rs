//! Chain and Contract Registry
//!
//! Static mapping from logical chain names to RPC endpoints and native chain
//! IDs, and from logical contract names to their deployed addresses. Built
//! once from [`Config`](crate::config::Config) at startup and shared
//! read-only afterwards.

use alloy::primitives::{address, Address};
use eyre::{eyre, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Polygon PoS mainnet
pub const POLYGON_CHAIN_ID: u64 = 137;
/// Vitruveo mainnet
pub const VITRUVEO_CHAIN_ID: u64 = 1490;

pub const DEFAULT_POLYGON_RPC_URL: &str = "https://polygon-rpc.com";
pub const DEFAULT_VITRUVEO_RPC_URL: &str = "https://rpc.vitruveo.xyz";

pub const POLYGON_USDC_ADDRESS: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");
pub const VITRUVEO_USDC_ADDRESS: Address = address!("bCfB3FCa16b12C7756CD6C24f1cC0AC0E38569CF");
pub const VIA_POLYGON_ADDRESS: Address = address!("dc21D233Cdc853b558B5F7A2e5c0f782d3d0f255");
pub const VIA_VITRUVEO_ADDRESS: Address = address!("5d939506924a07707eda5f1C628030848Fde54Bb");

/// Logical chain name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKey {
    Polygon,
    Vitruveo,
}

impl ChainKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKey::Polygon => "polygon",
            ChainKey::Vitruveo => "vitruveo",
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logical contract name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKey {
    /// wVTRU wrap/unwrap contract (also the wVTRU ERC20)
    WrappedVtru,
    /// USDC on Polygon
    PolygonUsdc,
    /// USDC.pol on Vitruveo
    VitruveoUsdc,
    /// VIA bridge settlement contract on Polygon
    ViaPolygon,
    /// VIA bridge settlement contract on Vitruveo
    ViaVitruveo,
}

impl ContractKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKey::WrappedVtru => "wrapped_vtru",
            ContractKey::PolygonUsdc => "polygon_usdc",
            ContractKey::VitruveoUsdc => "vitruveo_usdc",
            ContractKey::ViaPolygon => "via_polygon",
            ContractKey::ViaVitruveo => "via_vitruveo",
        }
    }

    /// Chain the contract is deployed on
    pub fn chain(&self) -> ChainKey {
        match self {
            ContractKey::PolygonUsdc | ContractKey::ViaPolygon => ChainKey::Polygon,
            ContractKey::WrappedVtru | ContractKey::VitruveoUsdc | ContractKey::ViaVitruveo => {
                ChainKey::Vitruveo
            }
        }
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Endpoint configuration for a single chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub key: ChainKey,
    pub chain_id: u64,
    pub rpc_url: String,
}

/// A deployed contract on a registry chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractRef {
    pub key: ContractKey,
    pub chain: ChainKey,
    pub address: Address,
}

/// Validates that a URL uses http/https and has a host component.
pub fn validate_rpc_url(url_str: &str, name: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url_str).map_err(|e| eyre!("{} must be a valid URL: {}", name, e))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(eyre!(
            "{} must use http:// or https:// scheme, got {}",
            name,
            scheme
        ));
    }

    if parsed.host_str().is_none() {
        return Err(eyre!("{} must have a host component", name));
    }

    if scheme == "http" {
        tracing::warn!(
            "{} uses unencrypted http://; use https:// in production",
            name
        );
    }

    Ok(())
}

/// Immutable chain/contract registry
#[derive(Debug, Clone)]
pub struct Registry {
    chains: HashMap<ChainKey, ChainEntry>,
    contracts: HashMap<ContractKey, Address>,
}

impl Registry {
    /// Build a registry from chain entries and contract addresses, validating both
    pub fn new(chains: Vec<ChainEntry>, contracts: Vec<(ContractKey, Address)>) -> Result<Self> {
        let registry = Self {
            chains: chains.into_iter().map(|c| (c.key, c)).collect(),
            contracts: contracts.into_iter().collect(),
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Production registry with the given RPC URLs and optional wrap contract
    pub fn mainnet(
        polygon_rpc_url: &str,
        vitruveo_rpc_url: &str,
        wrap_contract: Option<Address>,
    ) -> Result<Self> {
        let mut contracts = vec![
            (ContractKey::PolygonUsdc, POLYGON_USDC_ADDRESS),
            (ContractKey::VitruveoUsdc, VITRUVEO_USDC_ADDRESS),
            (ContractKey::ViaPolygon, VIA_POLYGON_ADDRESS),
            (ContractKey::ViaVitruveo, VIA_VITRUVEO_ADDRESS),
        ];
        if let Some(wrap) = wrap_contract {
            contracts.push((ContractKey::WrappedVtru, wrap));
        }

        Self::new(
            vec![
                ChainEntry {
                    key: ChainKey::Polygon,
                    chain_id: POLYGON_CHAIN_ID,
                    rpc_url: polygon_rpc_url.to_string(),
                },
                ChainEntry {
                    key: ChainKey::Vitruveo,
                    chain_id: VITRUVEO_CHAIN_ID,
                    rpc_url: vitruveo_rpc_url.to_string(),
                },
            ],
            contracts,
        )
    }

    /// Validate every chain entry
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashMap::new();
        for chain in self.chains.values() {
            let name = format!("{}_RPC_URL", chain.key.as_str().to_uppercase());
            validate_rpc_url(&chain.rpc_url, &name)?;

            if chain.chain_id == 0 {
                return Err(eyre!("Chain ID is 0 for chain {}", chain.key));
            }
            if let Some(other) = seen.insert(chain.chain_id, chain.key) {
                return Err(eyre!(
                    "Chain ID {} is used by both {} and {}",
                    chain.chain_id,
                    other,
                    chain.key
                ));
            }
        }

        for (key, address) in &self.contracts {
            if !self.chains.contains_key(&key.chain()) {
                return Err(eyre!(
                    "Contract {} is deployed on {} which is not configured",
                    key,
                    key.chain()
                ));
            }
            if address.is_zero() {
                return Err(eyre!("Contract {} has the zero address", key));
            }
        }

        Ok(())
    }

    /// Get chain entry by logical name
    pub fn chain(&self, key: ChainKey) -> Result<&ChainEntry> {
        self.chains
            .get(&key)
            .ok_or_else(|| eyre!("Chain {} is not configured", key))
    }

    /// Get chain entry by native chain ID
    pub fn chain_by_id(&self, chain_id: u64) -> Option<&ChainEntry> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    /// All configured chains
    pub fn chains(&self) -> impl Iterator<Item = &ChainEntry> {
        self.chains.values()
    }

    /// Resolve a contract to its chain and address
    pub fn contract(&self, key: ContractKey) -> Result<ContractRef> {
        let address = self.contracts.get(&key).copied().ok_or_else(|| match key {
            ContractKey::WrappedVtru => {
                eyre!("Wrap contract address not configured (set WRAP_CONTRACT_ADDRESS)")
            }
            _ => eyre!("Contract {} is not configured", key),
        })?;
        Ok(ContractRef {
            key,
            chain: key.chain(),
            address,
        })
    }

    pub fn has_contract(&self, key: ContractKey) -> bool {
        self.contracts.contains_key(&key)
    }
}
