//! Service configuration
//!
//! Everything is read from the environment, optionally seeded from a `.env`
//! file in the working directory.

use alloy::primitives::{Address, U256};
use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::amount::{parse_units, USDC};
use crate::orchestrator::OrchestratorConfig;
use crate::registry::{
    ChainEntry, ChainKey, ContractKey, Registry, DEFAULT_POLYGON_RPC_URL, DEFAULT_VITRUVEO_RPC_URL,
    POLYGON_CHAIN_ID, POLYGON_USDC_ADDRESS, VIA_POLYGON_ADDRESS, VIA_VITRUVEO_ADDRESS,
    VITRUVEO_CHAIN_ID, VITRUVEO_USDC_ADDRESS,
};
use crate::synchronizer::PollTiming;
use crate::types::Flow;

/// Default flat bridge fee, in USDC
pub const DEFAULT_BRIDGE_FLAT_FEE: &str = "0.25";

#[derive(Clone)]
pub struct Config {
    pub polygon_rpc_url: String,
    pub vitruveo_rpc_url: String,

    /// wVTRU wrap contract; wrap flow operations fail until it is set
    pub wrap_contract_address: Option<Address>,
    pub polygon_usdc_address: Address,
    pub vitruveo_usdc_address: Address,
    pub via_polygon_address: Address,
    pub via_vitruveo_address: Address,

    /// Hex private key used to sign transactions
    pub private_key: Option<String>,
    /// Account to watch when no private key is configured
    pub watch_address: Option<Address>,

    pub flow: Flow,
    pub fast_poll_ms: u64,
    pub slow_poll_ms: u64,

    /// Flat bridge fee in USDC base units
    pub bridge_flat_fee: U256,
    pub wrap_gas_limit: Option<u64>,

    pub api_bind_address: String,
    pub api_port: u16,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("polygon_rpc_url", &self.polygon_rpc_url)
            .field("vitruveo_rpc_url", &self.vitruveo_rpc_url)
            .field("wrap_contract_address", &self.wrap_contract_address)
            .field("polygon_usdc_address", &self.polygon_usdc_address)
            .field("vitruveo_usdc_address", &self.vitruveo_usdc_address)
            .field("via_polygon_address", &self.via_polygon_address)
            .field("via_vitruveo_address", &self.via_vitruveo_address)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("watch_address", &self.watch_address)
            .field("flow", &self.flow)
            .field("fast_poll_ms", &self.fast_poll_ms)
            .field("slow_poll_ms", &self.slow_poll_ms)
            .field("bridge_flat_fee", &self.bridge_flat_fee)
            .field("wrap_gas_limit", &self.wrap_gas_limit)
            .field("api_bind_address", &self.api_bind_address)
            .field("api_port", &self.api_port)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from process environment variables only
    pub fn from_env() -> Result<Self> {
        let bridge_flat_fee = env::var("BRIDGE_FLAT_FEE")
            .unwrap_or_else(|_| DEFAULT_BRIDGE_FLAT_FEE.to_string());
        let bridge_flat_fee = parse_units(&bridge_flat_fee, USDC.decimals)
            .map_err(|e| eyre!("Invalid BRIDGE_FLAT_FEE: {}", e))?;

        Ok(Self {
            polygon_rpc_url: env::var("POLYGON_RPC_URL")
                .unwrap_or_else(|_| DEFAULT_POLYGON_RPC_URL.to_string()),
            vitruveo_rpc_url: env::var("VITRUVEO_RPC_URL")
                .unwrap_or_else(|_| DEFAULT_VITRUVEO_RPC_URL.to_string()),

            wrap_contract_address: optional_address("WRAP_CONTRACT_ADDRESS")?,
            polygon_usdc_address: optional_address("POLYGON_USDC_ADDRESS")?
                .unwrap_or(POLYGON_USDC_ADDRESS),
            vitruveo_usdc_address: optional_address("VITRUVEO_USDC_ADDRESS")?
                .unwrap_or(VITRUVEO_USDC_ADDRESS),
            via_polygon_address: optional_address("VIA_POLYGON_ADDRESS")?
                .unwrap_or(VIA_POLYGON_ADDRESS),
            via_vitruveo_address: optional_address("VIA_VITRUVEO_ADDRESS")?
                .unwrap_or(VIA_VITRUVEO_ADDRESS),

            private_key: env::var("WALLET_PRIVATE_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            watch_address: optional_address("WATCH_ADDRESS")?,

            flow: match env::var("FLOW") {
                Ok(flow) => flow.parse()?,
                Err(_) => Flow::Wrap,
            },
            fast_poll_ms: env::var("FAST_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            slow_poll_ms: env::var("SLOW_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15000),

            bridge_flat_fee,
            wrap_gas_limit: match env::var("WRAP_GAS_LIMIT") {
                Ok(v) => Some(v.trim().parse().map_err(|_| eyre!("Invalid WRAP_GAS_LIMIT"))?),
                Err(_) => None,
            },

            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9095),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.fast_poll_ms == 0 || self.slow_poll_ms == 0 {
            return Err(eyre!("Poll intervals must be greater than zero"));
        }
        if self.fast_poll_ms > self.slow_poll_ms {
            return Err(eyre!(
                "FAST_POLL_MS ({}) must not exceed SLOW_POLL_MS ({})",
                self.fast_poll_ms,
                self.slow_poll_ms
            ));
        }
        if self.wrap_gas_limit == Some(0) {
            return Err(eyre!("WRAP_GAS_LIMIT must be greater than zero"));
        }
        Ok(())
    }

    /// Build the chain/contract registry
    pub fn registry(&self) -> Result<Registry> {
        let mut contracts = vec![
            (ContractKey::PolygonUsdc, self.polygon_usdc_address),
            (ContractKey::VitruveoUsdc, self.vitruveo_usdc_address),
            (ContractKey::ViaPolygon, self.via_polygon_address),
            (ContractKey::ViaVitruveo, self.via_vitruveo_address),
        ];
        if let Some(wrap) = self.wrap_contract_address {
            contracts.push((ContractKey::WrappedVtru, wrap));
        }

        Registry::new(
            vec![
                ChainEntry {
                    key: ChainKey::Polygon,
                    chain_id: POLYGON_CHAIN_ID,
                    rpc_url: self.polygon_rpc_url.clone(),
                },
                ChainEntry {
                    key: ChainKey::Vitruveo,
                    chain_id: VITRUVEO_CHAIN_ID,
                    rpc_url: self.vitruveo_rpc_url.clone(),
                },
            ],
            contracts,
        )
        .wrap_err("Invalid chain registry")
    }

    pub fn poll_timing(&self) -> PollTiming {
        PollTiming {
            fast: Duration::from_millis(self.fast_poll_ms),
            slow: Duration::from_millis(self.slow_poll_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            bridge_fee: self.bridge_flat_fee,
            wrap_gas_limit: self.wrap_gas_limit,
        }
    }
}

fn optional_address(name: &str) -> Result<Option<Address>> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| eyre!("Invalid {}: {}", name, e)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "POLYGON_RPC_URL",
        "VITRUVEO_RPC_URL",
        "WRAP_CONTRACT_ADDRESS",
        "POLYGON_USDC_ADDRESS",
        "VITRUVEO_USDC_ADDRESS",
        "VIA_POLYGON_ADDRESS",
        "VIA_VITRUVEO_ADDRESS",
        "WALLET_PRIVATE_KEY",
        "WATCH_ADDRESS",
        "FLOW",
        "FAST_POLL_MS",
        "SLOW_POLL_MS",
        "BRIDGE_FLAT_FEE",
        "WRAP_GAS_LIMIT",
        "API_BIND_ADDRESS",
        "API_PORT",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.polygon_rpc_url, DEFAULT_POLYGON_RPC_URL);
        assert_eq!(config.vitruveo_rpc_url, DEFAULT_VITRUVEO_RPC_URL);
        assert_eq!(config.flow, Flow::Wrap);
        assert_eq!(config.bridge_flat_fee, U256::from(250_000u64));
        assert_eq!(config.wrap_gas_limit, None);
        assert!(config.wrap_contract_address.is_none());
        assert_eq!(config.poll_timing(), PollTiming::default());
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        env::set_var("FLOW", "bridge");
        env::set_var("BRIDGE_FLAT_FEE", "0");
        env::set_var("WRAP_GAS_LIMIT", "300000");
        env::set_var(
            "WRAP_CONTRACT_ADDRESS",
            "0x00000000000000000000000000000000000000aa",
        );
        env::set_var("FAST_POLL_MS", "1000");

        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.flow, Flow::Bridge);
        assert_eq!(config.bridge_flat_fee, U256::ZERO);
        assert_eq!(config.wrap_gas_limit, Some(300_000));
        assert_eq!(config.fast_poll_ms, 1000);

        let registry = config.registry().unwrap();
        assert!(registry.has_contract(ContractKey::WrappedVtru));
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        clear_env();
        env::set_var("BRIDGE_FLAT_FEE", "0.0000001");
        assert!(Config::from_env().is_err());
        clear_env();

        env::set_var("WATCH_ADDRESS", "0x1234");
        assert!(Config::from_env().is_err());
        clear_env();

        env::set_var("FLOW", "swap");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_validate_poll_ordering() {
        clear_env();
        let mut config = Config::from_env().unwrap();
        config.fast_poll_ms = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_debug_redacts_private_key() {
        clear_env();
        let mut config = Config::from_env().unwrap();
        config.private_key = Some("0xdeadbeef".to_string());
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("deadbeef"));
    }
}
