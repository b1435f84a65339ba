//! Common types shared by the synchronizer, orchestrator and HTTP API

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::amount::{format_units_fixed, Asset, TokenAmount, USDC, USDC_POL, VTRU, WVTRU};
use crate::registry::{ChainKey, ContractKey};

// ============================================================================
// Flows and Holdings
// ============================================================================

/// Which pair of balances a view works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    /// VTRU <-> wVTRU on Vitruveo
    Wrap,
    /// USDC (Polygon) <-> USDC.pol (Vitruveo)
    Bridge,
}

impl Flow {
    /// Holdings tracked for this flow, in display order
    pub fn holdings(&self) -> [Holding; 2] {
        match self {
            Flow::Wrap => [Holding::WrappedVtru, Holding::NativeVtru],
            Flow::Bridge => [Holding::PolygonUsdc, Holding::VitruveoUsdc],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::Wrap => "wrap",
            Flow::Bridge => "bridge",
        }
    }
}

impl FromStr for Flow {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wrap" => Ok(Flow::Wrap),
            "bridge" => Ok(Flow::Bridge),
            other => Err(eyre::eyre!("Unknown flow '{}', expected wrap or bridge", other)),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A balance the connected account holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holding {
    /// wVTRU on Vitruveo
    WrappedVtru,
    /// Native VTRU on Vitruveo
    NativeVtru,
    /// USDC on Polygon
    PolygonUsdc,
    /// USDC.pol on Vitruveo
    VitruveoUsdc,
}

impl Holding {
    pub fn asset(&self) -> Asset {
        match self {
            Holding::WrappedVtru => WVTRU,
            Holding::NativeVtru => VTRU,
            Holding::PolygonUsdc => USDC,
            Holding::VitruveoUsdc => USDC_POL,
        }
    }

    pub fn chain(&self) -> ChainKey {
        match self {
            Holding::PolygonUsdc => ChainKey::Polygon,
            Holding::WrappedVtru | Holding::NativeVtru | Holding::VitruveoUsdc => {
                ChainKey::Vitruveo
            }
        }
    }

    /// ERC20 contract backing the holding; `None` for the native asset
    pub fn token(&self) -> Option<ContractKey> {
        match self {
            Holding::WrappedVtru => Some(ContractKey::WrappedVtru),
            Holding::NativeVtru => None,
            Holding::PolygonUsdc => Some(ContractKey::PolygonUsdc),
            Holding::VitruveoUsdc => Some(ContractKey::VitruveoUsdc),
        }
    }

    /// Bridge contract that must be approved to spend this holding
    pub fn bridge_spender(&self) -> Option<ContractKey> {
        match self {
            Holding::PolygonUsdc => Some(ContractKey::ViaPolygon),
            Holding::VitruveoUsdc => Some(ContractKey::ViaVitruveo),
            Holding::WrappedVtru | Holding::NativeVtru => None,
        }
    }
}

// ============================================================================
// Direction
// ============================================================================

/// Swap direction, toggled only by explicit user action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Unwrap: wVTRU -> VTRU
    WrappedToUnwrapped,
    /// Wrap: VTRU -> wVTRU
    UnwrappedToWrapped,
    /// Bridge USDC from Polygon to Vitruveo
    PolygonToVitruveo,
    /// Bridge USDC.pol from Vitruveo to Polygon
    VitruveoToPolygon,
}

impl Direction {
    pub fn flow(&self) -> Flow {
        match self {
            Direction::WrappedToUnwrapped | Direction::UnwrappedToWrapped => Flow::Wrap,
            Direction::PolygonToVitruveo | Direction::VitruveoToPolygon => Flow::Bridge,
        }
    }

    /// The opposite direction within the same flow
    pub fn toggled(&self) -> Direction {
        match self {
            Direction::WrappedToUnwrapped => Direction::UnwrappedToWrapped,
            Direction::UnwrappedToWrapped => Direction::WrappedToUnwrapped,
            Direction::PolygonToVitruveo => Direction::VitruveoToPolygon,
            Direction::VitruveoToPolygon => Direction::PolygonToVitruveo,
        }
    }

    /// The holding the operation spends from
    pub fn source(&self) -> Holding {
        match self {
            Direction::WrappedToUnwrapped => Holding::WrappedVtru,
            Direction::UnwrappedToWrapped => Holding::NativeVtru,
            Direction::PolygonToVitruveo => Holding::PolygonUsdc,
            Direction::VitruveoToPolygon => Holding::VitruveoUsdc,
        }
    }

    /// Chain the wallet must be on to submit the operation
    pub fn target_chain(&self) -> ChainKey {
        self.source().chain()
    }

    /// Whether a spending approval may be needed before the primary call
    pub fn requires_approval(&self) -> bool {
        self.flow() == Flow::Bridge
    }

    /// Short verb used in notifications ("Wrap", "Unwrap", "Bridge")
    pub fn operation_name(&self) -> &'static str {
        match self {
            Direction::WrappedToUnwrapped => "Unwrap",
            Direction::UnwrappedToWrapped => "Wrap",
            Direction::PolygonToVitruveo | Direction::VitruveoToPolygon => "Bridge",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::WrappedToUnwrapped => "wrapped_to_unwrapped",
            Direction::UnwrappedToWrapped => "unwrapped_to_wrapped",
            Direction::PolygonToVitruveo => "polygon_to_vitruveo",
            Direction::VitruveoToPolygon => "vitruveo_to_polygon",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Balance of one holding at capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldingBalance {
    pub holding: Holding,
    pub amount: TokenAmount,
}

/// Amount a holding's owner has authorized a bridge contract to spend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowanceSnapshot {
    pub holding: Holding,
    pub spender: Address,
    pub granted: TokenAmount,
}

/// Balances (and allowances, for the bridge flow) of one account at one moment
///
/// Only valid for `account`; a new account means a new zeroed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSnapshot {
    pub account: Option<Address>,
    pub flow: Flow,
    pub balances: Vec<HoldingBalance>,
    pub allowances: Vec<AllowanceSnapshot>,
    pub captured_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// All-zero snapshot for the given account (or no account)
    pub fn zeroed(flow: Flow, account: Option<Address>) -> Self {
        Self {
            account,
            flow,
            balances: flow
                .holdings()
                .into_iter()
                .map(|holding| HoldingBalance {
                    holding,
                    amount: TokenAmount::zero(holding.asset().decimals),
                })
                .collect(),
            allowances: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    /// Balance of a holding, zero when not tracked
    pub fn balance(&self, holding: Holding) -> TokenAmount {
        self.balances
            .iter()
            .find(|b| b.holding == holding)
            .map(|b| b.amount.clone())
            .unwrap_or_else(|| TokenAmount::zero(holding.asset().decimals))
    }

    /// Spendable base units for a direction's source holding
    pub fn available(&self, direction: Direction) -> U256 {
        self.balance(direction.source()).raw
    }

    pub fn allowance(&self, holding: Holding) -> Option<&AllowanceSnapshot> {
        self.allowances.iter().find(|a| a.holding == holding)
    }

    /// True when every tracked balance is zero
    pub fn is_empty(&self) -> bool {
        self.balances.iter().all(|b| b.amount.is_zero())
    }
}

// ============================================================================
// Circuit Breaker / Wrap Limits
// ============================================================================

/// Average Vitruveo block time in seconds
pub const VITRUVEO_BLOCK_SECONDS: u64 = 5;

/// Raw circuit breaker state read from the wrap contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CircuitBreakerInfo {
    /// VTRU price in US cents
    pub price_cents: U256,
    pub total_epoch_wrap_limit: U256,
    pub user_period_wrap_limit: U256,
    pub user_period_blocks: U256,
    pub total_wrapped: U256,
    pub total_epoch_wrapped: U256,
}

/// Per-account wrap bookkeeping read from the wrap contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserWrapInfo {
    pub last_wrap_block: u128,
    pub next_wrap_block: u128,
}

/// Display-ready wrap limits for the circuit breaker panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapLimits {
    /// VTRU price in USD with two decimals
    pub price_usd: String,
    pub total_epoch_wrap_limit: u128,
    pub user_period_wrap_limit: u128,
    /// User cooldown period in whole hours
    pub user_period_hours: u128,
    pub total_wrapped: u128,
    pub total_epoch_wrapped: u128,
    pub next_epoch_block: u128,
    pub user: Option<UserWrapInfo>,
}

impl WrapLimits {
    pub fn from_parts(
        info: CircuitBreakerInfo,
        next_epoch_block: U256,
        user: Option<UserWrapInfo>,
    ) -> Self {
        let period_blocks = to_u128_saturating(info.user_period_blocks);
        Self {
            price_usd: format_units_fixed(info.price_cents, 2, 2),
            total_epoch_wrap_limit: to_u128_saturating(info.total_epoch_wrap_limit),
            user_period_wrap_limit: to_u128_saturating(info.user_period_wrap_limit),
            user_period_hours: period_blocks.saturating_mul(VITRUVEO_BLOCK_SECONDS as u128) / 3600,
            total_wrapped: to_u128_saturating(info.total_wrapped),
            total_epoch_wrapped: to_u128_saturating(info.total_epoch_wrapped),
            next_epoch_block: to_u128_saturating(next_epoch_block),
            user,
        }
    }
}

/// Convert U256 to u128, clamping values that do not fit
pub fn to_u128_saturating(value: U256) -> u128 {
    value.try_into().unwrap_or(u128::MAX)
}
