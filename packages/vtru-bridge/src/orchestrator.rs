//! Swap/Bridge Orchestrator
//!
//! Validates a user-entered amount against the latest [`BalanceSnapshot`] and
//! sequences the writes for one wrap, unwrap or bridge operation:
//!
//! 1. Switch the wallet to the direction's source chain if needed
//! 2. Bridge only: read the allowance and approve the VIA contract when it is
//!    short of the requested amount
//! 3. Submit the primary call and wait for confirmation
//!
//! Steps run strictly in order; the first failure aborts the rest. Only one
//! operation may be in flight per orchestrator, and the in-flight flag is
//! published on a `watch` channel so the synchronizer can poll faster.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::amount::{format_units, parse_units, AmountError, TokenAmount};
use crate::clients::{ContractCall, ContractReader, ContractWriter, Overrides, TxReceipt, Wallet};
use crate::registry::{ContractKey, Registry};
use crate::types::{BalanceSnapshot, Direction, Flow};

/// Default flat bridge fee: 0.25 USDC in base units
pub const DEFAULT_BRIDGE_FEE: u64 = 250_000;

/// Orchestrator tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Flat fee deducted from the spendable balance on bridge directions
    pub bridge_fee: U256,
    /// Fixed gas limit for wrap/unwrap; estimated when `None`
    pub wrap_gas_limit: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bridge_fee: U256::from(DEFAULT_BRIDGE_FEE),
            wrap_gas_limit: None,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("amount must be greater than zero")]
    Zero,

    #[error("amount {requested} exceeds available balance {available}")]
    ExceedsBalance { requested: String, available: String },

    #[error("amount must be greater than the bridge fee of {fee}")]
    AtOrBelowFee { fee: String },

    #[error("direction {direction} does not belong to the {flow} flow")]
    FlowMismatch { direction: Direction, flow: Flow },
}

/// Check `amount` (source base units) against the snapshot
///
/// Uses the snapshot as-is; staleness up to one poll interval is accepted.
pub fn check_amount(
    amount: U256,
    direction: Direction,
    snapshot: &BalanceSnapshot,
    bridge_fee: U256,
) -> Result<(), ValidationError> {
    if direction.flow() != snapshot.flow {
        return Err(ValidationError::FlowMismatch {
            direction,
            flow: snapshot.flow,
        });
    }
    if amount.is_zero() {
        return Err(ValidationError::Zero);
    }

    let decimals = direction.source().asset().decimals;
    let available = snapshot.available(direction);

    let threshold = if direction.flow() == Flow::Bridge {
        if amount <= bridge_fee {
            return Err(ValidationError::AtOrBelowFee {
                fee: format_units(bridge_fee, decimals),
            });
        }
        available.saturating_sub(bridge_fee)
    } else {
        available
    };

    if amount > threshold {
        return Err(ValidationError::ExceedsBalance {
            requested: format_units(amount, decimals),
            available: format_units(threshold, decimals),
        });
    }

    Ok(())
}

/// Boolean form of [`check_amount`]
pub fn validate(
    amount: U256,
    direction: Direction,
    snapshot: &BalanceSnapshot,
    bridge_fee: U256,
) -> bool {
    check_amount(amount, direction, snapshot, bridge_fee).is_ok()
}

/// Parse a pending decimal string into the source asset's base units
pub fn parse_amount(input: &str, direction: Direction) -> Result<U256, ValidationError> {
    Ok(parse_units(input, direction.source().asset().decimals)?)
}

// ============================================================================
// Results
// ============================================================================

/// Why an operation did not complete
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("another operation is already in flight")]
    Busy,

    #[error("invalid amount: {0}")]
    Invalid(#[from] ValidationError),

    #[error("no wallet account connected")]
    NotConnected,

    #[error("configuration error: {0}")]
    Config(eyre::Report),

    #[error("failed to switch wallet to chain {chain_id}: {cause}")]
    ChainSwitch { chain_id: u64, cause: eyre::Report },

    #[error("failed to read allowance: {0}")]
    Allowance(eyre::Report),

    #[error("approval failed: {0}")]
    Approval(eyre::Report),

    #[error("{operation} failed: {cause}")]
    Submit {
        operation: &'static str,
        cause: eyre::Report,
    },
}

/// Confirmed operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationReceipt {
    pub direction: Direction,
    pub amount: TokenAmount,
    /// Approval submitted before the primary call, if one was needed
    pub approval: Option<TxReceipt>,
    pub transaction: TxReceipt,
}

#[derive(Debug)]
pub enum OperationResult {
    /// All steps confirmed
    Success(OperationReceipt),
    /// A step was attempted and failed
    Failure(OperationError),
    /// Nothing was submitted
    Rejected(OperationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Success,
    Error,
    Warning,
}

/// User-facing message for an operation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub status: NotificationStatus,
    pub title: String,
    pub description: String,
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }

    pub fn receipt(&self) -> Option<&OperationReceipt> {
        match self {
            OperationResult::Success(receipt) => Some(receipt),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            OperationResult::Success(_) => None,
            OperationResult::Failure(e) | OperationResult::Rejected(e) => Some(e),
        }
    }

    /// Generic notification; write failures never reveal which step failed
    pub fn notification(&self, direction: Direction) -> Notification {
        let operation = direction.operation_name();
        match self {
            OperationResult::Success(_) => Notification {
                status: NotificationStatus::Success,
                title: format!("{} Successful", operation),
                description: match direction {
                    Direction::UnwrappedToWrapped => {
                        "You have successfully wrapped your VTRU.".to_string()
                    }
                    Direction::WrappedToUnwrapped => {
                        "You have successfully unwrapped your wVTRU.".to_string()
                    }
                    Direction::PolygonToVitruveo | Direction::VitruveoToPolygon => {
                        "You have successfully bridged your USDC.".to_string()
                    }
                },
            },
            OperationResult::Failure(_) => Notification {
                status: NotificationStatus::Error,
                title: format!("{} Failed", operation),
                description: match direction.flow() {
                    Flow::Wrap => format!(
                        "The {} failed due to circuit breaker constraints.",
                        operation.to_lowercase()
                    ),
                    Flow::Bridge => "The bridge failed. Please try again.".to_string(),
                },
            },
            OperationResult::Rejected(e) => Notification {
                status: NotificationStatus::Warning,
                title: format!("{} Not Submitted", operation),
                description: match e {
                    OperationError::Busy => {
                        "Please wait for the pending transaction to complete.".to_string()
                    }
                    OperationError::NotConnected => "Connect a wallet to continue.".to_string(),
                    other => format!("{}.", capitalize(&other.to_string())),
                },
            },
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Clears the in-flight flag on every exit path
struct InFlightGuard<'a> {
    busy: &'a watch::Sender<bool>,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(busy: &'a watch::Sender<bool>) -> Option<Self> {
        let acquired = busy.send_if_modified(|in_flight| {
            if *in_flight {
                false
            } else {
                *in_flight = true;
                true
            }
        });
        acquired.then_some(Self { busy })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.busy.send_replace(false);
    }
}

/// Sequences wrap/unwrap/bridge writes for the connected account
pub struct SwapOrchestrator<R, W, X> {
    registry: Arc<Registry>,
    wallet: Arc<W>,
    reader: Arc<R>,
    writer: Arc<X>,
    config: OrchestratorConfig,
    busy: watch::Sender<bool>,
}

impl<R, W, X> SwapOrchestrator<R, W, X>
where
    R: ContractReader,
    W: Wallet,
    X: ContractWriter,
{
    pub fn new(
        registry: Arc<Registry>,
        wallet: Arc<W>,
        reader: Arc<R>,
        writer: Arc<X>,
        config: OrchestratorConfig,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            registry,
            wallet,
            reader,
            writer,
            config,
            busy,
        }
    }

    /// In-flight flag updates
    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    pub fn is_in_flight(&self) -> bool {
        *self.busy.borrow()
    }

    /// Validate against the snapshot using the configured bridge fee
    pub fn check(
        &self,
        amount: U256,
        direction: Direction,
        snapshot: &BalanceSnapshot,
    ) -> Result<(), ValidationError> {
        check_amount(amount, direction, snapshot, self.config.bridge_fee)
    }

    pub fn validate(&self, amount: U256, direction: Direction, snapshot: &BalanceSnapshot) -> bool {
        self.check(amount, direction, snapshot).is_ok()
    }

    /// Parse and validate `input`, then execute it
    pub async fn submit(
        &self,
        input: &str,
        direction: Direction,
        snapshot: &BalanceSnapshot,
    ) -> OperationResult {
        let amount = match parse_amount(input, direction)
            .and_then(|amount| self.check(amount, direction, snapshot).map(|_| amount))
        {
            Ok(amount) => amount,
            Err(e) => {
                warn!(direction = %direction, input = input, error = %e, "Rejected invalid amount");
                return OperationResult::Rejected(OperationError::Invalid(e));
            }
        };
        self.execute(amount, direction).await
    }

    /// Run the write sequence for `amount` base units of the source asset
    pub async fn execute(&self, amount: U256, direction: Direction) -> OperationResult {
        let Some(_guard) = InFlightGuard::acquire(&self.busy) else {
            warn!(direction = %direction, "Operation already in flight, rejecting");
            return OperationResult::Rejected(OperationError::Busy);
        };

        if amount.is_zero() {
            return OperationResult::Rejected(OperationError::Invalid(ValidationError::Zero));
        }

        let Some(account) = self.wallet.current_account() else {
            return OperationResult::Rejected(OperationError::NotConnected);
        };

        let decimals = direction.source().asset().decimals;
        info!(
            direction = %direction,
            account = %account,
            amount = %format_units(amount, decimals),
            "Starting operation"
        );

        match self.run_steps(account, amount, direction).await {
            Ok((approval, transaction)) => {
                info!(
                    direction = %direction,
                    tx_hash = %transaction.tx_hash,
                    "Operation confirmed"
                );
                OperationResult::Success(OperationReceipt {
                    direction,
                    amount: TokenAmount::new(amount, decimals),
                    approval,
                    transaction,
                })
            }
            Err(e) => {
                error!(direction = %direction, error = %e, "Operation failed");
                OperationResult::Failure(e)
            }
        }
    }

    async fn run_steps(
        &self,
        account: Address,
        amount: U256,
        direction: Direction,
    ) -> Result<(Option<TxReceipt>, TxReceipt), OperationError> {
        // (a) chain switch
        let chain_id = self
            .registry
            .chain(direction.target_chain())
            .map_err(OperationError::Config)?
            .chain_id;
        if !self.wallet.is_on_chain(chain_id).await {
            info!(chain_id = chain_id, "Switching wallet chain");
            self.wallet
                .switch_to(chain_id)
                .await
                .map_err(|cause| OperationError::ChainSwitch { chain_id, cause })?;
        }

        // (b) approval
        let approval = if direction.requires_approval() {
            self.ensure_allowance(account, amount, direction).await?
        } else {
            None
        };

        // (c) primary call
        let call = self.primary_call(account, amount, direction)?;
        let transaction = self
            .writer
            .submit(call)
            .await
            .map_err(|cause| OperationError::Submit {
                operation: direction.operation_name(),
                cause,
            })?;

        Ok((approval, transaction))
    }

    /// Approve the VIA spender for `amount` when the allowance is short.
    /// VIA takes its flat fee out of `amount` (`FiatTokenBridged` reports
    /// `amount`, `bridgeAmount` and `fee`), so the approval excludes the fee.
    async fn ensure_allowance(
        &self,
        account: Address,
        amount: U256,
        direction: Direction,
    ) -> Result<Option<TxReceipt>, OperationError> {
        let source = direction.source();
        let (Some(token), Some(spender)) = (source.token(), source.bridge_spender()) else {
            return Ok(None);
        };
        let token = self
            .registry
            .contract(token)
            .map_err(OperationError::Config)?;
        let spender = self
            .registry
            .contract(spender)
            .map_err(OperationError::Config)?
            .address;

        let granted = self
            .reader
            .allowance(token, account, spender)
            .await
            .map_err(OperationError::Allowance)?;
        if granted >= amount {
            return Ok(None);
        }

        info!(
            token = %token.key,
            spender = %spender,
            granted = %granted,
            amount = %amount,
            "Allowance short, submitting approval"
        );
        let receipt = self
            .writer
            .submit(ContractCall::Approve {
                token,
                spender,
                amount,
            })
            .await
            .map_err(OperationError::Approval)?;
        Ok(Some(receipt))
    }

    fn primary_call(
        &self,
        account: Address,
        amount: U256,
        direction: Direction,
    ) -> Result<ContractCall, OperationError> {
        let contract = |key| self.registry.contract(key).map_err(OperationError::Config);

        Ok(match direction {
            Direction::UnwrappedToWrapped => ContractCall::Wrap {
                contract: contract(ContractKey::WrappedVtru)?,
                overrides: Overrides {
                    value: Some(amount),
                    gas_limit: self.config.wrap_gas_limit,
                },
            },
            Direction::WrappedToUnwrapped => ContractCall::Unwrap {
                contract: contract(ContractKey::WrappedVtru)?,
                amount,
                overrides: Overrides {
                    value: None,
                    gas_limit: self.config.wrap_gas_limit,
                },
            },
            Direction::PolygonToVitruveo => ContractCall::Bridge {
                via: contract(ContractKey::ViaPolygon)?,
                to: account,
                amount,
            },
            Direction::VitruveoToPolygon => ContractCall::Bridge {
                via: contract(ContractKey::ViaVitruveo)?,
                to: account,
                amount,
            },
        })
    }
}
