//! VTRU Bridge: balance sync and transaction orchestration for Vitruveo
//!
//! Mirrors wallet balances for two flows and sequences the writes that move
//! value between them:
//!
//! - **Wrap** - native VTRU <-> wVTRU on Vitruveo, subject to the wrap
//!   contract's circuit breaker limits
//! - **Bridge** - USDC on Polygon <-> USDC.pol on Vitruveo through the VIA
//!   settlement contracts, with a conditional approval step
//!
//! ## Modules
//!
//! - [`registry`] - chains, RPC endpoints and contract addresses
//! - [`amount`] - exact decimal/base-unit conversion
//! - [`clients`] - read client, write client and wallet collaborators
//! - [`synchronizer`] - balance polling and snapshot publication
//! - [`orchestrator`] - amount validation and the write sequence
//! - [`server`] - HTTP API, health and Prometheus metrics

pub mod amount;
pub mod clients;
pub mod config;
pub mod contracts;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod synchronizer;
pub mod types;

pub use amount::{format_units, parse_units, AmountError, Asset, TokenAmount};
pub use clients::{
    ContractCall, ContractReader, ContractWriter, EvmReader, EvmWriter, LocalWallet, Overrides,
    TxReceipt, Wallet,
};
pub use config::Config;
pub use orchestrator::{
    check_amount, parse_amount, validate, Notification, OperationError, OperationReceipt,
    OperationResult, OrchestratorConfig, SwapOrchestrator, ValidationError,
};
pub use registry::{ChainKey, ContractKey, ContractRef, Registry};
pub use synchronizer::{BalanceSynchronizer, PollHandle, PollTiming};
pub use types::{BalanceSnapshot, Direction, Flow, Holding, WrapLimits};
