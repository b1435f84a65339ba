//! Chain collaborators
//!
//! - `reader` - read-only contract calls (balances, allowances, limits)
//! - `writer` - signed, confirmed contract calls (wrap, unwrap, approve, bridge)
//! - `wallet` - connected account and active chain

pub mod reader;
pub mod wallet;
pub mod writer;

pub use reader::{ContractReader, EvmReader};
pub use wallet::{LocalWallet, Wallet};
pub use writer::{ContractCall, ContractWriter, EvmWriter, Overrides, TxReceipt};
