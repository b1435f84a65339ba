//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{address, Address, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tokio::sync::{watch, Notify};

use vtru_bridge::clients::{ContractCall, ContractReader, ContractWriter, TxReceipt, Wallet};
use vtru_bridge::orchestrator::{OrchestratorConfig, SwapOrchestrator};
use vtru_bridge::registry::{ChainKey, ContractKey, ContractRef, Registry};
use vtru_bridge::synchronizer::{BalanceSynchronizer, PollTiming};
use vtru_bridge::types::{CircuitBreakerInfo, Flow, UserWrapInfo};

pub const WRAP_ADDRESS: Address = address!("00000000000000000000000000000000000000aa");
pub const ALICE: Address = address!("000000000000000000000000000000000000a11c");
pub const BOB: Address = address!("0000000000000000000000000000000000000b0b");

pub fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::mainnet(
            "https://polygon.example",
            "https://vitruveo.example",
            Some(WRAP_ADDRESS),
        )
        .expect("test registry is valid"),
    )
}

/// `whole * 10^decimals`
pub fn units(whole: u64, decimals: u8) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(decimals))
}

// ============================================================================
// Reader
// ============================================================================

type ReadHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct MockReader {
    native: Mutex<HashMap<(ChainKey, Address), U256>>,
    tokens: Mutex<HashMap<(ContractKey, Address), U256>>,
    allowances: Mutex<HashMap<(ContractKey, Address), U256>>,
    breaker: Mutex<CircuitBreakerInfo>,
    epoch_next_block: Mutex<U256>,
    user_info: Mutex<HashMap<Address, UserWrapInfo>>,
    chain_ids: Mutex<HashMap<ChainKey, u64>>,
    fail: AtomicBool,
    on_read: Mutex<Option<ReadHook>>,
    pub reads: AtomicUsize,
}

impl MockReader {
    pub fn new() -> Self {
        let reader = Self::default();
        {
            let mut ids = reader.chain_ids.lock().unwrap();
            ids.insert(ChainKey::Polygon, 137);
            ids.insert(ChainKey::Vitruveo, 1490);
        }
        reader
    }

    pub fn set_native(&self, chain: ChainKey, account: Address, amount: U256) {
        self.native.lock().unwrap().insert((chain, account), amount);
    }

    pub fn set_token(&self, token: ContractKey, account: Address, amount: U256) {
        self.tokens.lock().unwrap().insert((token, account), amount);
    }

    /// Allowance `account` grants the token's bridge spender
    pub fn set_allowance(&self, token: ContractKey, account: Address, amount: U256) {
        self.allowances
            .lock()
            .unwrap()
            .insert((token, account), amount);
    }

    pub fn set_circuit_breaker(&self, info: CircuitBreakerInfo, epoch_next_block: U256) {
        *self.breaker.lock().unwrap() = info;
        *self.epoch_next_block.lock().unwrap() = epoch_next_block;
    }

    pub fn set_user_info(&self, account: Address, info: UserWrapInfo) {
        self.user_info.lock().unwrap().insert(account, info);
    }

    pub fn set_chain_id(&self, chain: ChainKey, chain_id: u64) {
        self.chain_ids.lock().unwrap().insert(chain, chain_id);
    }

    /// Make every read fail until cleared
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Run `hook` on every read, before the result is produced
    pub fn on_read(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_read.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_read.lock().unwrap().as_ref() {
            hook();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(eyre!("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ContractReader for MockReader {
    async fn native_balance(&self, chain: ChainKey, account: Address) -> Result<U256> {
        self.read()?;
        Ok(self
            .native
            .lock()
            .unwrap()
            .get(&(chain, account))
            .copied()
            .unwrap_or_default())
    }

    async fn token_balance(&self, token: ContractRef, account: Address) -> Result<U256> {
        self.read()?;
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(&(token.key, account))
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(&self, token: ContractRef, owner: Address, _spender: Address) -> Result<U256> {
        self.read()?;
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(token.key, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn circuit_breaker(&self, _wrap: ContractRef) -> Result<CircuitBreakerInfo> {
        self.read()?;
        Ok(*self.breaker.lock().unwrap())
    }

    async fn epoch_next_block(&self, _wrap: ContractRef) -> Result<U256> {
        self.read()?;
        Ok(*self.epoch_next_block.lock().unwrap())
    }

    async fn user_wrap_info(&self, _wrap: ContractRef, account: Address) -> Result<UserWrapInfo> {
        self.read()?;
        Ok(self
            .user_info
            .lock()
            .unwrap()
            .get(&account)
            .copied()
            .unwrap_or_default())
    }

    async fn chain_id(&self, chain: ChainKey) -> Result<u64> {
        self.read()?;
        self.chain_ids
            .lock()
            .unwrap()
            .get(&chain)
            .copied()
            .ok_or_else(|| eyre!("no chain id for {}", chain))
    }
}

// ============================================================================
// Wallet
// ============================================================================

pub struct MockWallet {
    account: watch::Sender<Option<Address>>,
    chain: Mutex<Option<u64>>,
    fail_switch: AtomicBool,
    pub switches: Mutex<Vec<u64>>,
}

impl MockWallet {
    pub fn new() -> Self {
        let (account, _) = watch::channel(None);
        Self {
            account,
            chain: Mutex::new(None),
            fail_switch: AtomicBool::new(false),
            switches: Mutex::new(Vec::new()),
        }
    }

    pub fn connected(account: Address, chain_id: u64) -> Self {
        let wallet = Self::new();
        wallet.connect(account);
        wallet.set_chain(chain_id);
        wallet
    }

    pub fn connect(&self, account: Address) {
        self.account.send_replace(Some(account));
    }

    pub fn disconnect(&self) {
        self.account.send_replace(None);
    }

    pub fn set_chain(&self, chain_id: u64) {
        *self.chain.lock().unwrap() = Some(chain_id);
    }

    pub fn fail_switches(&self) {
        self.fail_switch.store(true, Ordering::SeqCst);
    }

    pub fn switch_history(&self) -> Vec<u64> {
        self.switches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn current_account(&self) -> Option<Address> {
        *self.account.borrow()
    }

    fn subscribe_account(&self) -> watch::Receiver<Option<Address>> {
        self.account.subscribe()
    }

    async fn is_on_chain(&self, chain_id: u64) -> bool {
        *self.chain.lock().unwrap() == Some(chain_id)
    }

    async fn switch_to(&self, chain_id: u64) -> Result<()> {
        self.switches.lock().unwrap().push(chain_id);
        if self.fail_switch.load(Ordering::SeqCst) {
            return Err(eyre!("user rejected the chain switch"));
        }
        self.set_chain(chain_id);
        Ok(())
    }
}

// ============================================================================
// Writer
// ============================================================================

#[derive(Default)]
pub struct MockWriter {
    calls: Mutex<Vec<ContractCall>>,
    fail_method: Mutex<Option<&'static str>>,
    hold: Mutex<Option<Arc<Notify>>>,
    /// Notified whenever a submission starts
    pub entered: Notify,
}

impl MockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make submissions of `method` revert
    pub fn fail_on(&self, method: &'static str) {
        *self.fail_method.lock().unwrap() = Some(method);
    }

    /// Block every submission until the returned handle is notified
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.method()).collect()
    }
}

#[async_trait]
impl ContractWriter for MockWriter {
    async fn submit(&self, call: ContractCall) -> Result<TxReceipt> {
        self.entered.notify_one();
        let gate = self.hold.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call.clone());
            calls.len()
        };

        if *self.fail_method.lock().unwrap() == Some(call.method()) {
            return Err(eyre!("{} transaction reverted", call.method()));
        }

        Ok(TxReceipt {
            chain: call.chain(),
            tx_hash: format!("0x{:064x}", index),
            block_number: Some(100 + index as u64),
        })
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub registry: Arc<Registry>,
    pub reader: Arc<MockReader>,
    pub wallet: Arc<MockWallet>,
    pub writer: Arc<MockWriter>,
}

impl Harness {
    pub fn new(wallet: MockWallet) -> Self {
        Self {
            registry: registry(),
            reader: Arc::new(MockReader::new()),
            wallet: Arc::new(wallet),
            writer: Arc::new(MockWriter::new()),
        }
    }

    pub fn synchronizer(
        &self,
        flow: Flow,
        timing: PollTiming,
    ) -> Arc<BalanceSynchronizer<MockReader, MockWallet>> {
        Arc::new(BalanceSynchronizer::new(
            flow,
            Arc::clone(&self.registry),
            Arc::clone(&self.reader),
            Arc::clone(&self.wallet),
            timing,
        ))
    }

    pub fn orchestrator(
        &self,
        config: OrchestratorConfig,
    ) -> Arc<SwapOrchestrator<MockReader, MockWallet, MockWriter>> {
        Arc::new(SwapOrchestrator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.wallet),
            Arc::clone(&self.reader),
            Arc::clone(&self.writer),
            config,
        ))
    }
}
