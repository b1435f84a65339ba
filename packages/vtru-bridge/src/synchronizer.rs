//! Balance Synchronizer
//!
//! Mirrors on-chain balances (and bridge allowances) of the connected account
//! into a [`BalanceSnapshot`] published on a `watch` channel.
//!
//! # Polling
//!
//! - No account connected: a zeroed snapshot is published and polling idles
//!   until an account appears.
//! - Account connected: a refresh runs immediately, then every
//!   `PollTiming::fast` while an operation is in flight, otherwise every
//!   `PollTiming::slow`. Account changes and in-flight flips wake the loop
//!   early.
//! - A read failure keeps the previous snapshot (stale but available) and is
//!   only logged.
//!
//! Polling runs until the [`PollHandle`] returned by
//! [`BalanceSynchronizer::start`] is stopped or dropped.

use alloy::primitives::Address;
use chrono::Utc;
use eyre::{eyre, Result};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::amount::TokenAmount;
use crate::clients::{ContractReader, Wallet};
use crate::registry::{ContractKey, Registry};
use crate::types::{AllowanceSnapshot, BalanceSnapshot, Flow, HoldingBalance, WrapLimits};

/// Poll intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    /// Interval while an operation is in flight
    pub fast: Duration,
    /// Interval while idle
    pub slow: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(5),
            slow: Duration::from_secs(15),
        }
    }
}

impl PollTiming {
    pub fn interval(&self, in_flight: bool) -> Duration {
        if in_flight {
            self.fast
        } else {
            self.slow
        }
    }
}

/// Poll counters read by the metrics endpoint
#[derive(Debug, Default)]
pub struct SyncStats {
    pub polls: AtomicU64,
    pub poll_failures: AtomicU64,
    /// Unix time of the last successful refresh (0 = never)
    pub last_success_unix: AtomicI64,
}

/// Polls balances for the connected account and publishes snapshots
pub struct BalanceSynchronizer<R, W> {
    flow: Flow,
    registry: Arc<Registry>,
    reader: Arc<R>,
    wallet: Arc<W>,
    timing: PollTiming,
    snapshot: watch::Sender<BalanceSnapshot>,
    stats: SyncStats,
}

impl<R, W> BalanceSynchronizer<R, W>
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
{
    pub fn new(
        flow: Flow,
        registry: Arc<Registry>,
        reader: Arc<R>,
        wallet: Arc<W>,
        timing: PollTiming,
    ) -> Self {
        let (snapshot, _) = watch::channel(BalanceSnapshot::zeroed(flow, None));
        Self {
            flow,
            registry,
            reader,
            wallet,
            timing,
            snapshot,
            stats: SyncStats::default(),
        }
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    pub fn timing(&self) -> PollTiming {
        self.timing
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Subscribe to published snapshots
    pub fn subscribe(&self) -> watch::Receiver<BalanceSnapshot> {
        self.snapshot.subscribe()
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> BalanceSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Read a fresh snapshot for `account` without publishing it
    pub async fn refresh(&self, account: Option<Address>) -> Result<BalanceSnapshot> {
        let Some(account) = account else {
            return Ok(BalanceSnapshot::zeroed(self.flow, None));
        };

        let (balances, allowances) = tokio::try_join!(
            self.read_balances(account),
            self.read_allowances(account)
        )?;

        Ok(BalanceSnapshot {
            account: Some(account),
            flow: self.flow,
            balances,
            allowances,
            captured_at: Utc::now(),
        })
    }

    async fn read_balances(&self, account: Address) -> Result<Vec<HoldingBalance>> {
        let mut balances = Vec::with_capacity(2);
        for holding in self.flow.holdings() {
            let raw = match holding.token() {
                Some(token) => {
                    let token = self.registry.contract(token)?;
                    self.reader.token_balance(token, account).await?
                }
                None => {
                    self.reader
                        .native_balance(holding.chain(), account)
                        .await?
                }
            };
            balances.push(HoldingBalance {
                holding,
                amount: TokenAmount::new(raw, holding.asset().decimals),
            });
        }
        Ok(balances)
    }

    async fn read_allowances(&self, account: Address) -> Result<Vec<AllowanceSnapshot>> {
        let mut allowances = Vec::new();
        for holding in self.flow.holdings() {
            let (Some(token), Some(spender)) = (holding.token(), holding.bridge_spender()) else {
                continue;
            };
            let token = self.registry.contract(token)?;
            let spender = self.registry.contract(spender)?.address;
            let granted = self.reader.allowance(token, account, spender).await?;
            allowances.push(AllowanceSnapshot {
                holding,
                spender,
                granted: TokenAmount::new(granted, holding.asset().decimals),
            });
        }
        Ok(allowances)
    }

    /// Refresh for the wallet's current account and publish the result
    ///
    /// Returns `true` if a fresh snapshot was published.
    pub async fn tick(&self) -> bool {
        let account = self.wallet.current_account();

        // A snapshot is only valid for the account it was captured for
        if self.snapshot.borrow().account != account {
            debug!(account = ?account, "Account changed, resetting snapshot");
            self.snapshot
                .send_replace(BalanceSnapshot::zeroed(self.flow, account));
        }

        if account.is_none() {
            return false;
        }

        self.stats.polls.fetch_add(1, Ordering::Relaxed);
        match self.refresh(account).await {
            Ok(snapshot) => {
                if self.wallet.current_account() != account {
                    debug!(account = ?account, "Account changed during refresh, discarding");
                    return false;
                }
                self.stats
                    .last_success_unix
                    .store(snapshot.captured_at.timestamp(), Ordering::Relaxed);
                self.snapshot.send_replace(snapshot);
                true
            }
            Err(e) => {
                self.on_transient_read_failure(&e);
                false
            }
        }
    }

    /// Read failures are non-fatal: keep the last snapshot and retry next tick
    fn on_transient_read_failure(&self, error: &eyre::Report) {
        let failures = self.stats.poll_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            error = %error,
            flow = %self.flow,
            failures = failures,
            "Balance refresh failed, keeping previous snapshot"
        );
    }

    /// Read circuit breaker limits and, for a connected account, its wrap window
    pub async fn fetch_limits(&self, account: Option<Address>) -> Result<WrapLimits> {
        let wrap = self.registry.contract(ContractKey::WrappedVtru)?;

        let (info, next_epoch_block) = tokio::try_join!(
            self.reader.circuit_breaker(wrap),
            self.reader.epoch_next_block(wrap)
        )?;

        let user = match account {
            Some(account) => Some(self.reader.user_wrap_info(wrap, account).await?),
            None => None,
        };

        Ok(WrapLimits::from_parts(info, next_epoch_block, user))
    }

    /// Spawn the poll loop
    ///
    /// `in_flight` switches between the fast and slow interval.
    pub fn start(self: &Arc<Self>, in_flight: watch::Receiver<bool>) -> PollHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(self).run(in_flight, shutdown_rx));

        info!(
            flow = %self.flow,
            fast_ms = self.timing.fast.as_millis() as u64,
            slow_ms = self.timing.slow.as_millis() as u64,
            "Balance polling started"
        );

        PollHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        self: Arc<Self>,
        mut in_flight: watch::Receiver<bool>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut account_rx = self.wallet.subscribe_account();
        let mut in_flight_open = true;

        loop {
            account_rx.borrow_and_update();
            let busy = *in_flight.borrow_and_update();

            self.tick().await;

            if self.wallet.current_account().is_none() {
                // Nothing to poll until a wallet connects
                tokio::select! {
                    _ = &mut shutdown => break,
                    changed = account_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.timing.interval(busy)) => {}
                changed = account_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = in_flight.changed(), if in_flight_open => {
                    if changed.is_err() {
                        in_flight_open = false;
                    }
                }
            }
        }

        info!(flow = %self.flow, "Balance polling stopped");
    }
}

/// Owner handle for a running poll loop; dropping it stops polling
pub struct PollHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling and wait for the loop to exit
    pub async fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| eyre!("Poll task failed: {}", e))?;
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
