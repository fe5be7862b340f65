//! The stablecoin-to-native top-up loop.
//!
//! Collected payments accumulate in stablecoin while the relayer burns
//! native gas. Every five minutes this task checks the primary wallet
//! and, when its native balance drops under the low watermark, swaps
//! part of its stablecoin back through a V2-style router. One
//! in-progress flag guards the whole pass so overlapping ticks are
//! skipped, never queued.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use alloy_provider::MulticallItem;
use alloy_rpc_types_eth::TransactionReceipt;
use chrono::{DateTime, Utc};
use serde::Serialize;

use relay402::timestamp::UnixTimestamp;
use relay402_evm::adapter::SubmitTx;
use relay402_evm::contracts::{IStablecoin, ISwapRouter};
use relay402_evm::{ChainAdapter, ChainError, ChainErrorKind};

use crate::pricing::PricingEngine;

/// Tunables for the rebalance loop.
#[derive(Debug, Clone)]
pub struct RebalanceConfig {
    /// V2-style router to swap through.
    pub router: Address,
    /// Wrapped-native token, the second hop of the swap path.
    pub wrapped_native: Address,
    /// Seconds between passes.
    pub interval_secs: u64,
    /// Native balance (whole units) below which a swap is considered.
    pub low_watermark_native: f64,
    /// Native balance (whole units) the swap aims for.
    pub target_native: f64,
    /// Minimum stablecoin (USD units) worth swapping at all.
    pub min_stablecoin_usd: f64,
}

impl RebalanceConfig {
    /// Defaults for a router/wrapped-native pair.
    #[must_use]
    pub fn new(router: Address, wrapped_native: Address) -> Self {
        Self {
            router,
            wrapped_native,
            interval_secs: 300,
            low_watermark_native: 10.0,
            target_native: 20.0,
            min_stablecoin_usd: 1.0,
        }
    }
}

/// Snapshot of the loop's state for the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceStatus {
    /// Whether a router is configured at all.
    pub enabled: bool,
    /// Whether a pass is running right now.
    pub in_progress: bool,
    /// When the last pass finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// What the last pass did (or why it failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,
}

impl RebalanceStatus {
    /// The status reported when no router is configured.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            in_progress: false,
            last_run: None,
            last_outcome: None,
        }
    }
}

/// The rebalance task.
#[derive(Debug)]
pub struct AutoRebalancer {
    adapter: Arc<ChainAdapter>,
    pricing: Arc<PricingEngine>,
    primary: Address,
    config: RebalanceConfig,
    in_progress: AtomicBool,
    last: RwLock<(Option<DateTime<Utc>>, Option<String>)>,
}

impl AutoRebalancer {
    /// Creates the task for the primary relayer wallet.
    #[must_use]
    pub fn new(
        adapter: Arc<ChainAdapter>,
        pricing: Arc<PricingEngine>,
        primary: Address,
        config: RebalanceConfig,
    ) -> Self {
        Self {
            adapter,
            pricing,
            primary,
            config,
            in_progress: AtomicBool::new(false),
            last: RwLock::new((None, None)),
        }
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> RebalanceStatus {
        let last = self.last.read().expect("rebalance lock poisoned");
        RebalanceStatus {
            enabled: true,
            in_progress: self.in_progress.load(Ordering::Acquire),
            last_run: last.0,
            last_outcome: last.1.clone(),
        }
    }

    /// Runs one pass, unless one is already running.
    pub async fn tick(&self) {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("rebalance pass already running, skipping tick");
            return;
        }

        let outcome = match self.run().await {
            Ok(outcome) => {
                tracing::info!(outcome, "rebalance pass finished");
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "rebalance pass failed");
                format!("failed: {e}")
            }
        };

        {
            let mut last = self.last.write().expect("rebalance lock poisoned");
            *last = (Some(Utc::now()), Some(outcome));
        }
        self.in_progress.store(false, Ordering::Release);
    }

    async fn run(&self) -> Result<String, ChainError> {
        let native_wei = self.adapter.native_balance(self.primary).await?;
        let native_units = u128::try_from(native_wei).unwrap_or(u128::MAX) as f64 / 1e18;
        if native_units >= self.config.low_watermark_native {
            return Ok(format!("balance healthy ({native_units:.2} native), no swap"));
        }

        let stable_raw = self.adapter.stablecoin_balance(self.primary).await?;
        let stable_usd = u128::try_from(stable_raw).unwrap_or(u128::MAX) as f64 / 1e6;
        if stable_usd < self.config.min_stablecoin_usd {
            return Ok(format!(
                "native low ({native_units:.2}) but only {stable_usd:.2} stablecoin, skipping"
            ));
        }

        let spot = self.pricing.spot().usd;
        let deficit_native = self.config.target_native - native_units;
        // 10% headroom over the deficit, but never more than half the
        // stablecoin buffer in one pass.
        let spend_usd = (deficit_native * spot * 1.1).min(stable_usd * 0.5);
        let amount_in = U256::from((spend_usd * 1e6) as u128);
        if amount_in.is_zero() {
            return Ok("computed swap amount is zero, skipping".into());
        }

        // 5% slippage floor on the expected native out.
        let expected_native = spend_usd / spot;
        let min_out = U256::from((expected_native * 0.95 * 1e18) as u128);

        self.ensure_allowance(amount_in).await?;

        let deadline = U256::from(UnixTimestamp::now().as_secs() + 300);
        let router = ISwapRouter::new(self.config.router, self.adapter.provider());
        let swap = router.swapExactTokensForETH(
            amount_in,
            min_out,
            vec![self.adapter.stablecoin_address(), self.config.wrapped_native],
            self.primary,
            deadline,
        );
        let receipt = self.submit(self.config.router, swap.calldata().clone()).await?;
        if !receipt.status() {
            return Err(ChainError::new(
                ChainErrorKind::Revert,
                format!("rebalance swap reverted in tx {}", receipt.transaction_hash),
            ));
        }

        Ok(format!(
            "swapped {spend_usd:.2} stablecoin for native in tx {}",
            receipt.transaction_hash
        ))
    }

    async fn ensure_allowance(&self, amount_in: U256) -> Result<(), ChainError> {
        let token = IStablecoin::new(self.adapter.stablecoin_address(), self.adapter.provider());
        let allowance = token
            .allowance(self.primary, self.config.router)
            .call()
            .await?;
        if allowance >= amount_in {
            return Ok(());
        }
        tracing::info!(router = %self.config.router, "approving router for rebalance swaps");
        let approve = token.approve(self.config.router, U256::MAX);
        let receipt = self
            .submit(self.adapter.stablecoin_address(), approve.calldata().clone())
            .await?;
        if !receipt.status() {
            return Err(ChainError::new(
                ChainErrorKind::Revert,
                "router approval reverted",
            ));
        }
        Ok(())
    }

    async fn submit(
        &self,
        to: Address,
        calldata: alloy_primitives::Bytes,
    ) -> Result<TransactionReceipt, ChainError> {
        self.adapter
            .send(SubmitTx {
                from: self.primary,
                to,
                calldata,
                value: U256::ZERO,
                gas_limit: None,
            })
            .await
    }

    /// Runs the loop until the shutdown signal flips.
    pub async fn run_loop(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    tracing::debug!("rebalance loop stopping");
                    break;
                }
            }
        }
    }
}
