//! The pool of funded relayer gas wallets.
//!
//! Each job that needs to submit a transaction leases one wallet for
//! its duration. Selection is least-busy by default (fewest in-flight
//! jobs, ties broken by longest-idle), with round-robin available for
//! even distribution under identical loads. The pool never serializes
//! submission per wallet; nonce correctness comes from the adapter's
//! pending-view nonce derivation (see [`crate::nonce`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use serde::Serialize;

use crate::adapter::ChainAdapter;
use crate::error::ChainError;

/// One funded gas wallet and its dispatch bookkeeping.
///
/// Owned exclusively by the pool; jobs only ever see a
/// [`RelayerLease`]. `nonce_hint` is a seed cache refreshed by
/// [`RelayerPool::resync`] — dispatch always defers to the adapter's
/// pending-view nonce, the hint exists for observability and restart
/// seeding.
#[derive(Debug)]
pub struct RelayerState {
    address: Address,
    pending: AtomicU64,
    last_used_millis: AtomicU64,
    nonce_hint: AtomicU64,
}

impl RelayerState {
    fn new(address: Address, nonce_hint: u64) -> Self {
        Self {
            address,
            pending: AtomicU64::new(0),
            last_used_millis: AtomicU64::new(0),
            nonce_hint: AtomicU64::new(nonce_hint),
        }
    }

    /// The wallet address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// In-flight jobs currently leased on this wallet.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }
}

/// How the pool picks a wallet for the next job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Fewest in-flight jobs; ties broken by earliest last use.
    #[default]
    LeastBusy,
    /// Strict rotation regardless of load.
    RoundRobin,
}

/// An exclusive lease on one wallet for the duration of one job.
///
/// Acquiring increments the wallet's pending count; dropping the lease
/// releases it, decrementing saturating at zero. Jobs must hold the
/// lease across their entire submit-and-wait span.
#[derive(Debug)]
pub struct RelayerLease {
    state: Arc<RelayerState>,
}

impl RelayerLease {
    /// The leased wallet address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.state.address
    }
}

impl Drop for RelayerLease {
    fn drop(&mut self) {
        let _ = self
            .state
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
    }
}

/// Per-wallet stats snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerStats {
    /// Wallet address, 0x-hex.
    pub address: String,
    /// In-flight jobs at snapshot time.
    pub pending: u64,
    /// Last acquisition, unix millis (0 = never used).
    pub last_used_millis: u64,
    /// Last resynced pending nonce.
    pub nonce_hint: u64,
}

/// Pool-wide stats snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Per-wallet rows, configuration order.
    pub relayers: Vec<RelayerStats>,
    /// Sum of in-flight jobs across all wallets.
    pub total_pending: u64,
}

/// The set of relayer wallets.
#[derive(Debug)]
pub struct RelayerPool {
    relayers: Vec<Arc<RelayerState>>,
    policy: SelectionPolicy,
    cursor: AtomicUsize,
}

impl RelayerPool {
    /// Builds a pool from wallet addresses and their current pending
    /// nonces. The first wallet is the primary (health checks and
    /// rebalancing key off it).
    ///
    /// # Panics
    ///
    /// Panics if `wallets` is empty; startup validates key material
    /// before constructing the pool.
    #[must_use]
    pub fn new(wallets: Vec<(Address, u64)>, policy: SelectionPolicy) -> Self {
        assert!(!wallets.is_empty(), "relayer pool requires at least one wallet");
        Self {
            relayers: wallets
                .into_iter()
                .map(|(address, nonce)| Arc::new(RelayerState::new(address, nonce)))
                .collect(),
            policy,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Builds a pool by querying each wallet's pending nonce from chain.
    pub async fn bootstrap(
        adapter: &ChainAdapter,
        addresses: Vec<Address>,
        policy: SelectionPolicy,
    ) -> Result<Self, ChainError> {
        let mut wallets = Vec::with_capacity(addresses.len());
        for address in addresses {
            let nonce = adapter.pending_nonce(address).await?;
            tracing::info!(relayer = %address, nonce, "registered relayer wallet");
            wallets.push((address, nonce));
        }
        Ok(Self::new(wallets, policy))
    }

    /// Leases a wallet for one job.
    pub fn acquire(&self) -> RelayerLease {
        let state = match self.policy {
            SelectionPolicy::RoundRobin => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.relayers.len();
                Arc::clone(&self.relayers[idx])
            }
            SelectionPolicy::LeastBusy => {
                let chosen = self
                    .relayers
                    .iter()
                    .min_by_key(|r| {
                        (
                            r.pending.load(Ordering::Acquire),
                            r.last_used_millis.load(Ordering::Acquire),
                        )
                    })
                    .expect("pool is never empty");
                Arc::clone(chosen)
            }
        };
        state.pending.fetch_add(1, Ordering::AcqRel);
        state
            .last_used_millis
            .store(now_millis(), Ordering::Release);
        RelayerLease { state }
    }

    /// The primary wallet (first configured key).
    #[must_use]
    pub fn primary(&self) -> Address {
        self.relayers[0].address
    }

    /// All wallet addresses, configuration order.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.relayers.iter().map(|r| r.address).collect()
    }

    /// Snapshot of per-wallet and pool-wide counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let relayers: Vec<RelayerStats> = self
            .relayers
            .iter()
            .map(|r| RelayerStats {
                address: r.address.to_string(),
                pending: r.pending.load(Ordering::Acquire),
                last_used_millis: r.last_used_millis.load(Ordering::Acquire),
                nonce_hint: r.nonce_hint.load(Ordering::Acquire),
            })
            .collect();
        let total_pending = relayers.iter().map(|r| r.pending).sum();
        PoolStats {
            relayers,
            total_pending,
        }
    }

    /// Re-reads a wallet's pending nonce from chain and drops the
    /// adapter's cached value. Invoked after `nonceTooLow` or
    /// `underpriced` failures.
    pub async fn resync(
        &self,
        adapter: &ChainAdapter,
        address: Address,
    ) -> Result<u64, ChainError> {
        adapter.reset_nonce(address).await;
        let nonce = adapter.pending_nonce(address).await?;
        if let Some(state) = self.relayers.iter().find(|r| r.address == address) {
            state.nonce_hint.store(nonce, Ordering::Release);
        }
        tracing::warn!(relayer = %address, nonce, "resynced relayer nonce");
        Ok(nonce)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const A: Address = address!("0x00000000000000000000000000000000000000aa");
    const B: Address = address!("0x00000000000000000000000000000000000000bb");
    const C: Address = address!("0x00000000000000000000000000000000000000cc");

    fn pool(policy: SelectionPolicy) -> RelayerPool {
        RelayerPool::new(vec![(A, 0), (B, 0), (C, 0)], policy)
    }

    #[test]
    fn least_busy_prefers_idle_wallet() {
        let pool = pool(SelectionPolicy::LeastBusy);
        let first = pool.acquire();
        let second = pool.acquire();
        let third = pool.acquire();
        let picked: Vec<Address> = vec![first.address(), second.address(), third.address()];
        // Three holds over three wallets: every wallet is leased once.
        assert!(picked.contains(&A));
        assert!(picked.contains(&B));
        assert!(picked.contains(&C));
        assert_eq!(pool.stats().total_pending, 3);
    }

    #[test]
    fn least_busy_ties_break_by_last_used() {
        let pool = pool(SelectionPolicy::LeastBusy);
        {
            let _hold_a = pool.acquire(); // A gets used, then released
        }
        // All pending counts are zero again; A has the latest last_used,
        // so the next lease must land on a never-used wallet.
        let lease = pool.acquire();
        assert_ne!(lease.address(), A);
    }

    #[test]
    fn round_robin_alternates() {
        let pool = pool(SelectionPolicy::RoundRobin);
        let picked: Vec<Address> = (0..6).map(|_| pool.acquire().address()).collect();
        assert_eq!(picked, vec![A, B, C, A, B, C]);
    }

    #[test]
    fn release_decrements_and_saturates() {
        let pool = pool(SelectionPolicy::LeastBusy);
        let lease = pool.acquire();
        assert_eq!(pool.stats().total_pending, 1);
        drop(lease);
        assert_eq!(pool.stats().total_pending, 0);
        // Releasing never goes below zero even under bookkeeping races.
        let lease = pool.acquire();
        drop(lease);
        assert_eq!(pool.stats().total_pending, 0);
    }

    #[test]
    fn pending_sum_equals_outstanding_leases() {
        let pool = pool(SelectionPolicy::LeastBusy);
        let leases: Vec<RelayerLease> = (0..5).map(|_| pool.acquire()).collect();
        assert_eq!(pool.stats().total_pending, 5);
        drop(leases);
        assert_eq!(pool.stats().total_pending, 0);
    }

    #[test]
    fn primary_is_first_configured() {
        let pool = pool(SelectionPolicy::LeastBusy);
        assert_eq!(pool.primary(), A);
        assert_eq!(pool.addresses(), vec![A, B, C]);
    }
}
