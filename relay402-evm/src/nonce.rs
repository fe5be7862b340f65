//! Pending-view nonce management for concurrent submission.
//!
//! Multiple relay jobs may submit from the same gas wallet without any
//! cross-job lock. Correctness rests on how each transaction's nonce is
//! derived: the first use of a wallet queries the node's `pending`
//! transaction count (which includes mempool entries, so a restart
//! mid-flight does not replay nonces), and every later use increments a
//! local counter. When a submission fails the counter is dropped, since
//! the transaction may or may not have reached the mempool, and the
//! next use re-queries.

use std::sync::Arc;

use alloy_network::Network;
use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_provider::fillers::NonceManager;
use alloy_transport::TransportResult;
use dashmap::DashMap;
use futures::lock::Mutex;

const NONCE_UNSET: u64 = u64::MAX;

/// Nonce manager that seeds from the node's `pending` view.
///
/// Plugged into the adapter's filler stack via
/// [`NonceFiller`](alloy_provider::fillers::NonceFiller); one slot per
/// sending wallet, each guarded by its own async mutex so concurrent
/// fills for one wallet hand out strictly increasing nonces.
#[derive(Clone, Debug, Default)]
pub struct PendingNonces {
    slots: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

#[async_trait::async_trait]
impl NonceManager for PendingNonces {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        let slot = {
            let entry = self
                .slots
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(NONCE_UNSET)));
            Arc::clone(entry.value())
        };

        let mut nonce = slot.lock().await;
        let next = if *nonce == NONCE_UNSET {
            provider.get_transaction_count(address).pending().await?
        } else {
            *nonce + 1
        };
        *nonce = next;
        Ok(next)
    }
}

impl PendingNonces {
    /// Drops the cached nonce for a wallet, forcing a fresh `pending`
    /// query on next use.
    ///
    /// Call after any failed submission: the chain-side state is
    /// uncertain and a locally incremented counter could leave a gap or
    /// collide.
    pub async fn reset(&self, address: Address) {
        if let Some(slot) = self.slots.get(&address) {
            let mut nonce = slot.lock().await;
            *nonce = NONCE_UNSET;
        }
    }
}
