//! Relayed-transaction counters and recent records.
//!
//! Observability only and deliberately ephemeral: a process restart
//! starts from zero. A bounded ring of recent [`TxRecord`]s feeds the
//! health endpoint.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How many recent records are retained.
const RECENT_CAPACITY: usize = 100;

/// Lifecycle state of one relayed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Accepted, not yet mined.
    Pending,
    /// Mined with an inner success.
    Confirmed,
    /// Mined with an inner revert, or failed before mining.
    Failed,
}

/// One relayed transaction, as shown on the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRecord {
    /// Process-local identifier.
    pub id: String,
    /// The agent the envelope was signed by.
    pub agent: String,
    /// Keccak hash of the wire envelope, for client correlation.
    pub envelope_hash: String,
    /// Outer forwarder transaction hash, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Settled payment transaction hash, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_tx_hash: Option<String>,
    /// Current lifecycle state.
    pub status: TxStatus,
    /// Gas estimate the quote was priced from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_estimate: Option<String>,
    /// Gas the outer transaction actually consumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,
    /// Tier-adjusted gas price, wei.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    /// When the relay was accepted.
    pub created_at: DateTime<Utc>,
    /// When it reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counter snapshot for the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Relays accepted since startup.
    pub total: u64,
    /// Relays with an inner success.
    pub confirmed: u64,
    /// Relays that failed anywhere past acceptance.
    pub failed: u64,
    /// Most recent records, newest first.
    pub recent: Vec<TxRecord>,
}

/// Process-wide relay counters.
#[derive(Debug, Default)]
pub struct RelayStats {
    total: AtomicU64,
    confirmed: AtomicU64,
    failed: AtomicU64,
    seq: AtomicU64,
    recent: Mutex<VecDeque<TxRecord>>,
}

impl RelayStats {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted relay and returns its id.
    pub fn begin(
        &self,
        agent: String,
        envelope_hash: String,
        gas_estimate: Option<String>,
        gas_price: Option<String>,
    ) -> String {
        let id = format!("relay-{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1);
        self.total.fetch_add(1, Ordering::Relaxed);
        let record = TxRecord {
            id: id.clone(),
            agent,
            envelope_hash,
            tx_hash: None,
            payment_tx_hash: None,
            status: TxStatus::Pending,
            gas_estimate,
            gas_used: None,
            gas_price,
            created_at: Utc::now(),
            completed_at: None,
        };
        let mut recent = self.recent.lock().expect("stats lock poisoned");
        if recent.len() == RECENT_CAPACITY {
            recent.pop_back();
        }
        recent.push_front(record);
        id
    }

    /// Marks a relay terminal, updating counters and its record.
    pub fn finish(
        &self,
        id: &str,
        status: TxStatus,
        tx_hash: Option<String>,
        payment_tx_hash: Option<String>,
        gas_used: Option<String>,
    ) {
        match status {
            TxStatus::Confirmed => {
                self.confirmed.fetch_add(1, Ordering::Relaxed);
            }
            TxStatus::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            TxStatus::Pending => {}
        }
        let mut recent = self.recent.lock().expect("stats lock poisoned");
        if let Some(record) = recent.iter_mut().find(|r| r.id == id) {
            record.status = status;
            record.completed_at = Some(Utc::now());
            if tx_hash.is_some() {
                record.tx_hash = tx_hash;
            }
            if payment_tx_hash.is_some() {
                record.payment_tx_hash = payment_tx_hash;
            }
            if gas_used.is_some() {
                record.gas_used = gas_used;
            }
        }
    }

    /// Snapshot for the health endpoint.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let recent = self.recent.lock().expect("stats lock poisoned");
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            recent: recent.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_updates_counters_and_record() {
        let stats = RelayStats::new();
        let id = stats.begin("0xabc".into(), "0xhash".into(), Some("100000".into()), None);
        assert_eq!(stats.snapshot().total, 1);
        assert_eq!(stats.snapshot().recent[0].status, TxStatus::Pending);

        stats.finish(
            &id,
            TxStatus::Confirmed,
            Some("0xtx".into()),
            Some("0xpay".into()),
            Some("85000".into()),
        );
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.confirmed, 1);
        assert_eq!(snapshot.failed, 0);
        let record = &snapshot.recent[0];
        assert_eq!(record.status, TxStatus::Confirmed);
        assert_eq!(record.tx_hash.as_deref(), Some("0xtx"));
        assert_eq!(record.payment_tx_hash.as_deref(), Some("0xpay"));
        assert_eq!(record.gas_used.as_deref(), Some("85000"));
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn recent_ring_is_bounded() {
        let stats = RelayStats::new();
        for i in 0..150 {
            stats.begin(format!("0x{i}"), "0xhash".into(), None, None);
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 150);
        assert_eq!(snapshot.recent.len(), RECENT_CAPACITY);
        // Newest first.
        assert_eq!(snapshot.recent[0].agent, "0x149");
    }
}
