//! Success response bodies returned by the relay endpoints.

use serde::{Deserialize, Serialize};

use crate::quote::Priority;

/// `POST /meta/relay` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    /// Whether the inner call succeeded. The outer transaction mined
    /// either way; an inner revert still pays for its gas.
    pub success: bool,

    /// Hash of the forwarder `execute` transaction.
    pub tx_hash: String,

    /// Hash of the settled payment transaction.
    pub payment_tx_hash: String,

    /// Inner call return data (or revert payload), 0x-hex.
    pub result: String,

    /// Tier the relay was executed at.
    pub tier: Priority,
}

/// Outcome of one request inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemOutcome {
    /// Whether this item's inner call succeeded.
    pub success: bool,

    /// Target contract of the item, for correlation.
    pub to: String,

    /// Outer transaction hash, present when the item was submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,

    /// Failure description, present when the item failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /meta/batch` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceipt {
    /// True iff every item's inner call succeeded.
    pub success: bool,

    /// Hash of the single settled payment covering the batch.
    pub payment_tx_hash: String,

    /// Per-item outcomes, in submission order.
    pub results: Vec<BatchItemOutcome>,

    /// Tier the batch was executed at.
    pub tier: Priority,
}

/// `GET /meta/nonce/{address}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceInfo {
    /// The queried agent address.
    pub address: String,

    /// Current forwarder nonce, decimal string.
    pub nonce: String,
}
