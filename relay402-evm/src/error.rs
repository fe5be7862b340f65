//! The typed chain error every adapter operation fails with.

use alloy_contract::Error as ContractError;
use alloy_provider::PendingTransactionError;
use alloy_transport::{RpcError, TransportError};

/// What went wrong at the chain boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorKind {
    /// Transport-level failure: connection, timeout, malformed response.
    Network,
    /// The call or transaction reverted.
    Revert,
    /// The node rejected the transaction's nonce as already used.
    NonceTooLow,
    /// The node rejected the gas price as below its floor, or as a
    /// non-bumping replacement.
    Underpriced,
    /// Anything the classifier could not place.
    Unknown,
}

/// A failed chain operation, classified for recovery.
///
/// `retriable` tells the caller whether re-submitting the same
/// operation can reasonably succeed: transport hiccups and nonce races
/// can, reverts cannot. Nonce errors additionally signal that the
/// sending wallet's cached nonce must be resynced first.
#[derive(Debug, thiserror::Error)]
#[error("chain error ({kind:?}): {cause}")]
pub struct ChainError {
    /// Classified failure kind.
    pub kind: ChainErrorKind,
    /// Whether retrying (after a resync, for nonce kinds) makes sense.
    pub retriable: bool,
    /// Human-readable cause, as reported by the node or transport.
    pub cause: String,
}

impl ChainError {
    /// Creates an error of the given kind with the kind's default
    /// retriability.
    #[must_use]
    pub fn new(kind: ChainErrorKind, cause: impl Into<String>) -> Self {
        let retriable = matches!(
            kind,
            ChainErrorKind::Network | ChainErrorKind::NonceTooLow | ChainErrorKind::Underpriced
        );
        Self {
            kind,
            retriable,
            cause: cause.into(),
        }
    }

    /// Classifies a node/transport error message by its well-known
    /// substrings. Go-ethereum and its forks agree on these phrasings.
    #[must_use]
    pub fn from_message(cause: impl Into<String>) -> Self {
        let cause = cause.into();
        let lower = cause.to_lowercase();
        let kind = if lower.contains("nonce too low") || lower.contains("invalid nonce") {
            ChainErrorKind::NonceTooLow
        } else if lower.contains("underpriced") || lower.contains("replacement transaction") {
            ChainErrorKind::Underpriced
        } else if lower.contains("revert") || lower.contains("execution reverted") {
            ChainErrorKind::Revert
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("transport")
            || lower.contains("dns")
        {
            ChainErrorKind::Network
        } else {
            ChainErrorKind::Unknown
        };
        Self::new(kind, cause)
    }

    /// True when the sending wallet's nonce view must be resynced
    /// before the operation can be retried.
    #[must_use]
    pub const fn needs_nonce_resync(&self) -> bool {
        matches!(
            self.kind,
            ChainErrorKind::NonceTooLow | ChainErrorKind::Underpriced
        )
    }

    /// True when the node refused the transaction because the sender
    /// cannot cover gas. Surfaced to clients as `INSUFFICIENT_FUNDS`.
    #[must_use]
    pub fn is_insufficient_funds(&self) -> bool {
        self.cause.to_lowercase().contains("insufficient funds")
    }
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        match &err {
            RpcError::Transport(_) | RpcError::NullResp | RpcError::DeserError { .. } => {
                Self::new(ChainErrorKind::Network, err.to_string())
            }
            RpcError::ErrorResp(payload) => Self::from_message(payload.to_string()),
            _ => Self::from_message(err.to_string()),
        }
    }
}

impl From<PendingTransactionError> for ChainError {
    fn from(err: PendingTransactionError) -> Self {
        // Receipt waits fail on timeouts and dropped transactions; both
        // are worth a retry from the client's side.
        Self::new(ChainErrorKind::Network, err.to_string())
    }
}

impl From<ContractError> for ChainError {
    fn from(err: ContractError) -> Self {
        Self::from_message(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_nonce_too_low() {
        let err = ChainError::from_message("nonce too low: next nonce 42, tx nonce 41");
        assert_eq!(err.kind, ChainErrorKind::NonceTooLow);
        assert!(err.retriable);
        assert!(err.needs_nonce_resync());
    }

    #[test]
    fn classifies_underpriced() {
        let err = ChainError::from_message("replacement transaction underpriced");
        assert_eq!(err.kind, ChainErrorKind::Underpriced);
        assert!(err.retriable);
        assert!(err.needs_nonce_resync());
    }

    #[test]
    fn classifies_revert_as_terminal() {
        let err = ChainError::from_message("execution reverted: ERC20: transfer amount exceeds balance");
        assert_eq!(err.kind, ChainErrorKind::Revert);
        assert!(!err.retriable);
        assert!(!err.needs_nonce_resync());
    }

    #[test]
    fn classifies_transport_as_network() {
        let err = ChainError::from_message("connection refused");
        assert_eq!(err.kind, ChainErrorKind::Network);
        assert!(err.retriable);
    }

    #[test]
    fn unknown_is_not_retriable() {
        let err = ChainError::from_message("something odd happened");
        assert_eq!(err.kind, ChainErrorKind::Unknown);
        assert!(!err.retriable);
    }

    #[test]
    fn detects_insufficient_funds() {
        let err = ChainError::from_message("insufficient funds for gas * price + value");
        assert!(err.is_insufficient_funds());
    }
}
