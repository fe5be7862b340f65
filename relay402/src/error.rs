//! Error codes and payment rejection reasons.
//!
//! Every failing HTTP response carries a uniform envelope
//! `{error: <CODE>, message, details?}`. The codes and their status
//! mapping live here so that library crates can name failures without
//! depending on any HTTP framework.

use std::fmt;

/// Machine-readable error code attached to every failing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Body or query failed schema validation.
    Validation,
    /// Forwarder `verify` returned false.
    InvalidSignature,
    /// The payment header could not be parsed.
    InvalidPayment,
    /// The payment authorization failed off/on-chain checks.
    PaymentInvalid,
    /// The settlement transaction reverted or failed to broadcast.
    PaymentFailed,
    /// A rate-limit window was exceeded.
    RateLimited,
    /// The relayer wallet lacks native balance.
    InsufficientFunds,
    /// Transaction input could not be decoded.
    TxDecode,
    /// Read-only simulation reverted.
    TxSimulation,
    /// Nonce conflict while broadcasting.
    TxNonce,
    /// Gas estimation or pricing failed.
    TxGas,
    /// Broadcast or receipt wait failed.
    TxBroadcast,
    /// Forwarder execution failed on-chain after payment settled.
    TxExecution,
    /// Anything unexpected.
    Internal,
}

impl ErrorCode {
    /// The wire-format code string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidPayment => "INVALID_PAYMENT",
            Self::PaymentInvalid => "PAYMENT_INVALID",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::RateLimited => "RATE_LIMITED",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::TxDecode => "TX_DECODE_ERROR",
            Self::TxSimulation => "TX_SIMULATION_ERROR",
            Self::TxNonce => "TX_NONCE_ERROR",
            Self::TxGas => "TX_GAS_ERROR",
            Self::TxBroadcast => "TX_BROADCAST_ERROR",
            Self::TxExecution => "TX_EXECUTION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status the code maps to.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::Validation | Self::InvalidSignature | Self::InvalidPayment | Self::TxDecode => {
                400
            }
            Self::PaymentInvalid | Self::PaymentFailed => 402,
            Self::RateLimited => 429,
            Self::InsufficientFunds => 503,
            Self::TxSimulation => 400,
            Self::TxNonce | Self::TxGas | Self::TxBroadcast | Self::TxExecution | Self::Internal => {
                500
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a payment authorization was rejected during verification.
///
/// Checks run in a fixed order and the first failure wins; the
/// `Display` strings are the `reason` values clients see in 402
/// `PAYMENT_INVALID` responses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentRejection {
    /// The envelope names a different chain than the relay serves.
    #[error("Network mismatch")]
    NetworkMismatch,

    /// The envelope uses a scheme other than `exact`.
    #[error("Unsupported payment scheme")]
    UnsupportedScheme,

    /// `authorization.to` is not the configured receiving wallet.
    #[error("Invalid payment recipient")]
    WrongRecipient,

    /// `authorization.value` is below the quoted price.
    #[error("Insufficient amount")]
    InsufficientAmount,

    /// The validity window has not opened yet.
    #[error("Authorization not yet valid")]
    NotYetValid,

    /// The validity window has closed.
    #[error("Authorization expired")]
    Expired,

    /// The `(from, nonce)` pair is already consumed on-chain.
    #[error("Authorization already used")]
    AlreadyUsed,

    /// The payer's stablecoin balance is below the authorized value.
    #[error("Insufficient payer balance")]
    InsufficientBalance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::Validation.status(), 400);
        assert_eq!(ErrorCode::InvalidSignature.status(), 400);
        assert_eq!(ErrorCode::InvalidPayment.status(), 400);
        assert_eq!(ErrorCode::PaymentInvalid.status(), 402);
        assert_eq!(ErrorCode::PaymentFailed.status(), 402);
        assert_eq!(ErrorCode::RateLimited.status(), 429);
        assert_eq!(ErrorCode::InsufficientFunds.status(), 503);
        assert_eq!(ErrorCode::Internal.status(), 500);
    }

    #[test]
    fn rejection_reason_strings() {
        assert_eq!(PaymentRejection::Expired.to_string(), "Authorization expired");
        assert_eq!(
            PaymentRejection::InsufficientAmount.to_string(),
            "Insufficient amount"
        );
        assert_eq!(
            PaymentRejection::AlreadyUsed.to_string(),
            "Authorization already used"
        );
    }
}
