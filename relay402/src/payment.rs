//! The `X-Payment` header envelope and its Base64 codec.
//!
//! The first request to a paid endpoint gets a 402 with payment terms;
//! the retry carries an `X-Payment` header whose value is the Base64 of
//! a JSON [`PaymentEnvelope`]. The envelope wraps an EIP-3009
//! `transferWithAuthorization` message and its 65-byte signature, which
//! the relay settles on-chain before executing the forwarded call.

use alloy_primitives::{Address, B256, Bytes, U256};
use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::forward::serde_decimal;
use crate::network::NetworkId;
use crate::timestamp::UnixTimestamp;

/// The payment scheme this relay accepts.
pub const SCHEME_EXACT: &str = "exact";

/// An EIP-3009 transfer authorization signed by the paying agent.
///
/// One-shot: settlement marks the `(from, nonce)` pair used on-chain,
/// so a replayed envelope fails the `authorizationState` check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    /// The paying agent.
    pub from: Address,

    /// Recipient; must equal the relay's configured receiving wallet.
    pub to: Address,

    /// Stablecoin base units; must meet or exceed the quoted price.
    #[serde(with = "serde_decimal")]
    pub value: U256,

    /// Start of the validity window (exclusive).
    pub valid_after: UnixTimestamp,

    /// End of the validity window (exclusive).
    pub valid_before: UnixTimestamp,

    /// 32-byte opaque replay-protection nonce.
    pub nonce: B256,
}

/// The signed payload inside a [`PaymentEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// 65-byte signature, `0x || r(32) || s(32) || v(1)`.
    pub signature: Bytes,

    /// The authorization the signature covers.
    pub authorization: PaymentAuthorization,
}

/// The structured document carried in the `X-Payment` header.
///
/// # JSON Format
///
/// ```json
/// {
///   "version": 1,
///   "scheme": "exact",
///   "network": "eip155:25",
///   "payload": {
///     "signature": "0x...",
///     "authorization": { "from": "0x...", "to": "0x...", "value": "54000",
///                        "validAfter": "0", "validBefore": "1700000600",
///                        "nonce": "0x..." }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEnvelope {
    /// Payment protocol version (always 1).
    pub version: u32,

    /// Payment scheme identifier; only [`SCHEME_EXACT`] is accepted.
    pub scheme: String,

    /// The network the authorization was signed for.
    pub network: NetworkId,

    /// Signature plus authorization.
    pub payload: PaymentPayload,
}

impl PaymentEnvelope {
    /// Shorthand for the wrapped authorization.
    #[must_use]
    pub fn authorization(&self) -> &PaymentAuthorization {
        &self.payload.authorization
    }
}

/// Errors from encoding or decoding an `X-Payment` header value.
#[derive(Debug, thiserror::Error)]
pub enum PaymentCodecError {
    /// The header value is not valid Base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not a valid envelope document.
    #[error("invalid payment document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes a [`PaymentEnvelope`] as a Base64 string for the `X-Payment`
/// header.
///
/// # Errors
///
/// Returns [`PaymentCodecError::Json`] if JSON serialization fails.
pub fn encode_payment_header(envelope: &PaymentEnvelope) -> Result<String, PaymentCodecError> {
    let json = serde_json::to_vec(envelope)?;
    Ok(BASE64_STANDARD.encode(&json))
}

/// Decodes an `X-Payment` header value into a [`PaymentEnvelope`].
///
/// # Errors
///
/// Returns [`PaymentCodecError`] on Base64 or JSON decode failure.
pub fn decode_payment_header(header_value: &str) -> Result<PaymentEnvelope, PaymentCodecError> {
    let bytes = BASE64_STANDARD.decode(header_value.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    fn sample() -> PaymentEnvelope {
        PaymentEnvelope {
            version: 1,
            scheme: SCHEME_EXACT.into(),
            network: NetworkId::eip155(25),
            payload: PaymentPayload {
                signature: Bytes::from(vec![0x11; 65]),
                authorization: PaymentAuthorization {
                    from: address!("0x1111111111111111111111111111111111111111"),
                    to: address!("0x2222222222222222222222222222222222222222"),
                    value: U256::from(54_000u64),
                    valid_after: UnixTimestamp::from_secs(0),
                    valid_before: UnixTimestamp::from_secs(1_700_000_600),
                    nonce: b256!("0x1212121212121212121212121212121212121212121212121212121212121212"),
                },
            },
        }
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let envelope = sample();
        let header = encode_payment_header(&envelope).unwrap();
        let back = decode_payment_header(&header).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn decode_rejects_bad_base64() {
        assert!(decode_payment_header("!!!not-base64!!!").is_err());
    }

    #[test]
    fn decode_rejects_non_json() {
        let header = BASE64_STANDARD.encode(b"definitely not json");
        assert!(decode_payment_header(&header).is_err());
    }

    #[test]
    fn decode_rejects_missing_fields() {
        let header = BASE64_STANDARD.encode(br#"{"version":1,"scheme":"exact"}"#);
        assert!(decode_payment_header(&header).is_err());
    }

    #[test]
    fn authorization_timestamps_are_strings() {
        let json = serde_json::to_value(sample()).unwrap();
        let auth = &json["payload"]["authorization"];
        assert_eq!(auth["value"], "54000");
        assert_eq!(auth["validAfter"], "0");
        assert_eq!(auth["validBefore"], "1700000600");
    }
}
