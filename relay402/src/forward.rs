//! The signed forwarder envelope.
//!
//! Agents do not hold the native gas token, so instead of sending a
//! transaction they sign a typed [`ForwardRequest`] describing the call
//! they want made. The relay submits it to the on-chain trusted
//! forwarder, which verifies the EIP-712 signature and per-agent nonce
//! before performing the inner call with the agent's address appended to
//! calldata.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::timestamp::UnixTimestamp;

/// Serde adapter serializing 256-bit integers as decimal strings.
///
/// JSON numbers cannot carry 256-bit values, so every big integer in the
/// wire format is a stringified decimal: `"1000000"`.
pub mod serde_decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Serializes a [`U256`] as its decimal string representation.
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    /// Deserializes a [`U256`] from a decimal string.
    ///
    /// # Errors
    ///
    /// Fails on anything but an unsigned decimal integer; hex strings are
    /// rejected so clients cannot smuggle ambiguous encodings.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        if !s.chars().all(|c| c.is_ascii_digit()) || s.is_empty() {
            return Err(de::Error::custom("expected a decimal integer string"));
        }
        s.parse::<U256>().map_err(de::Error::custom)
    }
}

/// A signed meta-transaction envelope, immutable through the pipeline.
///
/// Field meanings follow the forwarder contract's `ForwardRequest`
/// struct; the EIP-712 signature over these fields travels separately.
///
/// # JSON Format
///
/// ```json
/// {
///   "from": "0xAgent...",
///   "to": "0xTarget...",
///   "value": "0",
///   "gas": "120000",
///   "nonce": "7",
///   "deadline": "1699999999",
///   "data": "0xa9059cbb..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForwardRequest {
    /// The agent whose signature authorizes the call.
    pub from: Address,

    /// Target contract for the inner call.
    pub to: Address,

    /// Native value forwarded with the inner call.
    #[serde(with = "serde_decimal")]
    pub value: U256,

    /// Gas limit requested for the inner call.
    #[serde(with = "serde_decimal")]
    pub gas: U256,

    /// Per-agent forwarder nonce; must equal the on-chain
    /// `getNonce(from)` at verification time.
    #[serde(with = "serde_decimal")]
    pub nonce: U256,

    /// Unix deadline after which the envelope is no longer executable.
    pub deadline: UnixTimestamp,

    /// Opaque calldata for the inner call.
    pub data: Bytes,
}

impl ForwardRequest {
    /// True once the envelope's deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: UnixTimestamp) -> bool {
        now.as_secs() > self.deadline.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn sample() -> ForwardRequest {
        ForwardRequest {
            from: address!("0x1111111111111111111111111111111111111111"),
            to: address!("0x2222222222222222222222222222222222222222"),
            value: U256::ZERO,
            gas: U256::from(120_000u64),
            nonce: U256::from(7u64),
            deadline: UnixTimestamp::from_secs(1_699_999_999),
            data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
        }
    }

    #[test]
    fn integers_cross_the_wire_as_decimal_strings() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["value"], "0");
        assert_eq!(json["gas"], "120000");
        assert_eq!(json["nonce"], "7");
        assert_eq!(json["deadline"], "1699999999");
    }

    #[test]
    fn roundtrip() {
        let original = sample();
        let json = serde_json::to_string(&original).unwrap();
        let back: ForwardRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn rejects_hex_integers() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["gas"] = "0x1e8480".into();
        assert!(serde_json::from_value::<ForwardRequest>(json).is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["gasPrice"] = "5".into();
        assert!(serde_json::from_value::<ForwardRequest>(json).is_err());
    }

    #[test]
    fn deadline_expiry() {
        let request = sample();
        assert!(!request.is_expired(UnixTimestamp::from_secs(1_699_999_999)));
        assert!(request.is_expired(UnixTimestamp::from_secs(1_700_000_000)));
    }
}
