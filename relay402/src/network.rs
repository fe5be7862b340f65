//! Network identifiers for payment envelopes.
//!
//! The payment header names the chain it pays on as a CAIP-2 style
//! `namespace:reference` pair, e.g. `eip155:25` for Cronos mainnet. The
//! relay serves exactly one chain, so the identifier is mostly used to
//! reject envelopes signed for the wrong network.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A `namespace:reference` blockchain identifier.
///
/// # Serialization
///
/// Serializes to/from a colon-separated string: `"eip155:25"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkId {
    namespace: String,
    reference: String,
}

impl NetworkId {
    /// Creates a network ID from namespace and reference components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Creates an `eip155` network ID from a numeric chain ID.
    #[must_use]
    pub fn eip155(chain_id: u64) -> Self {
        Self::new("eip155", chain_id.to_string())
    }

    /// Returns the namespace component (`eip155`).
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component (the chain ID for `eip155`).
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Returns the numeric chain ID for `eip155` networks.
    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        (self.namespace == "eip155")
            .then(|| self.reference.parse().ok())
            .flatten()
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

/// Error returned when parsing an invalid network ID string.
#[derive(Debug, thiserror::Error)]
#[error("invalid network id format {0:?}")]
pub struct NetworkIdFormatError(String);

impl FromStr for NetworkId {
    type Err = NetworkIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, reference)) if !namespace.is_empty() && !reference.is_empty() => {
                Ok(Self::new(namespace, reference))
            }
            _ => Err(NetworkIdFormatError(s.into())),
        }
    }
}

impl Serialize for NetworkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetworkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_eip155() {
        let network = NetworkId::eip155(25);
        assert_eq!(serde_json::to_string(&network).unwrap(), "\"eip155:25\"");
    }

    #[test]
    fn deserialize_eip155() {
        let network: NetworkId = serde_json::from_str("\"eip155:338\"").unwrap();
        assert_eq!(network.namespace(), "eip155");
        assert_eq!(network.reference(), "338");
        assert_eq!(network.chain_id(), Some(338));
    }

    #[test]
    fn roundtrip() {
        let original = NetworkId::eip155(25);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: NetworkId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn deserialize_invalid_format() {
        let result: Result<NetworkId, _> = serde_json::from_str("\"mainnet\"");
        assert!(result.is_err());
    }

    #[test]
    fn chain_id_only_for_eip155() {
        let network = NetworkId::new("solana", "mainnet");
        assert_eq!(network.chain_id(), None);
    }
}
