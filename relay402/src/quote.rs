//! Priority tiers, price quotes, and the 402 response body.
//!
//! A quote is a pure value: the server computes it, returns it, and
//! retains nothing. The client proves acceptance by attaching a payment
//! whose amount meets the quoted raw price.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::network::NetworkId;

/// Execution priority requested by the client.
///
/// Each tier bundles a markup multiplier (how far above cost the relay
/// charges), a gas-price multiplier (how aggressively the outer tx
/// bids), and an indicative confirmation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Cheapest; rides the low end of the gas market.
    Slow,
    /// Default tier.
    #[default]
    Normal,
    /// Front-of-queue pricing.
    Fast,
}

/// The multiplier bundle for one [`Priority`] tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    /// Scales the configured markup percentage.
    pub markup_multiplier: f64,
    /// Scales the current network gas price.
    pub gas_price_multiplier: f64,
    /// Indicative time-to-confirmation, seconds.
    pub estimated_time_secs: u64,
}

impl Priority {
    /// All tiers, cheapest first.
    pub const ALL: [Self; 3] = [Self::Slow, Self::Normal, Self::Fast];

    /// Returns the fixed multiplier bundle for this tier.
    #[must_use]
    pub const fn config(self) -> TierConfig {
        match self {
            Self::Slow => TierConfig {
                markup_multiplier: 0.5,
                gas_price_multiplier: 0.8,
                estimated_time_secs: 30,
            },
            Self::Normal => TierConfig {
                markup_multiplier: 1.0,
                gas_price_multiplier: 1.0,
                estimated_time_secs: 10,
            },
            Self::Fast => TierConfig {
                markup_multiplier: 2.0,
                gas_price_multiplier: 1.5,
                estimated_time_secs: 3,
            },
        }
    }

    /// Parses a tier name as it appears in query strings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slow" => Some(Self::Slow),
            "normal" => Some(Self::Normal),
            "fast" => Some(Self::Fast),
            _ => None,
        }
    }

    /// The tier name as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Normal => "normal",
            Self::Fast => "fast",
        }
    }
}

/// The `quote` object embedded in 402 responses and `/estimate` replies.
///
/// Shape is wire-exact; `croPrice` is the native-token USD spot used
/// for the conversion and `priceUSDC` the final price formatted to six
/// decimal places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteBody {
    /// Gas units the quote covers, decimal string.
    pub gas_estimate: String,

    /// Tier-adjusted gas price in gwei, decimal string.
    pub gas_price_gwei: String,

    /// Native token USD spot at quoting time.
    pub cro_price: f64,

    /// Final stablecoin price, human units with six decimals.
    #[serde(rename = "priceUSDC")]
    pub price_usdc: String,

    /// Tier the quote was computed for.
    pub priority: Priority,

    /// ISO-8601 instant after which the quote is no longer honored.
    pub valid_until: String,
}

/// One entry of the `x402.accepts` array: the terms under which the
/// relay will accept payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerms {
    /// Payment scheme identifier (`"exact"`).
    pub scheme: String,

    /// Network the payment must be signed for.
    pub network: NetworkId,

    /// Stablecoin contract address.
    pub asset: Address,

    /// The relay's receiving wallet.
    pub pay_to: Address,

    /// Required amount in stablecoin base units, decimal string.
    pub max_amount_required: String,

    /// Human-readable description of what is being paid for.
    pub description: String,
}

/// The `x402` terms object of a 402 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct X402Terms {
    /// Payment protocol version (always 1).
    pub version: u32,

    /// Accepted payment methods; this relay offers exactly one.
    pub accepts: Vec<PaymentTerms>,
}

/// The full 402 Payment Required response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequiredBody {
    /// Always `"Payment Required"`.
    pub error: String,

    /// Structured payment terms.
    pub x402: X402Terms,

    /// The quote the terms were priced from.
    pub quote: QuoteBody,
}

impl PaymentRequiredBody {
    /// Assembles a 402 body from terms and the quote backing them.
    #[must_use]
    pub fn new(terms: PaymentTerms, quote: QuoteBody) -> Self {
        Self {
            error: "Payment Required".into(),
            x402: X402Terms {
                version: 1,
                accepts: vec![terms],
            },
            quote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn tier_table_matches_fixed_values() {
        let slow = Priority::Slow.config();
        assert_eq!(slow.markup_multiplier, 0.5);
        assert_eq!(slow.gas_price_multiplier, 0.8);
        assert_eq!(slow.estimated_time_secs, 30);

        let normal = Priority::Normal.config();
        assert_eq!(normal.markup_multiplier, 1.0);
        assert_eq!(normal.gas_price_multiplier, 1.0);
        assert_eq!(normal.estimated_time_secs, 10);

        let fast = Priority::Fast.config();
        assert_eq!(fast.markup_multiplier, 2.0);
        assert_eq!(fast.gas_price_multiplier, 1.5);
        assert_eq!(fast.estimated_time_secs, 3);
    }

    #[test]
    fn priority_wire_names() {
        assert_eq!(serde_json::to_string(&Priority::Fast).unwrap(), "\"fast\"");
        let parsed: Priority = serde_json::from_str("\"slow\"").unwrap();
        assert_eq!(parsed, Priority::Slow);
        assert_eq!(Priority::parse("normal"), Some(Priority::Normal));
        assert_eq!(Priority::parse("turbo"), None);
    }

    #[test]
    fn quote_body_field_names_are_exact() {
        let quote = QuoteBody {
            gas_estimate: "300000".into(),
            gas_price_gwei: "1000".into(),
            cro_price: 0.15,
            price_usdc: "0.054000".into(),
            priority: Priority::Normal,
            valid_until: "2026-08-02T12:00:00Z".into(),
        };
        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["gasEstimate"], "300000");
        assert_eq!(json["gasPriceGwei"], "1000");
        assert_eq!(json["croPrice"], 0.15);
        assert_eq!(json["priceUSDC"], "0.054000");
        assert_eq!(json["priority"], "normal");
        assert_eq!(json["validUntil"], "2026-08-02T12:00:00Z");
    }

    #[test]
    fn payment_required_body_shape() {
        let terms = PaymentTerms {
            scheme: "exact".into(),
            network: NetworkId::eip155(25),
            asset: address!("0x3333333333333333333333333333333333333333"),
            pay_to: address!("0x4444444444444444444444444444444444444444"),
            max_amount_required: "54000".into(),
            description: "Gasless transaction relay".into(),
        };
        let quote = QuoteBody {
            gas_estimate: "100000".into(),
            gas_price_gwei: "5000".into(),
            cro_price: 0.15,
            price_usdc: "0.090000".into(),
            priority: Priority::Normal,
            valid_until: "2026-08-02T12:00:00Z".into(),
        };
        let body = PaymentRequiredBody::new(terms, quote);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Payment Required");
        assert_eq!(json["x402"]["version"], 1);
        assert_eq!(json["x402"]["accepts"][0]["scheme"], "exact");
        assert_eq!(json["x402"]["accepts"][0]["network"], "eip155:25");
        assert_eq!(json["x402"]["accepts"][0]["maxAmountRequired"], "54000");
        assert_eq!(json["x402"]["accepts"][0]["payTo"],
            "0x4444444444444444444444444444444444444444");
    }
}
