//! Startup configuration, loaded once from the environment.
//!
//! Every required variable must be present and well-formed or startup
//! aborts; there are no half-configured states. Optional variables have
//! conservative defaults.
//!
//! # Environment Variables
//!
//! Required:
//! - `CHAIN_RPC_URL` — HTTP JSON-RPC endpoint
//! - `CHAIN_ID` — numeric chain ID the relay serves
//! - `RELAYER_PRIVATE_KEY` or `RELAYER_PRIVATE_KEYS` (comma-separated)
//! - `STABLECOIN_ADDRESS`, `FORWARDER_ADDRESS`, `RECEIVING_WALLET`
//! - `MARKUP_PERCENTAGE` — percent above cost, 0..=100
//! - `MIN_PRICE_USD` — lower price clamp
//!
//! Optional:
//! - `MAX_PRICE_USD` (default 10.0), `PORT` (default 3000),
//!   `NODE_ENV` (default `development`), `RPC_TIMEOUT_SECS` (default 30)
//! - `PRICE_ORACLE_URL`, `PRICE_ORACLE_API_KEY`
//! - `REBALANCE_ROUTER_ADDRESS`, `WRAPPED_NATIVE_ADDRESS`
//! - `RUST_LOG` — log filter (read by the tracing subscriber)

use alloy_primitives::Address;

/// A missing or malformed configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is present but unusable.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// The offending variable.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Validated process-wide configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Chain ID the relay serves.
    pub chain_id: u64,
    /// Relayer signing keys, hex with or without `0x`.
    pub relayer_keys: Vec<String>,
    /// Stablecoin (EIP-3009) contract.
    pub stablecoin_address: Address,
    /// Trusted forwarder contract.
    pub forwarder_address: Address,
    /// Wallet payments must be made out to.
    pub receiving_wallet: Address,
    /// Percent charged above cost, scaled per tier.
    pub markup_percentage: f64,
    /// Lower price clamp, USD.
    pub min_price_usd: f64,
    /// Upper price clamp, USD.
    pub max_price_usd: f64,
    /// HTTP listen port.
    pub port: u16,
    /// Deployment environment label.
    pub node_env: String,
    /// Per-RPC timeout, seconds.
    pub rpc_timeout_secs: u64,
    /// External spot price endpoint; fallback constant when absent.
    pub price_oracle_url: Option<String>,
    /// API key for the spot price endpoint.
    pub price_oracle_api_key: Option<String>,
    /// V2-style router for auto-rebalance; loop disabled when absent.
    pub rebalance_router: Option<Address>,
    /// Wrapped-native token for the rebalance swap path.
    pub wrapped_native: Option<Address>,
}

impl RelayConfig {
    /// Loads and validates configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered; callers abort
    /// startup on any error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let rpc_url = required(&lookup, "CHAIN_RPC_URL")?;
        let chain_id = parse_required(&lookup, "CHAIN_ID")?;

        let relayer_keys = relayer_keys(&lookup)?;

        let stablecoin_address = parse_address(&lookup, "STABLECOIN_ADDRESS")?;
        let forwarder_address = parse_address(&lookup, "FORWARDER_ADDRESS")?;
        let receiving_wallet = parse_address(&lookup, "RECEIVING_WALLET")?;

        let markup_percentage: f64 = parse_required(&lookup, "MARKUP_PERCENTAGE")?;
        if !(0.0..=100.0).contains(&markup_percentage) {
            return Err(ConfigError::Invalid {
                name: "MARKUP_PERCENTAGE",
                reason: format!("{markup_percentage} is outside 0..=100"),
            });
        }
        let min_price_usd: f64 = parse_required(&lookup, "MIN_PRICE_USD")?;
        if min_price_usd < 0.0 {
            return Err(ConfigError::Invalid {
                name: "MIN_PRICE_USD",
                reason: "must be non-negative".into(),
            });
        }
        let max_price_usd = parse_optional(&lookup, "MAX_PRICE_USD")?.unwrap_or(10.0);
        if max_price_usd < min_price_usd {
            return Err(ConfigError::Invalid {
                name: "MAX_PRICE_USD",
                reason: format!("{max_price_usd} is below MIN_PRICE_USD {min_price_usd}"),
            });
        }

        let port = parse_optional(&lookup, "PORT")?.unwrap_or(3000);
        let node_env = lookup("NODE_ENV").unwrap_or_else(|| "development".into());
        let rpc_timeout_secs = parse_optional(&lookup, "RPC_TIMEOUT_SECS")?.unwrap_or(30);

        let rebalance_router = parse_address_optional(&lookup, "REBALANCE_ROUTER_ADDRESS")?;
        let wrapped_native = parse_address_optional(&lookup, "WRAPPED_NATIVE_ADDRESS")?;
        if rebalance_router.is_some() && wrapped_native.is_none() {
            return Err(ConfigError::Invalid {
                name: "WRAPPED_NATIVE_ADDRESS",
                reason: "required when REBALANCE_ROUTER_ADDRESS is set".into(),
            });
        }

        Ok(Self {
            rpc_url,
            chain_id,
            relayer_keys,
            stablecoin_address,
            forwarder_address,
            receiving_wallet,
            markup_percentage,
            min_price_usd,
            max_price_usd,
            port,
            node_env,
            rpc_timeout_secs,
            price_oracle_url: lookup("PRICE_ORACLE_URL").filter(|s| !s.is_empty()),
            price_oracle_api_key: lookup("PRICE_ORACLE_API_KEY").filter(|s| !s.is_empty()),
            rebalance_router,
            wrapped_native,
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_required<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    required(lookup, name)?
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

fn parse_optional<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name).map(|v| v.trim().to_owned()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
    }
}

fn parse_address(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Address, ConfigError> {
    parse_required(lookup, name)
}

fn parse_address_optional(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Address>, ConfigError> {
    parse_optional(lookup, name)
}

fn relayer_keys(lookup: &impl Fn(&str) -> Option<String>) -> Result<Vec<String>, ConfigError> {
    if let Some(list) = lookup("RELAYER_PRIVATE_KEYS").filter(|s| !s.trim().is_empty()) {
        let keys: Vec<String> = list
            .split(',')
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(ConfigError::Invalid {
                name: "RELAYER_PRIVATE_KEYS",
                reason: "no usable keys in list".into(),
            });
        }
        return Ok(keys);
    }
    required(lookup, "RELAYER_PRIVATE_KEY").map(|k| vec![k])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("CHAIN_RPC_URL", "http://localhost:8545"),
            ("CHAIN_ID", "25"),
            (
                "RELAYER_PRIVATE_KEY",
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            ),
            (
                "STABLECOIN_ADDRESS",
                "0xc21223249CA28397B4B6541dfFaEcC539BfF0c59",
            ),
            (
                "FORWARDER_ADDRESS",
                "0x5555555555555555555555555555555555555555",
            ),
            (
                "RECEIVING_WALLET",
                "0x6666666666666666666666666666666666666666",
            ),
            ("MARKUP_PERCENTAGE", "20"),
            ("MIN_PRICE_USD", "0.01"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<RelayConfig, ConfigError> {
        RelayConfig::from_lookup(|name| env.get(name).map(|v| (*v).to_owned()))
    }

    #[test]
    fn loads_with_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.chain_id, 25);
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_price_usd, 10.0);
        assert_eq!(config.rpc_timeout_secs, 30);
        assert_eq!(config.relayer_keys.len(), 1);
        assert_eq!(config.node_env, "development");
        assert!(config.rebalance_router.is_none());
    }

    #[test]
    fn missing_required_aborts() {
        let mut env = base_env();
        env.remove("FORWARDER_ADDRESS");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Missing("FORWARDER_ADDRESS"))
        ));
    }

    #[test]
    fn key_list_takes_precedence() {
        let mut env = base_env();
        env.insert("RELAYER_PRIVATE_KEYS", "0xaa, 0xbb,0xcc");
        let config = load(&env).unwrap();
        assert_eq!(config.relayer_keys, vec!["0xaa", "0xbb", "0xcc"]);
    }

    #[test]
    fn markup_out_of_range_rejected() {
        let mut env = base_env();
        env.insert("MARKUP_PERCENTAGE", "150");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid {
                name: "MARKUP_PERCENTAGE",
                ..
            })
        ));
    }

    #[test]
    fn bad_address_rejected() {
        let mut env = base_env();
        env.insert("STABLECOIN_ADDRESS", "not-an-address");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid {
                name: "STABLECOIN_ADDRESS",
                ..
            })
        ));
    }

    #[test]
    fn max_below_min_rejected() {
        let mut env = base_env();
        env.insert("MIN_PRICE_USD", "5");
        env.insert("MAX_PRICE_USD", "1");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid {
                name: "MAX_PRICE_USD",
                ..
            })
        ));
    }

    #[test]
    fn router_requires_wrapped_native() {
        let mut env = base_env();
        env.insert(
            "REBALANCE_ROUTER_ADDRESS",
            "0x7777777777777777777777777777777777777777",
        );
        assert!(load(&env).is_err());
        env.insert(
            "WRAPPED_NATIVE_ADDRESS",
            "0x8888888888888888888888888888888888888888",
        );
        assert!(load(&env).is_ok());
    }
}
