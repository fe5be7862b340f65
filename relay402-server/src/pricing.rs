//! Gas-to-stablecoin pricing.
//!
//! Prices are derived from three inputs: a gas amount, the current
//! network gas price, and a cached native-token USD spot. The spot is
//! refreshed by a background task; a fetch failure keeps the previous
//! value and a hard fallback constant seeds the very first one, so
//! quoting never blocks on the oracle.
//!
//! Monetary arithmetic runs in `f64` at microdollar resolution;
//! gas-times-gas-price stays in integer wei the whole way.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, U256};
use alloy_rpc_types_eth::TransactionRequest;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use relay402::quote::{Priority, QuoteBody};
use relay402_evm::{ChainAdapter, ChainError};

/// Pricing knobs, fixed at startup.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Percent charged above cost, scaled per tier.
    pub markup_percentage: f64,
    /// Lower price clamp, USD (scaled per tier, floored at $0.005).
    pub min_price_usd: f64,
    /// Upper price clamp, USD.
    pub max_price_usd: f64,
    /// Stablecoin decimal count (6 for USDC).
    pub stablecoin_decimals: u32,
    /// Seconds a quote remains honored.
    pub quote_validity_secs: u64,
    /// Seconds between spot refreshes.
    pub refresh_interval_secs: u64,
    /// Seed value until the first successful oracle fetch.
    pub fallback_native_usd: f64,
    /// Gas estimate used when estimation fails.
    pub default_gas_estimate: u64,
    /// External spot endpoint returning `{"price": <usd>}`.
    pub oracle_url: Option<String>,
    /// API key sent as `x-api-key` when present.
    pub oracle_api_key: Option<String>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            markup_percentage: 20.0,
            min_price_usd: 0.01,
            max_price_usd: 10.0,
            stablecoin_decimals: 6,
            quote_validity_secs: 60,
            refresh_interval_secs: 60,
            fallback_native_usd: 0.08,
            default_gas_estimate: 500_000,
            oracle_url: None,
            oracle_api_key: None,
        }
    }
}

/// The cached native-token spot and its provenance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotSnapshot {
    /// Native token price in USD.
    pub usd: f64,
    /// When the value was obtained.
    pub fetched_at: DateTime<Utc>,
    /// `"oracle"` after a successful fetch, `"fallback"` before.
    pub source: &'static str,
}

/// A fully computed price, pure value.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    /// Gas units the quote covers.
    pub gas_estimate: U256,
    /// Tier-adjusted gas price, wei.
    pub gas_price_wei: u128,
    /// Spot used for the conversion.
    pub native_usd: f64,
    /// Raw cost before markup, USD.
    pub base_cost_usd: f64,
    /// Applied markup factor (≥ 1).
    pub markup_factor: f64,
    /// Final clamped price, USD.
    pub price_usd: f64,
    /// Final price in stablecoin base units.
    pub price_raw: U256,
    /// Tier priced for.
    pub priority: Priority,
    /// Instant the quote stops being honored.
    pub valid_until: DateTime<Utc>,
}

impl PriceQuote {
    /// The wire-format `quote` object.
    #[must_use]
    pub fn body(&self) -> QuoteBody {
        QuoteBody {
            gas_estimate: self.gas_estimate.to_string(),
            gas_price_gwei: (self.gas_price_wei / 1_000_000_000).to_string(),
            cro_price: self.native_usd,
            price_usdc: format!("{:.6}", self.price_usd),
            priority: self.priority,
            valid_until: self.valid_until.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Applies the flat 10% batch discount, flooring to base units.
#[must_use]
pub fn batch_discount(raw: U256) -> U256 {
    raw * U256::from(9u64) / U256::from(10u64)
}

/// Formats stablecoin base units as a human decimal string.
#[must_use]
pub fn raw_to_usd_string(raw: U256, decimals: u32) -> String {
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole = raw / scale;
    let frac = raw % scale;
    format!("{whole}.{frac:0>width$}", width = decimals as usize)
}

/// Computes a quote from explicit inputs. Deterministic: all clock and
/// chain reads happen in the callers.
fn compute_quote(
    config: &PricingConfig,
    spot: f64,
    gas_estimate: U256,
    gas_price_wei: u128,
    tier: Priority,
    now: DateTime<Utc>,
) -> PriceQuote {
    let tier_config = tier.config();

    let adjusted_gas_price = (gas_price_wei as f64 * tier_config.gas_price_multiplier) as u128;
    let wei_total = gas_estimate * U256::from(adjusted_gas_price);
    let native_total = u128::try_from(wei_total).unwrap_or(u128::MAX) as f64 / 1e18;
    let base_cost_usd = native_total * spot;

    let markup_factor = 1.0 + config.markup_percentage / 100.0 * tier_config.markup_multiplier;
    let price_floor = (config.min_price_usd * tier_config.markup_multiplier).max(0.005);
    let price_usd = (base_cost_usd * markup_factor)
        .max(price_floor)
        .min(config.max_price_usd);

    let price_string = format!("{:.6}", price_usd);
    let price_raw = usd_string_to_raw(&price_string, config.stablecoin_decimals);

    PriceQuote {
        gas_estimate,
        gas_price_wei: adjusted_gas_price,
        native_usd: spot,
        base_cost_usd,
        markup_factor,
        price_usd,
        price_raw,
        priority: tier,
        valid_until: now + chrono::Duration::seconds(config.quote_validity_secs as i64),
    }
}

/// Parses a fixed-six-decimal USD string into stablecoin base units.
fn usd_string_to_raw(price: &str, decimals: u32) -> U256 {
    let (whole, frac) = price.split_once('.').unwrap_or((price, ""));
    let mut frac = frac.to_string();
    frac.truncate(decimals as usize);
    while frac.len() < decimals as usize {
        frac.push('0');
    }
    let whole: u128 = whole.parse().unwrap_or(0);
    let frac: u128 = if frac.is_empty() { 0 } else { frac.parse().unwrap_or(0) };
    U256::from(whole) * U256::from(10u64).pow(U256::from(decimals)) + U256::from(frac)
}

/// The response shape expected from the external spot endpoint.
#[derive(Debug, Deserialize)]
struct OracleResponse {
    price: f64,
}

/// Pricing engine: cached spot + quoting + gas estimation.
#[derive(Debug)]
pub struct PricingEngine {
    adapter: Arc<ChainAdapter>,
    config: PricingConfig,
    spot: RwLock<SpotSnapshot>,
    http: reqwest::Client,
}

impl PricingEngine {
    /// Creates an engine seeded with the fallback spot.
    #[must_use]
    pub fn new(adapter: Arc<ChainAdapter>, config: PricingConfig) -> Self {
        let seed = SpotSnapshot {
            usd: config.fallback_native_usd,
            fetched_at: Utc::now(),
            source: "fallback",
        };
        Self {
            adapter,
            config,
            spot: RwLock::new(seed),
            http: reqwest::Client::new(),
        }
    }

    /// The stablecoin decimal count quotes convert into.
    #[must_use]
    pub fn decimals(&self) -> u32 {
        self.config.stablecoin_decimals
    }

    /// The current spot snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the spot lock is poisoned, which cannot happen: no
    /// writer panics while holding it.
    #[must_use]
    pub fn spot(&self) -> SpotSnapshot {
        self.spot.read().expect("spot lock poisoned").clone()
    }

    /// Prices a gas amount at the current network gas price.
    pub async fn price(&self, gas_estimate: U256, tier: Priority) -> Result<PriceQuote, ChainError> {
        let gas_price = self.adapter.gas_price().await?;
        Ok(self.quote(gas_estimate, gas_price, tier))
    }

    /// Prices a gas amount at an explicit gas price.
    #[must_use]
    pub fn quote(&self, gas_estimate: U256, gas_price_wei: u128, tier: Priority) -> PriceQuote {
        compute_quote(
            &self.config,
            self.spot().usd,
            gas_estimate,
            gas_price_wei,
            tier,
            Utc::now(),
        )
    }

    /// Estimates gas for a call as submitted by `from`, with a 20%
    /// safety buffer. Falls back to the configured default when the
    /// node refuses to estimate.
    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> u64 {
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(data)
            .with_value(value);
        match self.adapter.estimate_gas(request).await {
            Ok(estimated) => estimated + estimated / 5,
            Err(e) => {
                tracing::warn!(error = %e, "gas estimation failed, using default");
                self.config.default_gas_estimate
            }
        }
    }

    /// Fetches the spot once. Returns whether the cached value changed;
    /// failures keep the previous value.
    pub async fn refresh_once(&self) -> bool {
        let Some(url) = self.config.oracle_url.as_deref() else {
            return false;
        };
        let mut request = self.http.get(url);
        if let Some(key) = self.config.oracle_api_key.as_deref() {
            request = request.header("x-api-key", key);
        }
        let fetched = async {
            let response = request.send().await?.error_for_status()?;
            response.json::<OracleResponse>().await
        }
        .await;

        match fetched {
            Ok(body) if body.price.is_finite() && body.price > 0.0 => {
                let mut spot = self.spot.write().expect("spot lock poisoned");
                *spot = SpotSnapshot {
                    usd: body.price,
                    fetched_at: Utc::now(),
                    source: "oracle",
                };
                tracing::debug!(price = body.price, "refreshed native spot price");
                true
            }
            Ok(body) => {
                tracing::warn!(price = body.price, "oracle returned unusable price, keeping previous");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "spot refresh failed, keeping previous");
                false
            }
        }
    }

    /// Runs the refresh loop until the shutdown signal flips.
    pub async fn run_refresh_loop(
        self: Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.refresh_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
                _ = shutdown.changed() => {
                    tracing::debug!("price refresh loop stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GWEI: u128 = 1_000_000_000;

    fn config() -> PricingConfig {
        PricingConfig {
            markup_percentage: 20.0,
            min_price_usd: 0.01,
            max_price_usd: 10.0,
            ..PricingConfig::default()
        }
    }

    fn quote(gas: u64, gas_price: u128, tier: Priority, spot: f64) -> PriceQuote {
        compute_quote(
            &config(),
            spot,
            U256::from(gas),
            gas_price,
            tier,
            Utc::now(),
        )
    }

    #[test]
    fn batch_of_three_prices_and_discounts() {
        // Three requests of 100k gas priced once at their 300k total,
        // 20% markup, $0.15 spot: $0.045 cost -> $0.054 quoted, and the
        // batch discount floors 90% of 54000 base units to 48600.
        let single = quote(300_000, 1_000 * GWEI, Priority::Normal, 0.15);
        assert!((single.price_usd - 0.054).abs() < 1e-9);
        assert_eq!(single.price_raw, U256::from(54_000u64));
        assert_eq!(batch_discount(single.price_raw), U256::from(48_600u64));
    }

    #[test]
    fn tier_monotonicity() {
        let slow = quote(300_000, 1_000 * GWEI, Priority::Slow, 0.15);
        let normal = quote(300_000, 1_000 * GWEI, Priority::Normal, 0.15);
        let fast = quote(300_000, 1_000 * GWEI, Priority::Fast, 0.15);
        assert!(fast.price_raw >= normal.price_raw);
        assert!(normal.price_raw >= slow.price_raw);
    }

    #[test]
    fn gas_price_scales_with_tier() {
        let fast = quote(100_000, 1_000 * GWEI, Priority::Fast, 0.15);
        assert_eq!(fast.gas_price_wei, 1_500 * GWEI);
        let slow = quote(100_000, 1_000 * GWEI, Priority::Slow, 0.15);
        assert_eq!(slow.gas_price_wei, 800 * GWEI);
    }

    #[test]
    fn price_clamps_to_minimum() {
        // A tiny transfer costs almost nothing; the per-tier floor wins.
        let cheap = quote(21_000, GWEI, Priority::Normal, 0.15);
        assert!((cheap.price_usd - 0.01).abs() < 1e-9);
        assert_eq!(cheap.price_raw, U256::from(10_000u64));
    }

    #[test]
    fn slow_tier_floor_never_drops_below_half_cent() {
        let cfg = PricingConfig {
            min_price_usd: 0.001,
            ..config()
        };
        let quoted = compute_quote(
            &cfg,
            0.15,
            U256::from(21_000u64),
            GWEI,
            Priority::Slow,
            Utc::now(),
        );
        assert!((quoted.price_usd - 0.005).abs() < 1e-9);
    }

    #[test]
    fn price_clamps_to_maximum() {
        let expensive = quote(30_000_000, 100_000 * GWEI, Priority::Fast, 0.5);
        assert!((expensive.price_usd - 10.0).abs() < 1e-9);
        assert_eq!(expensive.price_raw, U256::from(10_000_000u64));
    }

    #[test]
    fn quote_body_formats_price_to_six_decimals() {
        let quoted = quote(300_000, 1_000 * GWEI, Priority::Normal, 0.15);
        let body = quoted.body();
        assert_eq!(body.price_usdc, "0.054000");
        assert_eq!(body.gas_estimate, "300000");
        assert_eq!(body.gas_price_gwei, "1000");
        assert_eq!(body.cro_price, 0.15);
    }

    #[test]
    fn raw_formatting_roundtrip() {
        assert_eq!(raw_to_usd_string(U256::from(48_600u64), 6), "0.048600");
        assert_eq!(raw_to_usd_string(U256::from(10_000_000u64), 6), "10.000000");
        assert_eq!(usd_string_to_raw("0.048600", 6), U256::from(48_600u64));
        assert_eq!(usd_string_to_raw("10.000000", 6), U256::from(10_000_000u64));
    }

    #[test]
    fn discount_floors() {
        assert_eq!(batch_discount(U256::from(55u64)), U256::from(49u64));
        assert_eq!(batch_discount(U256::from(10u64)), U256::from(9u64));
    }
}
