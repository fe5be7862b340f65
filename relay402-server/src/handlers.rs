//! Route handlers and the application router.
//!
//! Endpoints:
//! - `GET /health` — liveness, balances, pool and pricing stats
//! - `GET /estimate` — price quotes for a prospective call
//! - `GET /meta/domain` — EIP-712 domain and types for client signing
//! - `GET /meta/nonce/{address}` — current forwarder nonce
//! - `POST /meta/relay` — single meta-transaction
//! - `POST /meta/batch` — 1..=10 meta-transactions, one payment

use std::net::SocketAddr;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;

use relay402::quote::{Priority, QuoteBody};
use relay402::responses::NonceInfo;
use relay402_evm::{ChainAdapter, ForwarderService, RelayerPool};

use crate::error::ApiError;
use crate::orchestrator::{BatchBody, BatchOutcome, Orchestrator, RelayBody, RelayOutcome};
use crate::pricing::PricingEngine;
use crate::rate_limit::{FixedWindowLimiter, RateScope};
use crate::rebalance::{AutoRebalancer, RebalanceStatus};
use crate::stats::RelayStats;

/// Native balance (wei) under which the primary relayer counts as low.
const LOW_NATIVE_THRESHOLD_UNITS: u64 = 10;

/// The `X-Payment` request header.
const PAYMENT_HEADER: &str = "x-payment";

/// Everything the handlers need, wired once at startup.
#[derive(Debug)]
pub struct AppState {
    /// The relay pipeline.
    pub orchestrator: Orchestrator,
    /// Forwarder views for domain/nonce endpoints.
    pub forwarder: Arc<ForwarderService>,
    /// Pricing for the estimate endpoint.
    pub pricing: Arc<PricingEngine>,
    /// Pool stats and the primary wallet.
    pub pool: Arc<RelayerPool>,
    /// Balance and gas price reads for health.
    pub adapter: Arc<ChainAdapter>,
    /// Relay counters.
    pub stats: Arc<RelayStats>,
    /// Request caps.
    pub limiter: FixedWindowLimiter,
    /// Rebalance loop, when a router is configured.
    pub rebalancer: Option<Arc<AutoRebalancer>>,
}

/// Shared handler state.
pub type SharedState = Arc<AppState>;

/// Builds the application router.
pub fn router(state: SharedState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/estimate", get(estimate))
        .route("/meta/domain", get(meta_domain))
        .route("/meta/nonce/{address}", get(meta_nonce))
        .route("/meta/relay", post(meta_relay))
        .route("/meta/batch", post(meta_batch))
        .with_state(state)
}

/// The 429 body: `{error, retryAfter}`.
fn rate_limited(retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "RATE_LIMITED", "retryAfter": retry_after })),
    )
        .into_response()
}

/// `GET /health`
async fn health(State(state): State<SharedState>) -> Response {
    let low_threshold =
        U256::from(LOW_NATIVE_THRESHOLD_UNITS) * U256::from(10u64).pow(U256::from(18u64));
    let primary = state.pool.primary();

    let mut warnings: Vec<String> = Vec::new();
    let mut relayers = Vec::new();
    for address in state.pool.addresses() {
        let native = state.adapter.native_balance(address).await.ok();
        let stablecoin = state.adapter.stablecoin_balance(address).await.ok();
        if address == primary {
            match native {
                Some(balance) if balance < low_threshold => warnings.push(format!(
                    "Low native balance on primary relayer {address}: below {LOW_NATIVE_THRESHOLD_UNITS} units"
                )),
                None => warnings.push(format!(
                    "Low visibility: could not read native balance of primary relayer {address}"
                )),
                Some(_) => {}
            }
        }
        relayers.push(json!({
            "address": address,
            "native": native.map(|b| b.to_string()),
            "stablecoin": stablecoin.map(|b| b.to_string()),
        }));
    }

    let gas_price_gwei = state
        .adapter
        .gas_price()
        .await
        .ok()
        .map(|wei| (wei / 1_000_000_000).to_string());

    let rebalance = state
        .rebalancer
        .as_ref()
        .map_or_else(RebalanceStatus::disabled, |r| r.status());

    let healthy = warnings.is_empty();
    let status_label = if healthy { "healthy" } else { "degraded" };
    let body = json!({
        "status": status_label,
        "warnings": warnings,
        "relayers": relayers,
        "pool": state.pool.stats(),
        "gasPriceGwei": gas_price_gwei,
        "oracle": state.pricing.spot(),
        "transactions": state.stats.snapshot(),
        "rebalance": rebalance,
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// `GET /estimate` query parameters.
#[derive(Debug, Deserialize)]
struct EstimateQuery {
    to: String,
    data: Option<String>,
    value: Option<String>,
    priority: Option<String>,
}

/// One quote row in the estimate response.
#[derive(Debug, Serialize)]
struct EstimateEntry {
    #[serde(flatten)]
    quote: QuoteBody,
    /// Required amount in stablecoin base units.
    #[serde(rename = "priceUSDCRaw")]
    price_usdc_raw: String,
}

/// `GET /estimate?to&data&value&priority?`
async fn estimate(
    State(state): State<SharedState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Result<Query<EstimateQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let ip = peer.ip().to_string();
    if let Err(retry) = state.limiter.check(RateScope::General, &ip) {
        return Ok(rate_limited(retry));
    }
    if let Err(retry) = state.limiter.check(RateScope::Estimate, &ip) {
        return Ok(rate_limited(retry));
    }
    let Query(query) = query.map_err(|e| ApiError::validation(e.body_text()))?;

    let to: Address = query
        .to
        .parse()
        .map_err(|_| ApiError::validation("to is not a valid address"))?;
    let data: Bytes = query
        .data
        .as_deref()
        .unwrap_or("0x")
        .parse()
        .map_err(|_| ApiError::validation("data is not valid hex"))?;
    let value: U256 = query
        .value
        .as_deref()
        .unwrap_or("0")
        .parse()
        .map_err(|_| ApiError::validation("value is not a decimal integer"))?;
    let tiers: Vec<Priority> = match query.priority.as_deref() {
        None => Priority::ALL.to_vec(),
        Some(raw) => vec![
            Priority::parse(raw)
                .ok_or_else(|| ApiError::validation("priority must be slow, normal, or fast"))?,
        ],
    };

    let gas = state
        .pricing
        .estimate_gas(state.pool.primary(), to, data, value)
        .await;

    let mut quotes = Vec::with_capacity(tiers.len());
    for tier in tiers {
        let quote = state.pricing.price(U256::from(gas), tier).await?;
        quotes.push(EstimateEntry {
            price_usdc_raw: quote.price_raw.to_string(),
            quote: quote.body(),
        });
    }

    Ok(Json(json!({ "gasEstimate": gas.to_string(), "quotes": quotes })).into_response())
}

/// `GET /meta/domain`
async fn meta_domain(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "domain": state.forwarder.domain_json(),
        "types": ForwarderService::types_json(),
        "forwarderAddress": state.forwarder.address(),
    }))
}

/// `GET /meta/nonce/{address}`
async fn meta_nonce(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Result<Json<NonceInfo>, ApiError> {
    let address: Address = address
        .parse()
        .map_err(|_| ApiError::validation("path segment is not a valid address"))?;
    let nonce = state.forwarder.get_nonce(address).await?;
    Ok(Json(NonceInfo {
        address: address.to_string(),
        nonce: nonce.to_string(),
    }))
}

/// `POST /meta/relay`
async fn meta_relay(
    State(state): State<SharedState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<RelayBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let ip = peer.ip().to_string();
    if let Err(retry) = state.limiter.check(RateScope::General, &ip) {
        return Ok(rate_limited(retry));
    }
    let Json(body) = body.map_err(|e| ApiError::validation(e.body_text()))?;

    // Relay budget is keyed by the agent, not the connecting proxy.
    let relay_key = body.request.from.to_string();
    if let Err(retry) = state.limiter.check(RateScope::Relay, &relay_key) {
        return Ok(rate_limited(retry));
    }

    let payment_header = headers
        .get(PAYMENT_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.orchestrator.relay(body, payment_header).await? {
        RelayOutcome::Completed(receipt) => Ok(Json(receipt).into_response()),
        RelayOutcome::PaymentRequired(terms) => {
            Ok((StatusCode::PAYMENT_REQUIRED, Json(terms)).into_response())
        }
    }
}

/// `POST /meta/batch`
async fn meta_batch(
    State(state): State<SharedState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<BatchBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let ip = peer.ip().to_string();
    if let Err(retry) = state.limiter.check(RateScope::General, &ip) {
        return Ok(rate_limited(retry));
    }
    let Json(body) = body.map_err(|e| ApiError::validation(e.body_text()))?;

    let relay_key = body
        .requests
        .first()
        .map_or_else(|| ip.clone(), |item| item.request.from.to_string());
    if let Err(retry) = state.limiter.check(RateScope::Relay, &relay_key) {
        return Ok(rate_limited(retry));
    }

    let payment_header = headers
        .get(PAYMENT_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.orchestrator.relay_batch(body, payment_header).await? {
        BatchOutcome::Completed(receipt) => Ok(Json(receipt).into_response()),
        BatchOutcome::PaymentRequired(terms) => {
            Ok((StatusCode::PAYMENT_REQUIRED, Json(terms)).into_response())
        }
    }
}
