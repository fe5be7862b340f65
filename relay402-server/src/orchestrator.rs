//! The relay state machines behind `/meta/relay` and `/meta/batch`.
//!
//! Per request: validate → verify → price → 402-or-settle → execute →
//! respond. Payment settlement strictly happens-before execution (its
//! receipt is awaited); a post-settlement execution failure is returned
//! with the payment hash attached and is never rolled back — the
//! forwarder nonce was not consumed, so the client may retry.
//! No state survives a request beyond the observability counters.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256, keccak256};
use serde::Deserialize;
use serde_json::{Value, json};

use relay402::error::ErrorCode;
use relay402::forward::ForwardRequest;
use relay402::network::NetworkId;
use relay402::payment::SCHEME_EXACT;
use relay402::quote::{PaymentRequiredBody, PaymentTerms, Priority};
use relay402::responses::{BatchItemOutcome, BatchReceipt, RelayReceipt};
use relay402_evm::{ForwarderService, PaymentError, PaymentService};

use crate::error::ApiError;
use crate::pricing::{PriceQuote, PricingEngine, batch_discount, raw_to_usd_string};
use crate::stats::{RelayStats, TxStatus};

/// Largest accepted batch.
const MAX_BATCH_SIZE: usize = 10;

/// `POST /meta/relay` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RelayBody {
    /// The signed envelope.
    pub request: ForwardRequest,
    /// EIP-712 signature over the envelope.
    pub signature: Bytes,
    /// Requested tier; normal when absent.
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// One envelope inside a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchItem {
    /// The signed envelope.
    pub request: ForwardRequest,
    /// EIP-712 signature over the envelope.
    pub signature: Bytes,
}

/// `POST /meta/batch` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchBody {
    /// 1..=10 envelopes, executed in order.
    pub requests: Vec<BatchItem>,
    /// Requested tier; normal when absent.
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Terminal outcome of a single relay.
#[derive(Debug)]
pub enum RelayOutcome {
    /// No payment attached: here are the terms.
    PaymentRequired(PaymentRequiredBody),
    /// Paid and executed.
    Completed(RelayReceipt),
}

/// Terminal outcome of a batch relay.
#[derive(Debug)]
pub enum BatchOutcome {
    /// No payment attached: here are the terms.
    PaymentRequired(PaymentRequiredBody),
    /// Paid and executed (possibly with per-item failures).
    Completed(BatchReceipt),
}

/// The HTTP-facing relay pipeline.
#[derive(Debug)]
pub struct Orchestrator {
    forwarder: Arc<ForwarderService>,
    payment: Arc<PaymentService>,
    pricing: Arc<PricingEngine>,
    stats: Arc<RelayStats>,
    network: NetworkId,
    stablecoin: Address,
}

impl Orchestrator {
    /// Wires the pipeline from its collaborators.
    #[must_use]
    pub fn new(
        forwarder: Arc<ForwarderService>,
        payment: Arc<PaymentService>,
        pricing: Arc<PricingEngine>,
        stats: Arc<RelayStats>,
        network: NetworkId,
        stablecoin: Address,
    ) -> Self {
        Self {
            forwarder,
            payment,
            pricing,
            stats,
            network,
            stablecoin,
        }
    }

    /// Runs one envelope through the pipeline.
    ///
    /// # Errors
    ///
    /// See the endpoint contract: `INVALID_SIGNATURE` on a failed
    /// verify, `INVALID_PAYMENT` on an unparseable header,
    /// `PAYMENT_INVALID`/`PAYMENT_FAILED` on payment problems, and 5xx
    /// on chain failures.
    pub async fn relay(
        &self,
        body: RelayBody,
        payment_header: Option<&str>,
    ) -> Result<RelayOutcome, ApiError> {
        let tier = body.priority.unwrap_or_default();
        let request = &body.request;

        let verified = self.forwarder.verify(request, &body.signature).await?;
        if !verified {
            return Err(ApiError::new(
                ErrorCode::InvalidSignature,
                "forwarder rejected the envelope (signature, nonce, or deadline)",
            ));
        }

        // The client sized the inner call; its gas field is the estimate.
        let quote = self.pricing.price(request.gas, tier).await?;

        let Some(header) = payment_header else {
            let body = self.payment_required(
                &quote,
                quote.price_raw,
                "Gasless transaction relay".into(),
            );
            return Ok(RelayOutcome::PaymentRequired(body));
        };

        let Some(envelope) = PaymentService::parse_header(header) else {
            return Err(ApiError::new(
                ErrorCode::InvalidPayment,
                "X-Payment header is not a valid payment envelope",
            ));
        };

        if let Err(e) = self.payment.verify(&envelope, quote.price_raw).await {
            return Err(payment_verify_error(e));
        }

        let record = self.begin_record(request, &quote);

        let payment_tx = match self.payment.settle(&envelope).await {
            Ok(hash) => hash,
            Err(e) => {
                self.stats.finish(&record, TxStatus::Failed, None, None, None);
                return Err(ApiError::payment_failed(&e));
            }
        };
        let payment_tx = payment_tx.to_string();

        match self.forwarder.execute(request, &body.signature).await {
            Ok(outcome) => {
                let status = if outcome.success {
                    TxStatus::Confirmed
                } else {
                    TxStatus::Failed
                };
                self.stats.finish(
                    &record,
                    status,
                    Some(outcome.tx_hash.to_string()),
                    Some(payment_tx.clone()),
                    Some(outcome.gas_used.to_string()),
                );
                Ok(RelayOutcome::Completed(RelayReceipt {
                    success: outcome.success,
                    tx_hash: outcome.tx_hash.to_string(),
                    payment_tx_hash: payment_tx,
                    result: outcome.return_data.to_string(),
                    tier,
                }))
            }
            Err(e) => {
                self.stats
                    .finish(&record, TxStatus::Failed, None, Some(payment_tx.clone()), None);
                // The payment is not reversed; hand the client the hash
                // so it can correlate and retry the unconsumed envelope.
                let mut api = ApiError::from_execution(&e);
                attach_detail(&mut api, "paymentTxHash", json!(payment_tx));
                Err(api)
            }
        }
    }

    /// Runs a batch of envelopes through the pipeline: all-or-nothing
    /// verification, one discounted payment, sequential execution with
    /// no rollback.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::relay`], plus `VALIDATION_ERROR` on a
    /// batch outside 1..=10.
    pub async fn relay_batch(
        &self,
        body: BatchBody,
        payment_header: Option<&str>,
    ) -> Result<BatchOutcome, ApiError> {
        let tier = body.priority.unwrap_or_default();
        let count = body.requests.len();
        if count == 0 || count > MAX_BATCH_SIZE {
            return Err(ApiError::validation(format!(
                "batch size must be 1..={MAX_BATCH_SIZE}, got {count}"
            )));
        }

        for (index, item) in body.requests.iter().enumerate() {
            let verified = self.forwarder.verify(&item.request, &item.signature).await?;
            if !verified {
                return Err(ApiError::new(
                    ErrorCode::InvalidSignature,
                    format!("envelope at index {index} failed verification"),
                )
                .with_details(json!({ "index": index })));
            }
        }

        let total_gas = body
            .requests
            .iter()
            .fold(U256::ZERO, |acc, item| acc + item.request.gas);
        let quote = self.pricing.price(total_gas, tier).await?;
        let required = batch_discount(quote.price_raw);

        let Some(header) = payment_header else {
            let description =
                format!("Gasless batch relay ({count} transactions, 10% discount)");
            let body = self.payment_required(&quote, required, description);
            return Ok(BatchOutcome::PaymentRequired(body));
        };

        let Some(envelope) = PaymentService::parse_header(header) else {
            return Err(ApiError::new(
                ErrorCode::InvalidPayment,
                "X-Payment header is not a valid payment envelope",
            ));
        };

        if let Err(e) = self.payment.verify(&envelope, required).await {
            return Err(payment_verify_error(e));
        }

        let payment_tx = match self.payment.settle(&envelope).await {
            Ok(hash) => hash.to_string(),
            Err(e) => return Err(ApiError::payment_failed(&e)),
        };

        // Settlement happened once, up front; items that fail from here
        // on are reported, not refunded.
        let mut results = Vec::with_capacity(count);
        let mut all_succeeded = true;
        for item in &body.requests {
            let record = self.begin_record(&item.request, &quote);
            match self.forwarder.execute(&item.request, &item.signature).await {
                Ok(outcome) => {
                    let status = if outcome.success {
                        TxStatus::Confirmed
                    } else {
                        TxStatus::Failed
                    };
                    self.stats.finish(
                        &record,
                        status,
                        Some(outcome.tx_hash.to_string()),
                        Some(payment_tx.clone()),
                        Some(outcome.gas_used.to_string()),
                    );
                    all_succeeded &= outcome.success;
                    results.push(BatchItemOutcome {
                        success: outcome.success,
                        to: item.request.to.to_string(),
                        tx_hash: Some(outcome.tx_hash.to_string()),
                        error: (!outcome.success).then(|| "inner call reverted".into()),
                    });
                }
                Err(e) => {
                    self.stats
                        .finish(&record, TxStatus::Failed, None, Some(payment_tx.clone()), None);
                    all_succeeded = false;
                    results.push(BatchItemOutcome {
                        success: false,
                        to: item.request.to.to_string(),
                        tx_hash: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(BatchOutcome::Completed(BatchReceipt {
            success: all_succeeded,
            payment_tx_hash: payment_tx,
            results,
            tier,
        }))
    }

    /// Builds the 402 body for a quote and the amount actually required
    /// (which differs from the quote's own price for batches).
    fn payment_required(
        &self,
        quote: &PriceQuote,
        required_raw: U256,
        description: String,
    ) -> PaymentRequiredBody {
        let mut quote_body = quote.body();
        quote_body.price_usdc = raw_to_usd_string(required_raw, self.pricing.decimals());
        let terms = PaymentTerms {
            scheme: SCHEME_EXACT.into(),
            network: self.network.clone(),
            asset: self.stablecoin,
            pay_to: self.payment.receiving_wallet(),
            max_amount_required: required_raw.to_string(),
            description,
        };
        PaymentRequiredBody::new(terms, quote_body)
    }

    fn begin_record(&self, request: &ForwardRequest, quote: &PriceQuote) -> String {
        let envelope_hash = serde_json::to_vec(request)
            .map(|bytes| keccak256(&bytes).to_string())
            .unwrap_or_default();
        self.stats.begin(
            request.from.to_string(),
            envelope_hash,
            Some(quote.gas_estimate.to_string()),
            Some(quote.gas_price_wei.to_string()),
        )
    }
}

/// Maps a verification failure to its response: rejections carry their
/// reason at 402, chain failures keep their 5xx mapping.
fn payment_verify_error(err: PaymentError) -> ApiError {
    match err {
        PaymentError::Rejected(rejection) => ApiError::new(
            ErrorCode::PaymentInvalid,
            "payment authorization rejected",
        )
        .with_details(json!({ "reason": rejection.to_string() })),
        PaymentError::Chain(chain) => chain.into(),
        other => ApiError::new(ErrorCode::PaymentInvalid, other.to_string()),
    }
}

fn attach_detail(api: &mut ApiError, key: &str, value: Value) {
    match &mut api.details {
        Some(Value::Object(map)) => {
            map.insert(key.into(), value);
        }
        _ => {
            api.details = Some(json!({ key: value }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_body_accepts_optional_priority() {
        let json = json!({
            "request": {
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "value": "0",
                "gas": "100000",
                "nonce": "0",
                "deadline": "1999999999",
                "data": "0x"
            },
            "signature": "0x1234"
        });
        let body: RelayBody = serde_json::from_value(json).unwrap();
        assert!(body.priority.is_none());
        assert_eq!(body.request.gas, U256::from(100_000u64));
    }

    #[test]
    fn relay_body_rejects_unknown_fields() {
        let json = json!({
            "request": {
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "value": "0",
                "gas": "100000",
                "nonce": "0",
                "deadline": "1999999999",
                "data": "0x"
            },
            "signature": "0x1234",
            "gasPrice": "5"
        });
        assert!(serde_json::from_value::<RelayBody>(json).is_err());
    }

    #[test]
    fn batch_body_parses_priority() {
        let json = json!({
            "requests": [],
            "priority": "fast"
        });
        let body: BatchBody = serde_json::from_value(json).unwrap();
        assert_eq!(body.priority, Some(Priority::Fast));
        assert!(body.requests.is_empty());
    }
}
