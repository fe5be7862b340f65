//! The uniform HTTP error envelope.
//!
//! Every failing handler returns `{error: <CODE>, message, details?}`
//! with the status dictated by the code (see
//! [`ErrorCode`](relay402::ErrorCode)).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use relay402::ErrorCode;
use relay402_evm::{ChainError, ChainErrorKind, PaymentError};

/// A failing response: code, human message, optional structured detail.
#[derive(Debug)]
pub struct ApiError {
    /// Machine-readable code; determines the HTTP status.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured context.
    pub details: Option<Value>,
}

impl ApiError {
    /// Creates an error with no details.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// A 400 schema-validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    /// A 500 for anything unexpected.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Maps a chain failure from the post-settlement execution step.
    ///
    /// Execution-step failures are always surfaced as 5xx (the client
    /// paid and may retry the unconsumed forwarder nonce), except for a
    /// relayer that cannot cover gas, which is the dedicated 503.
    #[must_use]
    pub fn from_execution(err: &ChainError) -> Self {
        if err.is_insufficient_funds() {
            return Self::new(ErrorCode::InsufficientFunds, "relayer cannot cover gas")
                .with_details(json!({ "cause": err.cause }));
        }
        Self::new(ErrorCode::TxExecution, "forwarder execution failed").with_details(json!({
            "kind": format!("{:?}", err.kind),
            "retriable": err.retriable,
            "cause": err.cause,
        }))
    }

    /// Maps a settlement failure to the 402 `PAYMENT_FAILED` code.
    #[must_use]
    pub fn payment_failed(err: &PaymentError) -> Self {
        Self::new(ErrorCode::PaymentFailed, "payment settlement failed")
            .with_details(json!({ "cause": err.to_string() }))
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        let code = if err.is_insufficient_funds() {
            ErrorCode::InsufficientFunds
        } else {
            match err.kind {
                ChainErrorKind::Revert => ErrorCode::TxSimulation,
                ChainErrorKind::NonceTooLow | ChainErrorKind::Underpriced => ErrorCode::TxNonce,
                ChainErrorKind::Network => ErrorCode::TxBroadcast,
                ChainErrorKind::Unknown => ErrorCode::Internal,
            }
        };
        Self::new(code, err.cause.clone()).with_details(json!({
            "kind": format!("{:?}", err.kind),
            "retriable": err.retriable,
        }))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "error": self.code.as_str(),
            "message": self.message,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_error_kind_maps_to_code() {
        let err = ChainError::from_message("nonce too low");
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::TxNonce);
        assert_eq!(api.code.status(), 500);
    }

    #[test]
    fn insufficient_funds_is_503() {
        let err = ChainError::from_message("insufficient funds for gas * price + value");
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::InsufficientFunds);
        assert_eq!(api.code.status(), 503);
    }

    #[test]
    fn execution_step_is_5xx() {
        let err = ChainError::from_message("execution reverted");
        let api = ApiError::from_execution(&err);
        assert_eq!(api.code, ErrorCode::TxExecution);
        assert_eq!(api.code.status(), 500);
    }
}
