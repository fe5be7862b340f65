//! Core protocol types for the relay402 gasless transaction relay.
//!
//! This crate holds the wire formats shared by the relay server and its
//! clients. It performs no I/O and knows nothing about HTTP or RPC:
//!
//! - [`forward`] — The signed [`ForwardRequest`](forward::ForwardRequest)
//!   envelope executed by the on-chain trusted forwarder
//! - [`payment`] — The `X-Payment` header envelope carrying an EIP-3009
//!   transfer authorization, plus its Base64 codec
//! - [`quote`] — Priority tiers, price quotes, and the 402 response body
//! - [`responses`] — Success bodies returned by the relay endpoints
//! - [`network`] — CAIP-2 style network identifiers (`eip155:25`)
//! - [`timestamp`] — Unix timestamps serialized as decimal strings
//! - [`error`] — Error codes and payment rejection reasons

pub mod error;
pub mod forward;
pub mod network;
pub mod payment;
pub mod quote;
pub mod responses;
pub mod timestamp;

pub use error::{ErrorCode, PaymentRejection};
pub use forward::ForwardRequest;
pub use network::NetworkId;
pub use payment::{PaymentAuthorization, PaymentEnvelope, PaymentPayload};
pub use quote::{PaymentRequiredBody, PaymentTerms, Priority, QuoteBody, TierConfig};
pub use responses::{BatchItemOutcome, BatchReceipt, NonceInfo, RelayReceipt};
pub use timestamp::UnixTimestamp;
