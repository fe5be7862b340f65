//! EVM chain layer for the relay402 gasless transaction relay.
//!
//! Everything that talks JSON-RPC lives here, behind typed seams:
//!
//! - [`adapter`] — The [`ChainAdapter`](adapter::ChainAdapter)
//!   capability boundary wrapping an alloy filler-stack provider
//! - [`pool`] — The [`RelayerPool`](pool::RelayerPool) of funded gas
//!   wallets with least-busy/round-robin selection and RAII leases
//! - [`forwarder`] — EIP-712 domain and verify/execute against the
//!   on-chain trusted forwarder
//! - [`payment`] — EIP-3009 authorization verification and settlement
//! - [`contracts`] — `sol!` ABI surface for the forwarder, the
//!   stablecoin, and the rebalance router
//! - [`nonce`] — Pending-view nonce management for concurrent
//!   submission
//! - [`error`] — The typed [`ChainError`](error::ChainError)

pub mod adapter;
pub mod contracts;
pub mod error;
pub mod forwarder;
pub mod nonce;
pub mod payment;
pub mod pool;

pub use adapter::{AdapterConfig, ChainAdapter, SubmitTx};
pub use error::{ChainError, ChainErrorKind};
pub use forwarder::{ExecuteOutcome, ForwarderService};
pub use payment::{PaymentError, PaymentService};
pub use pool::{PoolStats, RelayerLease, RelayerPool, SelectionPolicy};
