//! HTTP server for the relay402 gasless transaction relay.
//!
//! Wires the chain layer into an axum application:
//!
//! - [`config`] — Environment-driven startup configuration
//! - [`pricing`] — Gas-to-stablecoin pricing with a cached USD spot
//! - [`orchestrator`] — The relay/batch state machines
//! - [`handlers`] — Route handlers and the application router
//! - [`rate_limit`] — Fixed-window request caps
//! - [`stats`] — Relayed-transaction counters and recent records
//! - [`rebalance`] — The stablecoin-to-native top-up loop
//! - [`error`] — The uniform HTTP error envelope

pub mod config;
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod pricing;
pub mod rate_limit;
pub mod rebalance;
pub mod stats;
