//! relay402 gasless-transaction relay server.
//!
//! # Usage
//!
//! ```bash
//! CHAIN_RPC_URL=https://evm.cronos.org \
//! CHAIN_ID=25 \
//! RELAYER_PRIVATE_KEY=0x... \
//! STABLECOIN_ADDRESS=0x... \
//! FORWARDER_ADDRESS=0x... \
//! RECEIVING_WALLET=0x... \
//! MARKUP_PERCENTAGE=20 \
//! MIN_PRICE_USD=0.01 \
//! cargo run -p relay402-server --release
//! ```
//!
//! See [`relay402_server::config`] for the full variable list.
//! `RUST_LOG` controls the log filter (default: `info`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_rpc_client::RpcClient;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use alloy_transport_http::reqwest::{Client as ReqwestClient, Url};
use axum::http::Method;
use tokio::sync::watch;
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use relay402::network::NetworkId;
use relay402_evm::{
    AdapterConfig, ChainAdapter, ForwarderService, PaymentService, RelayerPool, SelectionPolicy,
};
use relay402_server::config::RelayConfig;
use relay402_server::handlers::{AppState, router};
use relay402_server::orchestrator::Orchestrator;
use relay402_server::pricing::{PricingConfig, PricingEngine};
use relay402_server::rate_limit::FixedWindowLimiter;
use relay402_server::rebalance::{AutoRebalancer, RebalanceConfig};
use relay402_server::stats::RelayStats;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("relay server failed: {e}");
        std::process::exit(1);
    }
}

#[allow(clippy::cognitive_complexity)]
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RelayConfig::from_env()?;
    tracing::info!(
        chain_id = config.chain_id,
        port = config.port,
        env = %config.node_env,
        relayers = config.relayer_keys.len(),
        "loaded configuration"
    );

    // Parse every relayer key; the first becomes the primary wallet.
    let mut signers: Vec<PrivateKeySigner> = Vec::with_capacity(config.relayer_keys.len());
    for (i, key) in config.relayer_keys.iter().enumerate() {
        let signer = key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| format!("relayer key at index {i} is invalid: {e}"))?;
        signers.push(signer);
    }
    let addresses: Vec<Address> = signers.iter().map(PrivateKeySigner::address).collect();
    let mut wallet = EthereumWallet::from(signers.remove(0));
    for signer in signers {
        wallet.register_signer(signer);
    }

    // RPC client with per-request timeout.
    let rpc_url: Url = config.rpc_url.parse()?;
    let http_client = ReqwestClient::builder()
        .timeout(Duration::from_secs(config.rpc_timeout_secs))
        .build()?;
    let transport = Http::with_client(http_client, rpc_url);
    let rpc_client = RpcClient::new(transport, false);

    let adapter = Arc::new(ChainAdapter::new(
        rpc_client,
        wallet,
        config.stablecoin_address,
        AdapterConfig::default(),
    ));

    let pool = Arc::new(
        RelayerPool::bootstrap(&adapter, addresses, SelectionPolicy::LeastBusy).await?,
    );
    tracing::info!(primary = %pool.primary(), wallets = pool.addresses().len(), "relayer pool ready");

    let network = NetworkId::eip155(config.chain_id);
    let forwarder = Arc::new(ForwarderService::new(
        Arc::clone(&adapter),
        Arc::clone(&pool),
        config.forwarder_address,
        config.chain_id,
    ));
    let payment = Arc::new(PaymentService::new(
        Arc::clone(&adapter),
        Arc::clone(&pool),
        config.receiving_wallet,
        network.clone(),
    ));

    let pricing = Arc::new(PricingEngine::new(
        Arc::clone(&adapter),
        PricingConfig {
            markup_percentage: config.markup_percentage,
            min_price_usd: config.min_price_usd,
            max_price_usd: config.max_price_usd,
            oracle_url: config.price_oracle_url.clone(),
            oracle_api_key: config.price_oracle_api_key.clone(),
            ..PricingConfig::default()
        },
    ));
    // Best-effort seed before serving; the fallback constant covers a
    // failed first fetch.
    pricing.refresh_once().await;

    let stats = Arc::new(RelayStats::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&forwarder),
        Arc::clone(&payment),
        Arc::clone(&pricing),
        Arc::clone(&stats),
        network,
        config.stablecoin_address,
    );

    let rebalancer = match (config.rebalance_router, config.wrapped_native) {
        (Some(router), Some(wrapped_native)) => Some(Arc::new(AutoRebalancer::new(
            Arc::clone(&adapter),
            Arc::clone(&pricing),
            pool.primary(),
            RebalanceConfig::new(router, wrapped_native),
        ))),
        _ => None,
    };

    // Background tasks stop on the shutdown signal and are joined
    // before exit.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(
        Arc::clone(&pricing).run_refresh_loop(shutdown_rx.clone()),
    ));
    if let Some(rebalancer) = rebalancer.clone() {
        tracing::info!("auto-rebalance enabled");
        tasks.push(tokio::spawn(rebalancer.run_loop(shutdown_rx.clone())));
    }

    let state = Arc::new(AppState {
        orchestrator,
        forwarder,
        pricing,
        pool,
        adapter,
        stats,
        limiter: FixedWindowLimiter::default(),
        rebalancer,
    });

    let app = router(state).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("relay listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    tracing::info!("relay shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("received Ctrl-C, shutting down...");
    }
}
