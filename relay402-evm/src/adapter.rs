//! The typed capability boundary over JSON-RPC.
//!
//! Every chain interaction the relay performs goes through
//! [`ChainAdapter`]: balance and nonce queries, gas estimation,
//! read-only simulation, and signed submission with receipt await.
//! Contract views are read through `sol!` instances constructed over
//! [`ChainAdapter::provider`]. All failures surface as the typed
//! [`ChainError`].

use std::time::Duration;

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{BlockId, TransactionReceipt, TransactionRequest};

use crate::contracts::IStablecoin;
use crate::error::ChainError;
use crate::nonce::PendingNonces;

/// Combined filler type: gas + blob gas + nonce ([`PendingNonces`]) + chain id.
pub type InnerFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<PendingNonces>, ChainIdFiller>>,
>;

/// Fully composed provider with all fillers and wallet signing.
pub type RelayProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// Tunables for [`ChainAdapter`].
#[derive(Debug, Clone, Copy)]
pub struct AdapterConfig {
    /// Seconds to wait for a transaction receipt.
    pub receipt_timeout_secs: u64,
    /// Block confirmations to require before a receipt counts.
    pub confirmations: u64,
    /// Gas price reported when the node answers `eth_gasPrice` with
    /// zero, in wei. Some nodes do during quiet periods, and a
    /// zero-priced transaction would sit in the mempool forever.
    pub gas_price_floor_wei: u128,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 30,
            confirmations: 1,
            // 5,000 gwei, the floor enforced by Cronos-family nodes.
            gas_price_floor_wei: 5_000_000_000_000,
        }
    }
}

/// A signed submission: target, calldata, and optional explicit limits.
///
/// `from` must be one of the wallet's signers; the filler stack derives
/// the nonce from the node's pending view at submit time (see
/// [`PendingNonces`]).
#[derive(Debug, Clone)]
pub struct SubmitTx {
    /// Sending relayer wallet.
    pub from: Address,
    /// Target contract.
    pub to: Address,
    /// Encoded function call.
    pub calldata: Bytes,
    /// Native value to attach.
    pub value: U256,
    /// Explicit gas limit; estimated against the pending block when
    /// absent.
    pub gas_limit: Option<u64>,
}

/// Typed RPC surface wrapping a fully-composed alloy provider.
#[derive(Debug)]
pub struct ChainAdapter {
    inner: RelayProvider,
    nonces: PendingNonces,
    stablecoin: Address,
    config: AdapterConfig,
}

impl ChainAdapter {
    /// Builds an adapter from a pre-configured RPC client and wallet.
    ///
    /// The `rpc_client` carries transport-level concerns (timeouts);
    /// the `wallet` holds every relayer signer.
    #[must_use]
    pub fn new(
        rpc_client: RpcClient,
        wallet: EthereumWallet,
        stablecoin: Address,
        config: AdapterConfig,
    ) -> Self {
        let nonces = PendingNonces::default();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(NonceFiller::new(nonces.clone()), ChainIdFiller::default()),
            ),
        );
        let inner: RelayProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(rpc_client);
        Self {
            inner,
            nonces,
            stablecoin,
            config,
        }
    }

    /// The underlying provider, for constructing contract views.
    #[must_use]
    pub fn provider(&self) -> &RelayProvider {
        &self.inner
    }

    /// The configured stablecoin contract address.
    #[must_use]
    pub fn stablecoin_address(&self) -> Address {
        self.stablecoin
    }

    /// Native balance of an address, in wei.
    pub async fn native_balance(&self, addr: Address) -> Result<U256, ChainError> {
        Ok(self.inner.get_balance(addr).await?)
    }

    /// Stablecoin balance of an address, in base units.
    pub async fn stablecoin_balance(&self, addr: Address) -> Result<U256, ChainError> {
        let token = IStablecoin::new(self.stablecoin, &self.inner);
        Ok(token.balanceOf(addr).call().await?)
    }

    /// Current gas price in wei; the configured floor stands in when
    /// the node reports zero.
    pub async fn gas_price(&self) -> Result<u128, ChainError> {
        let reported = self.inner.get_gas_price().await?;
        if reported == 0 {
            return Ok(self.config.gas_price_floor_wei);
        }
        Ok(reported)
    }

    /// Transaction count including mempool entries.
    pub async fn pending_nonce(&self, addr: Address) -> Result<u64, ChainError> {
        Ok(self
            .inner
            .get_transaction_count(addr)
            .pending()
            .await?)
    }

    /// Gas estimate against the pending block.
    pub async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64, ChainError> {
        Ok(self
            .inner
            .estimate_gas(tx)
            .block(BlockId::pending())
            .await?)
    }

    /// Read-only simulation; the revert payload comes back as a
    /// [`ChainError`] of kind `Revert`.
    pub async fn call(&self, tx: TransactionRequest) -> Result<Bytes, ChainError> {
        Ok(self.inner.call(tx).await?)
    }

    /// Signs and broadcasts, then waits for the receipt.
    ///
    /// The nonce is filled from [`PendingNonces`] at submit time. On
    /// any failure the sending wallet's cached nonce is dropped, since
    /// the transaction may or may not have entered the mempool.
    pub async fn send(&self, tx: SubmitTx) -> Result<TransactionReceipt, ChainError> {
        let mut request = TransactionRequest::default()
            .with_from(tx.from)
            .with_to(tx.to)
            .with_input(tx.calldata)
            .with_value(tx.value);

        let gas_limit = match tx.gas_limit {
            Some(limit) => limit,
            None => self.estimate_gas(request.clone()).await?,
        };
        request.set_gas_limit(gas_limit);

        let pending = match self.inner.send_transaction(request).await {
            Ok(pending) => pending,
            Err(e) => {
                self.nonces.reset(tx.from).await;
                return Err(ChainError::from(e));
            }
        };

        let timeout = Duration::from_secs(self.config.receipt_timeout_secs);
        let watcher = pending
            .with_required_confirmations(self.config.confirmations)
            .with_timeout(Some(timeout));

        match watcher.get_receipt().await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.nonces.reset(tx.from).await;
                Err(ChainError::from(e))
            }
        }
    }

    /// Drops the cached nonce for a wallet so the next submission
    /// re-queries the node's pending view.
    pub async fn reset_nonce(&self, addr: Address) {
        self.nonces.reset(addr).await;
    }
}
