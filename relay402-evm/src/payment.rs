//! EIP-3009 payment verification and settlement.
//!
//! The payment side of the 402 handshake: decode the `X-Payment`
//! header, run the off-chain and on-chain precondition checks in a
//! fixed order, and settle by submitting `transferWithAuthorization`
//! from a pooled gas wallet. Settlement strictly precedes forwarder
//! execution; the orchestrator enforces that edge.

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, TxHash, U256};
use alloy_provider::MulticallItem;

use relay402::error::PaymentRejection;
use relay402::network::NetworkId;
use relay402::payment::{PaymentEnvelope, SCHEME_EXACT, decode_payment_header};
use relay402::timestamp::UnixTimestamp;

use crate::adapter::{ChainAdapter, SubmitTx};
use crate::contracts::IStablecoin;
use crate::error::ChainError;
use crate::pool::RelayerPool;

/// Failures from payment verification or settlement.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The authorization failed a precondition check; the attached
    /// rejection is the first failing check in order.
    #[error("{0}")]
    Rejected(#[from] PaymentRejection),

    /// An RPC operation failed while checking or settling.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The settlement transaction mined but reverted.
    #[error("settlement transaction {0} reverted")]
    Reverted(TxHash),

    /// The envelope's signature is not 65 bytes of `r || s || v`.
    #[error("malformed signature: expected 65 bytes, got {0}")]
    MalformedSignature(usize),
}

/// The split components of a 65-byte `r || s || v` signature.
pub(crate) fn split_signature(signature: &Bytes) -> Result<(B256, B256, u8), PaymentError> {
    if signature.len() != 65 {
        return Err(PaymentError::MalformedSignature(signature.len()));
    }
    let r = B256::from_slice(&signature[0..32]);
    let s = B256::from_slice(&signature[32..64]);
    // Tolerate both recovery-id (0/1) and Ethereum (27/28) encodings.
    let v = match signature[64] {
        v @ 0..=1 => v + 27,
        v => v,
    };
    Ok((r, s, v))
}

/// Verifies and settles stablecoin payment authorizations.
#[derive(Debug)]
pub struct PaymentService {
    adapter: Arc<ChainAdapter>,
    pool: Arc<RelayerPool>,
    receiving_wallet: Address,
    network: NetworkId,
}

impl PaymentService {
    /// Creates the service paying into `receiving_wallet` on `network`.
    #[must_use]
    pub fn new(
        adapter: Arc<ChainAdapter>,
        pool: Arc<RelayerPool>,
        receiving_wallet: Address,
        network: NetworkId,
    ) -> Self {
        Self {
            adapter,
            pool,
            receiving_wallet,
            network,
        }
    }

    /// The wallet payments must be made out to.
    #[must_use]
    pub fn receiving_wallet(&self) -> Address {
        self.receiving_wallet
    }

    /// Decodes an `X-Payment` header value; `None` on any failure.
    #[must_use]
    pub fn parse_header(header: &str) -> Option<PaymentEnvelope> {
        decode_payment_header(header).ok()
    }

    /// Runs the precondition checks for a payment, in order, stopping
    /// at the first failure.
    ///
    /// Order: scheme, network, recipient, amount, validity window,
    /// on-chain replay state, on-chain payer balance. The recipient
    /// check is inherently case-insensitive — both sides are parsed
    /// 20-byte addresses, so `0xAB...` and `0xab...` compare equal.
    ///
    /// # Errors
    ///
    /// [`PaymentError::Rejected`] with the failing check's reason, or
    /// [`PaymentError::Chain`] if an RPC read fails.
    pub async fn verify(
        &self,
        envelope: &PaymentEnvelope,
        expected_amount: U256,
    ) -> Result<(), PaymentError> {
        if envelope.scheme != SCHEME_EXACT {
            return Err(PaymentRejection::UnsupportedScheme.into());
        }
        if envelope.network != self.network {
            return Err(PaymentRejection::NetworkMismatch.into());
        }

        let auth = envelope.authorization();
        if auth.to != self.receiving_wallet {
            return Err(PaymentRejection::WrongRecipient.into());
        }
        if auth.value < expected_amount {
            return Err(PaymentRejection::InsufficientAmount.into());
        }

        let now = UnixTimestamp::now();
        if now.as_secs() <= auth.valid_after.as_secs() {
            return Err(PaymentRejection::NotYetValid.into());
        }
        if now.as_secs() >= auth.valid_before.as_secs() {
            return Err(PaymentRejection::Expired.into());
        }

        let token = IStablecoin::new(self.adapter.stablecoin_address(), self.adapter.provider());
        let used = token
            .authorizationState(auth.from, auth.nonce)
            .call()
            .await
            .map_err(ChainError::from)?;
        if used {
            return Err(PaymentRejection::AlreadyUsed.into());
        }

        let balance = self.adapter.stablecoin_balance(auth.from).await?;
        if balance < auth.value {
            return Err(PaymentRejection::InsufficientBalance.into());
        }

        Ok(())
    }

    /// Settles a verified payment on-chain and returns the transaction
    /// hash once its receipt is observed.
    ///
    /// Splits the 65-byte signature into `(r, s, v)` and submits
    /// `transferWithAuthorization` from a leased gas wallet. A mined
    /// but reverted settlement is an error; callers must not proceed to
    /// execution.
    pub async fn settle(&self, envelope: &PaymentEnvelope) -> Result<TxHash, PaymentError> {
        let (r, s, v) = split_signature(&envelope.payload.signature)?;
        let auth = envelope.authorization();

        let lease = self.pool.acquire();
        let relayer = lease.address();
        tracing::debug!(payer = %auth.from, %relayer, value = %auth.value, "settling payment");

        let token = IStablecoin::new(self.adapter.stablecoin_address(), self.adapter.provider());
        let call = token.transferWithAuthorization(
            auth.from,
            auth.to,
            auth.value,
            U256::from(auth.valid_after.as_secs()),
            U256::from(auth.valid_before.as_secs()),
            auth.nonce,
            v,
            r,
            s,
        );

        let receipt = match self
            .adapter
            .send(SubmitTx {
                from: relayer,
                to: self.adapter.stablecoin_address(),
                calldata: call.calldata().clone(),
                value: U256::ZERO,
                gas_limit: None,
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                if e.needs_nonce_resync() {
                    if let Err(resync_err) = self.pool.resync(&self.adapter, relayer).await {
                        tracing::warn!(%relayer, error = %resync_err, "nonce resync failed");
                    }
                }
                return Err(e.into());
            }
        };

        let tx_hash = receipt.transaction_hash;
        if receipt.status() {
            tracing::info!(payer = %auth.from, tx = %tx_hash, "payment settled");
            Ok(tx_hash)
        } else {
            tracing::warn!(payer = %auth.from, tx = %tx_hash, "settlement reverted");
            Err(PaymentError::Reverted(tx_hash))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_sixty_five_byte_signature() {
        let mut raw = vec![0u8; 65];
        raw[0] = 0xaa; // first byte of r
        raw[32] = 0xbb; // first byte of s
        raw[64] = 28;
        let (r, s, v) = split_signature(&Bytes::from(raw)).unwrap();
        assert_eq!(r[0], 0xaa);
        assert_eq!(s[0], 0xbb);
        assert_eq!(v, 28);
    }

    #[test]
    fn normalizes_recovery_id_to_ethereum_v() {
        let mut raw = vec![0u8; 65];
        raw[64] = 1;
        let (_, _, v) = split_signature(&Bytes::from(raw)).unwrap();
        assert_eq!(v, 28);
    }

    #[test]
    fn rejects_wrong_length_signature() {
        let err = split_signature(&Bytes::from(vec![0u8; 64])).unwrap_err();
        assert!(matches!(err, PaymentError::MalformedSignature(64)));
    }
}
