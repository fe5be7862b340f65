//! Verify-then-execute against the on-chain trusted forwarder.
//!
//! The forwarder contract is the single consumer of agent signatures:
//! its `verify` view checks the EIP-712 signature and per-agent nonce,
//! and its `execute` method performs the inner call with the agent's
//! address appended to calldata. This service wraps both, leasing a gas
//! wallet from the pool for every execution.

use std::sync::Arc;

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::MulticallItem;
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::{Eip712Domain, eip712_domain};
use serde_json::{Value, json};

use relay402::forward::ForwardRequest;
use relay402::timestamp::UnixTimestamp;

use crate::adapter::{ChainAdapter, SubmitTx};
use crate::contracts::IMinimalForwarder;
use crate::error::{ChainError, ChainErrorKind};
use crate::pool::RelayerPool;

/// EIP-712 domain name the forwarder contract was deployed with.
const DOMAIN_NAME: &str = "MinimalForwarder";
/// EIP-712 domain version the forwarder contract was deployed with.
const DOMAIN_VERSION: &str = "1";

/// Result of one forwarder execution.
///
/// `success` reports the *inner* call: the outer transaction mined
/// either way (an inner revert still consumes the agent's nonce on the
/// forwarder and pays for its gas).
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    /// Hash of the mined outer transaction.
    pub tx_hash: TxHash,
    /// Whether the inner call succeeded.
    pub success: bool,
    /// Inner return data, or the revert payload when `success` is false.
    pub return_data: Bytes,
    /// Gas consumed by the outer transaction.
    pub gas_used: u64,
    /// The gas wallet that submitted the outer transaction.
    pub relayer: Address,
}

/// EIP-712 domain handling plus verify/execute for the forwarder.
#[derive(Debug)]
pub struct ForwarderService {
    adapter: Arc<ChainAdapter>,
    pool: Arc<RelayerPool>,
    address: Address,
    chain_id: u64,
}

impl ForwarderService {
    /// Creates the service for the forwarder deployed at `address`.
    #[must_use]
    pub fn new(
        adapter: Arc<ChainAdapter>,
        pool: Arc<RelayerPool>,
        address: Address,
        chain_id: u64,
    ) -> Self {
        Self {
            adapter,
            pool,
            address,
            chain_id,
        }
    }

    /// The forwarder contract address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The EIP-712 domain agents must sign under.
    #[must_use]
    pub fn domain(&self) -> Eip712Domain {
        eip712_domain! {
            name: DOMAIN_NAME,
            version: DOMAIN_VERSION,
            chain_id: self.chain_id,
            verifying_contract: self.address,
        }
    }

    /// The domain as served to clients by `/meta/domain`.
    ///
    /// Field-for-field the same values as [`Self::domain`]; clients
    /// signing against this JSON produce signatures the contract's
    /// verifier accepts.
    #[must_use]
    pub fn domain_json(&self) -> Value {
        json!({
            "name": DOMAIN_NAME,
            "version": DOMAIN_VERSION,
            "chainId": self.chain_id,
            "verifyingContract": self.address,
        })
    }

    /// The EIP-712 type schema for `ForwardRequest`, as served to
    /// clients. Order matches the contract struct.
    #[must_use]
    pub fn types_json() -> Value {
        json!({
            "ForwardRequest": [
                { "name": "from", "type": "address" },
                { "name": "to", "type": "address" },
                { "name": "value", "type": "uint256" },
                { "name": "gas", "type": "uint256" },
                { "name": "nonce", "type": "uint256" },
                { "name": "deadline", "type": "uint256" },
                { "name": "data", "type": "bytes" },
            ]
        })
    }

    /// Current forwarder nonce for an agent.
    pub async fn get_nonce(&self, agent: Address) -> Result<U256, ChainError> {
        let contract = IMinimalForwarder::new(self.address, self.adapter.provider());
        Ok(contract.getNonce(agent).call().await?)
    }

    /// Checks an envelope against the forwarder's `verify` view.
    ///
    /// Passes iff the signature recovers to `request.from`, the
    /// on-chain nonce equals `request.nonce`, and the deadline has not
    /// passed. The deadline is checked locally first so obviously stale
    /// envelopes never cost an RPC round trip.
    pub async fn verify(
        &self,
        request: &ForwardRequest,
        signature: &Bytes,
    ) -> Result<bool, ChainError> {
        if request.is_expired(UnixTimestamp::now()) {
            return Ok(false);
        }
        let contract = IMinimalForwarder::new(self.address, self.adapter.provider());
        Ok(contract
            .verify(to_sol_request(request), signature.clone())
            .call()
            .await?)
    }

    /// Executes a verified envelope through the forwarder.
    ///
    /// Leases a gas wallet, estimates the outer `execute` call with a
    /// 20% buffer, submits, and decodes the `Executed` event for the
    /// inner outcome. The lease is released when this function returns,
    /// success or not.
    pub async fn execute(
        &self,
        request: &ForwardRequest,
        signature: &Bytes,
    ) -> Result<ExecuteOutcome, ChainError> {
        let lease = self.pool.acquire();
        let relayer = lease.address();
        tracing::debug!(agent = %request.from, %relayer, "executing forward request");
        // The lease must outlive the whole submit-and-wait span; it is
        // dropped when this scope unwinds, error paths included.
        let result = self.execute_from(relayer, request, signature).await;
        if let Err(e) = &result {
            if e.needs_nonce_resync() {
                // One in-process resync; the failed operation itself is
                // not retried, the client decides.
                if let Err(resync_err) = self.pool.resync(&self.adapter, relayer).await {
                    tracing::warn!(%relayer, error = %resync_err, "nonce resync failed");
                }
            }
        }
        result
    }

    async fn execute_from(
        &self,
        relayer: Address,
        request: &ForwardRequest,
        signature: &Bytes,
    ) -> Result<ExecuteOutcome, ChainError> {
        let contract = IMinimalForwarder::new(self.address, self.adapter.provider());
        let call = contract.execute(to_sol_request(request), signature.clone());
        let calldata = call.calldata().clone();

        let estimate_request = TransactionRequest::default()
            .with_from(relayer)
            .with_to(self.address)
            .with_input(calldata.clone())
            .with_value(request.value);
        let estimated = self.adapter.estimate_gas(estimate_request).await?;
        let padded = estimated + estimated / 5;

        let receipt = self
            .adapter
            .send(SubmitTx {
                from: relayer,
                to: self.address,
                calldata,
                value: request.value,
                gas_limit: Some(padded),
            })
            .await?;

        let tx_hash = receipt.transaction_hash;
        if !receipt.status() {
            return Err(ChainError::new(
                ChainErrorKind::Revert,
                format!("forwarder execute reverted in tx {tx_hash}"),
            ));
        }

        let executed = receipt.inner.logs().iter().find_map(|log| {
            (log.address() == self.address)
                .then(|| log.log_decode::<IMinimalForwarder::Executed>().ok())
                .flatten()
        });
        let Some(executed) = executed else {
            return Err(ChainError::new(
                ChainErrorKind::Unknown,
                format!("no Executed event in tx {tx_hash}"),
            ));
        };
        let event = executed.inner.data;

        tracing::info!(
            agent = %request.from,
            %relayer,
            tx = %tx_hash,
            inner_success = event.success,
            "forward request executed"
        );
        Ok(ExecuteOutcome {
            tx_hash,
            success: event.success,
            return_data: event.result,
            gas_used: receipt.gas_used,
            relayer,
        })
    }
}

/// Lowers the wire envelope into the contract's tuple type.
fn to_sol_request(request: &ForwardRequest) -> IMinimalForwarder::ForwardRequest {
    IMinimalForwarder::ForwardRequest {
        from: request.from,
        to: request.to,
        value: request.value,
        gas: request.gas,
        nonce: request.nonce,
        deadline: U256::from(request.deadline.as_secs()),
        data: request.data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn sol_request_mirrors_wire_envelope() {
        let request = ForwardRequest {
            from: address!("0x1111111111111111111111111111111111111111"),
            to: address!("0x2222222222222222222222222222222222222222"),
            value: U256::from(5u64),
            gas: U256::from(120_000u64),
            nonce: U256::from(7u64),
            deadline: UnixTimestamp::from_secs(1_700_000_000),
            data: Bytes::from(vec![0xde, 0xad]),
        };
        let sol = to_sol_request(&request);
        assert_eq!(sol.from, request.from);
        assert_eq!(sol.to, request.to);
        assert_eq!(sol.value, request.value);
        assert_eq!(sol.gas, request.gas);
        assert_eq!(sol.nonce, request.nonce);
        assert_eq!(sol.deadline, U256::from(1_700_000_000u64));
        assert_eq!(sol.data, request.data);
    }

    #[test]
    fn served_domain_matches_signing_domain() {
        // domain_json is what clients sign against; domain() is what the
        // verifier side holds. They must agree field for field.
        let forwarder = address!("0x3333333333333333333333333333333333333333");
        let json = json!({
            "name": DOMAIN_NAME,
            "version": DOMAIN_VERSION,
            "chainId": 25u64,
            "verifyingContract": forwarder,
        });
        let domain = eip712_domain! {
            name: DOMAIN_NAME,
            version: DOMAIN_VERSION,
            chain_id: 25u64,
            verifying_contract: forwarder,
        };
        assert_eq!(json["name"].as_str().unwrap(), domain.name.clone().unwrap());
        assert_eq!(
            json["version"].as_str().unwrap(),
            domain.version.clone().unwrap()
        );
        assert_eq!(
            U256::from(json["chainId"].as_u64().unwrap()),
            domain.chain_id.unwrap()
        );
        assert_eq!(
            serde_json::to_value(domain.verifying_contract.unwrap()).unwrap(),
            json["verifyingContract"]
        );
    }

    #[test]
    fn type_schema_field_order_matches_contract_struct() {
        let types = ForwarderService::types_json();
        let fields: Vec<&str> = types["ForwardRequest"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            fields,
            vec!["from", "to", "value", "gas", "nonce", "deadline", "data"]
        );
    }
}
