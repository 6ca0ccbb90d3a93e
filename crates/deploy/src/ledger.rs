//! The ledger seam: every remote read and write the engine performs goes through [`Ledger`].

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A transaction to be signed and sent by the node-managed `from` account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    pub from: Address,
    /// `None` for contract creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(rename = "data")]
    pub input: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(rename = "gas", skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
}

impl TxRequest {
    /// A call to an existing contract.
    pub fn call(from: Address, to: Address, input: impl Into<Bytes>) -> Self {
        Self {
            from,
            to: Some(to),
            input: input.into(),
            value: None,
            gas_limit: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        }
    }

    /// A contract creation transaction.
    pub fn create(from: Address, init_code: impl Into<Bytes>) -> Self {
        Self {
            to: None,
            ..Self::call(from, Address::ZERO, init_code)
        }
    }

    /// Attach a value to the transaction.
    pub fn value(mut self, value: Option<U256>) -> Self {
        self.value = value;
        self
    }
}

/// The subset of a transaction receipt the engine relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_hash: B256,
    pub block_number: u64,
    pub contract_address: Option<Address>,
    /// `false` when the transaction reverted.
    pub status: bool,
}

/// Remote operations on an EVM ledger.
///
/// Implementations must be cheap to share; the engine holds one handle per execution context
/// and issues independent reads concurrently through it.
pub trait Ledger: Send + Sync {
    /// Chain id reported by the node.
    fn chain_id(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// Deployed (runtime) code at `address`, empty when no contract lives there.
    fn get_code(&self, address: Address) -> impl Future<Output = anyhow::Result<Bytes>> + Send;

    /// Raw storage word at `slot`.
    fn get_storage_at(
        &self,
        address: Address,
        slot: B256,
    ) -> impl Future<Output = anyhow::Result<B256>> + Send;

    /// Read-only call, optionally impersonating `from`.
    fn call(
        &self,
        from: Option<Address>,
        to: Address,
        input: Bytes,
    ) -> impl Future<Output = anyhow::Result<Bytes>> + Send;

    /// Submit a transaction, returning its hash.
    fn send_transaction(&self, tx: TxRequest) -> impl Future<Output = anyhow::Result<B256>> + Send;

    /// Wait until the transaction is mined (one confirmation) and return its receipt.
    fn wait_for_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = anyhow::Result<TxReceipt>> + Send;

    /// Timestamp, in seconds, of the given block.
    fn block_timestamp(&self, block_hash: B256) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// Timestamp, in seconds, of the latest block.
    fn latest_timestamp(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;
}
