//! Execution context passed into every orchestrator call.

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, ScrError},
    ledger::{Ledger, TxReceipt, TxRequest},
};

/// Identity of the target network, used as the manifest key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display("{name} ({chain_id})")]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
}

impl Network {
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
        }
    }
}

/// Gas overrides applied to every transaction sent from a context.
///
/// Unset fields are left for the node to estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasOptions {
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl GasOptions {
    fn apply(&self, mut tx: TxRequest) -> TxRequest {
        tx.gas_limit = self.gas_limit.map(U256::from);
        tx.max_fee_per_gas = self.max_fee_per_gas.map(U256::from);
        tx.max_priority_fee_per_gas = self.max_priority_fee_per_gas.map(U256::from);
        tx
    }
}

/// A contract freshly created by a transaction from this context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedUnit {
    pub address: Address,
    pub tx_hash: B256,
    /// Hash of the deployed (runtime) code, not of the creation code.
    pub byte_code_hash: B256,
    pub timestamp: DateTime<Utc>,
}

/// Everything an orchestrator needs to talk to one network as one signer.
#[derive(Debug, Clone)]
pub struct ExecutionContext<L> {
    pub network: Network,
    pub ledger: L,
    /// Node-managed account every transaction is sent from.
    pub signer: Address,
    pub gas: GasOptions,
}

impl<L: Ledger> ExecutionContext<L> {
    pub fn new(network: Network, ledger: L, signer: Address) -> Self {
        Self {
            network,
            ledger,
            signer,
            gas: GasOptions::default(),
        }
    }

    /// Set the gas overrides.
    pub fn with_gas(mut self, gas: GasOptions) -> Self {
        self.gas = gas;
        self
    }

    /// Read-only call as the signer.
    pub async fn call(&self, to: Address, input: impl Into<Bytes>) -> Result<Bytes> {
        Ok(self.ledger.call(Some(self.signer), to, input.into()).await?)
    }

    /// Read-only call impersonating another account.
    pub async fn call_as(&self, from: Address, to: Address, input: impl Into<Bytes>) -> Result<Bytes> {
        Ok(self.ledger.call(Some(from), to, input.into()).await?)
    }

    /// Send a call transaction and wait for it to be mined.
    pub async fn transact(&self, to: Address, input: impl Into<Bytes>) -> Result<TxReceipt> {
        self.send(TxRequest::call(self.signer, to, input)).await
    }

    /// Send a transaction and wait for one confirmation. A reverted receipt is an error.
    pub async fn send(&self, tx: TxRequest) -> Result<TxReceipt> {
        let tx = self.gas.apply(tx);
        let tx_hash = self
            .ledger
            .send_transaction(tx)
            .await
            .map_err(|e| ScrError::tx_failed(None, format!("{e:#}")))?;

        let receipt = self
            .ledger
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|e| ScrError::tx_failed(Some(tx_hash), format!("{e:#}")))?;

        if !receipt.status {
            return Err(ScrError::tx_failed(Some(tx_hash), "transaction reverted"));
        }

        Ok(receipt)
    }

    /// Create a contract from `init_code` (creation bytecode with encoded constructor args).
    pub async fn deploy_bytecode(
        &self,
        init_code: impl Into<Bytes>,
        value: Option<U256>,
    ) -> Result<DeployedUnit> {
        let receipt = self
            .send(TxRequest::create(self.signer, init_code).value(value))
            .await?;

        let address = receipt.contract_address.ok_or_else(|| {
            ScrError::tx_failed(
                Some(receipt.transaction_hash),
                "receipt has no contract address",
            )
        })?;

        let code = self.ledger.get_code(address).await?;
        if code.is_empty() {
            return Err(ScrError::tx_failed(
                Some(receipt.transaction_hash),
                format!("no code deployed at {address}"),
            ));
        }

        let timestamp = self.block_time(&receipt).await?;

        Ok(DeployedUnit {
            address,
            tx_hash: receipt.transaction_hash,
            byte_code_hash: keccak256(&code),
            timestamp,
        })
    }

    /// Wall-clock time of the block that included `receipt`.
    pub async fn block_time(&self, receipt: &TxReceipt) -> Result<DateTime<Utc>> {
        let secs = self.ledger.block_timestamp(receipt.block_hash).await?;
        timestamp_to_datetime(secs)
    }
}

/// Convert a ledger timestamp in seconds.
pub fn timestamp_to_datetime(secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ScrError::Rpc(anyhow::anyhow!("timestamp {secs} is out of range")))
}
