//! JSON-RPC transport: shared helpers and the [`RpcLedger`] implementation of [`Ledger`].

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U64};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::ledger::{Ledger, TxReceipt, TxRequest};

/// Per-request timeout towards the node.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client used by [`RpcLedger`].
pub fn create_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build the ledger HTTP client")
}

/// Issue `method` against the node at `url` and decode its `result`.
///
/// Node-side errors carry their JSON-RPC code and message; a revert reason from `eth_call` or
/// `eth_sendTransaction` surfaces here.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> anyhow::Result<T> {
    let response: Value = client
        .post(url.as_str())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("{method} could not reach the ledger at {url}"))?
        .json()
        .await
        .with_context(|| format!("{method} response from {url} is not JSON-RPC"))?;

    decode_response(method, response)
}

fn decode_response<T: DeserializeOwned>(method: &str, mut response: Value) -> anyhow::Result<T> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        anyhow::bail!("{method} rejected by the ledger ({code}): {message}");
    }

    let result = response
        .get_mut("result")
        .map(Value::take)
        .with_context(|| format!("{method} response has neither result nor error"))?;
    serde_json::from_value(result).with_context(|| format!("Unexpected {method} result"))
}

/// How receipts are polled after a transaction is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPolling {
    /// Delay between two `eth_getTransactionReceipt` attempts, in milliseconds.
    pub interval_ms: u64,
    /// Attempts before giving up on the receipt.
    pub max_attempts: usize,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            max_attempts: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_hash: B256,
    block_number: U64,
    contract_address: Option<Address>,
    /// Absent on pre-byzantium chains, where a mined receipt means success.
    status: Option<U64>,
}

impl From<RpcReceipt> for TxReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_hash: receipt.block_hash,
            block_number: receipt.block_number.to::<u64>(),
            contract_address: receipt.contract_address,
            status: receipt.status.is_none_or(|s| s == U64::from(1)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    timestamp: U64,
}

/// A [`Ledger`] backed by an HTTP JSON-RPC endpoint.
///
/// Transactions are sent with `eth_sendTransaction`, so the `from` account must be managed
/// (unlocked) by the node.
#[derive(Debug, Clone)]
pub struct RpcLedger {
    client: reqwest::Client,
    url: Url,
    polling: ReceiptPolling,
}

impl RpcLedger {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
            polling: ReceiptPolling::default(),
        })
    }

    /// Override the receipt polling policy.
    pub fn polling(mut self, polling: ReceiptPolling) -> Self {
        self.polling = polling;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> anyhow::Result<T> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }
}

impl Ledger for RpcLedger {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        let id: U64 = self.request("eth_chainId", vec![]).await?;
        Ok(id.to::<u64>())
    }

    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes> {
        self.request(
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
        .with_context(|| format!("Failed to get code at {}", address))
    }

    async fn get_storage_at(&self, address: Address, slot: B256) -> anyhow::Result<B256> {
        self.request(
            "eth_getStorageAt",
            vec![
                serde_json::json!(address),
                serde_json::json!(slot),
                serde_json::json!("latest"),
            ],
        )
        .await
        .with_context(|| format!("Failed to read slot {} of {}", slot, address))
    }

    async fn call(&self, from: Option<Address>, to: Address, input: Bytes) -> anyhow::Result<Bytes> {
        let mut call = serde_json::json!({ "to": to, "data": input });
        if let Some(from) = from {
            call["from"] = serde_json::json!(from);
        }

        self.request("eth_call", vec![call, serde_json::json!("latest")])
            .await
            .with_context(|| format!("eth_call to {} failed", to))
    }

    async fn send_transaction(&self, tx: TxRequest) -> anyhow::Result<B256> {
        let tx_hash: B256 = self
            .request("eth_sendTransaction", vec![serde_json::to_value(&tx)?])
            .await
            .context("Failed to send transaction")?;

        tracing::debug!(tx_hash = %tx_hash, from = %tx.from, to = ?tx.to, "Transaction sent");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> anyhow::Result<TxReceipt> {
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.polling.interval_ms))
            .with_max_times(self.polling.max_attempts);

        let receipt = (|| async {
            let receipt: Option<RpcReceipt> = self
                .request(
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(tx_hash)],
                )
                .await?;
            receipt.with_context(|| format!("Transaction {} not mined yet", tx_hash))
        })
        .retry(backoff)
        .notify(|err: &anyhow::Error, dur: Duration| {
            tracing::trace!(error = %err, retry_in = ?dur, "Receipt not available, retrying...");
        })
        .await
        .with_context(|| format!("No receipt for transaction {}", tx_hash))?;

        Ok(receipt.into())
    }

    async fn block_timestamp(&self, block_hash: B256) -> anyhow::Result<u64> {
        let block: Option<RpcBlock> = self
            .request(
                "eth_getBlockByHash",
                vec![serde_json::json!(block_hash), serde_json::json!(false)],
            )
            .await?;
        let block = block.with_context(|| format!("Block {} not found", block_hash))?;
        Ok(block.timestamp.to::<u64>())
    }

    async fn latest_timestamp(&self) -> anyhow::Result<u64> {
        let block: Option<RpcBlock> = self
            .request(
                "eth_getBlockByNumber",
                vec![serde_json::json!("latest"), serde_json::json!(false)],
            )
            .await?;
        let block = block.context("Latest block not found")?;
        Ok(block.timestamp.to::<u64>())
    }
}
