//! Bitcoin node RPC client.
//!
//! JSON-RPC over HTTP against a local bitcoind. Transport failures are
//! retried with a fixed delay and the connection is re-established on the
//! next attempt; protocol errors (the node answered with an error object)
//! are returned to the caller as-is. The [`NodeClient`] trait is the seam
//! the share validator and the tests program against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use crate::tracing::prelude::*;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("node unreachable after {0} attempts")]
    Unreachable(u32),

    #[error("malformed RPC response: {0}")]
    BadResponse(String),
}

/// `getblockchaininfo`, reduced to the fields the pool consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    pub blocks: u64,
}

impl BlockchainInfo {
    /// Map the node's chain name onto the address-parsing network.
    pub fn network(&self) -> Option<bitcoin::Network> {
        match self.chain.as_str() {
            "main" => Some(bitcoin::Network::Bitcoin),
            "test" => Some(bitcoin::Network::Testnet),
            "signet" => Some(bitcoin::Network::Signet),
            "regtest" => Some(bitcoin::Network::Regtest),
            _ => None,
        }
    }
}

/// A transaction entry in a block template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateTransaction {
    /// Hex txid, big-endian display order.
    pub txid: String,
    /// Full serialized transaction, hex.
    pub data: String,
}

/// `getblocktemplate` result, reduced to the fields the job builder needs.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockTemplate {
    pub height: u32,
    pub version: u32,
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: String,
    /// Compact target, 8 hex chars.
    pub bits: String,
    #[serde(rename = "coinbasevalue")]
    pub coinbase_value: u64,
    #[serde(default)]
    pub transactions: Vec<TemplateTransaction>,
}

/// `validateaddress` result.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInfo {
    #[serde(rename = "isvalid")]
    pub is_valid: bool,
}

/// The four node operations the pool performs.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, NodeError>;

    async fn get_block_template(&self) -> Result<BlockTemplate, NodeError>;

    /// Submit a serialized block (hex). `None` means the node accepted it;
    /// `Some(reason)` is the node's rejection string.
    async fn submit_block(&self, block_hex: &str) -> Result<Option<String>, NodeError>;

    async fn validate_address(&self, address: &str) -> Result<AddressInfo, NodeError>;
}

/// JSON-RPC client for bitcoind.
pub struct BitcoindRpc {
    http: reqwest::Client,
    url: String,
    user: String,
    password: String,
    max_retries: u32,
    retry_delay: Duration,
    request_id: AtomicU64,
}

impl BitcoindRpc {
    /// Connect to the node and probe it with `getblockchaininfo`.
    ///
    /// The probe retries like any other call, so a node that is down at
    /// startup fails fast instead of surfacing later in the template loop.
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> Result<Self, NodeError> {
        let client = Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            url: format!("http://{host}:{port}"),
            user: user.to_string(),
            password: password.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_id: AtomicU64::new(0),
        };

        let info = client.get_blockchain_info().await?;
        info!(url = %client.url, chain = %info.chain, "Connected to bitcoin node");
        Ok(client)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_once(method, &params).await {
                Ok(result) => return Ok(result),
                // Protocol errors come from a live node; retrying would
                // just repeat the same answer.
                Err(err @ NodeError::Rpc { .. }) => return Err(err),
                Err(err) => {
                    warn!(method, attempt, error = %err, "RPC call failed");
                    if attempt >= self.max_retries {
                        return Err(NodeError::Unreachable(self.max_retries));
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &Value,
    ) -> Result<T, NodeError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let envelope: Value = response.json().await?;
        if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
            return Err(NodeError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        let result = envelope
            .get("result")
            .cloned()
            .ok_or_else(|| NodeError::BadResponse("missing result field".into()))?;
        serde_json::from_value(result).map_err(|e| NodeError::BadResponse(e.to_string()))
    }
}

#[async_trait]
impl NodeClient for BitcoindRpc {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, NodeError> {
        self.call("getblockchaininfo", json!([])).await
    }

    async fn get_block_template(&self) -> Result<BlockTemplate, NodeError> {
        self.call("getblocktemplate", json!([{"rules": ["segwit"]}]))
            .await
    }

    async fn submit_block(&self, block_hex: &str) -> Result<Option<String>, NodeError> {
        self.call("submitblock", json!([block_hex])).await
    }

    async fn validate_address(&self, address: &str) -> Result<AddressInfo, NodeError> {
        self.call("validateaddress", json!([address])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_mapping() {
        let info = |chain: &str| BlockchainInfo {
            chain: chain.to_string(),
            blocks: 0,
        };
        assert_eq!(info("main").network(), Some(bitcoin::Network::Bitcoin));
        assert_eq!(info("test").network(), Some(bitcoin::Network::Testnet));
        assert_eq!(info("signet").network(), Some(bitcoin::Network::Signet));
        assert_eq!(info("regtest").network(), Some(bitcoin::Network::Regtest));
        assert_eq!(info("liquid").network(), None);
    }

    #[test]
    fn test_template_deserializes() {
        let raw = serde_json::json!({
            "height": 850000,
            "version": 0x20000000u32,
            "previousblockhash":
                "00000000000000000001b2505c2a7f9417d0e2e4441a0a61f2b2e5f86c04b9cf",
            "bits": "17034219",
            "coinbasevalue": 312500000u64,
            "curtime": 1700000000,
            "transactions": [
                {"txid": "aa".repeat(32), "data": "beef", "fee": 100}
            ]
        });

        let template: BlockTemplate = serde_json::from_value(raw).unwrap();
        assert_eq!(template.height, 850000);
        assert_eq!(template.bits, "17034219");
        assert_eq!(template.transactions.len(), 1);
        assert_eq!(template.transactions[0].data, "beef");
    }

    #[test]
    fn test_template_transactions_default_empty() {
        let raw = serde_json::json!({
            "height": 1,
            "version": 1,
            "previousblockhash": "00".repeat(32),
            "bits": "207fffff",
            "coinbasevalue": 5_000_000_000u64,
        });

        let template: BlockTemplate = serde_json::from_value(raw).unwrap();
        assert!(template.transactions.is_empty());
    }
}
