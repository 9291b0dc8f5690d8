//! evm-rpc-client: JSON-RPC client for EVM chains
//!
//! Provides a thin client over `reqwest` with per-request timeouts, chain
//! capability detection, and a read cache for `eth_call` results that is
//! invalidated explicitly after writes.

pub mod cache;
pub mod capabilities;
pub mod queries;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use r2r_core::{BlockNumber, EvmAddress, RpcConfig, RpcError, TxHash};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

pub use cache::{CacheKey, ReadCache};
pub use capabilities::{ChainCapabilities, SyncTier};

/// Result type for RPC client operations
pub type Result<T> = std::result::Result<T, RpcError>;

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Mined transaction receipt (subset of fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<String>,
    /// `0x1` on success, `0x0` when reverted
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }

    pub fn block_number(&self) -> Option<BlockNumber> {
        self.block_number
            .as_deref()
            .and_then(|n| parse_quantity(n).ok())
    }
}

/// JSON-RPC client bound to one endpoint and one expected chain
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    config: RpcConfig,
    expected_chain_id: u64,
    capabilities: Arc<RwLock<Option<ChainCapabilities>>>,
    cache: Arc<ReadCache>,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    /// Create a new client and check what the endpoint serves
    pub async fn new(config: RpcConfig, expected_chain_id: u64) -> Result<Self> {
        let client = Self::new_unchecked(config, expected_chain_id)?;
        client.refresh_capabilities().await;
        Ok(client)
    }

    /// Create without probing (for testing or when the endpoint may be offline)
    pub fn new_unchecked(config: RpcConfig, expected_chain_id: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("rent2repay-dashboard")
            .build()
            .map_err(|e| RpcError::Unreachable {
                url: format!("{}: {}", config.url, e),
            })?;

        Ok(Self {
            http,
            config,
            expected_chain_id,
            capabilities: Arc::new(RwLock::new(None)),
            cache: Arc::new(ReadCache::default()),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Get the current endpoint configuration
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn expected_chain_id(&self) -> u64 {
        self.expected_chain_id
    }

    /// Read cache shared by every clone of this client
    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    /// Refresh capability detection
    pub async fn refresh_capabilities(&self) {
        let caps = capabilities::detect_capabilities(self).await;
        if !caps.chain_matches && caps.is_online {
            tracing::warn!(
                url = %self.config.url,
                expected = self.expected_chain_id,
                actual = ?caps.chain_id,
                "RPC endpoint serves a different chain"
            );
        }
        let mut lock = self.capabilities.write().await;
        *lock = Some(caps);
    }

    /// Get current capabilities (may be stale if not recently refreshed)
    pub async fn capabilities(&self) -> Option<ChainCapabilities> {
        let lock = self.capabilities.read().await;
        lock.clone()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Issue a JSON-RPC request and decode its `result`
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let send = async {
            let response = self
                .http
                .post(&self.config.url)
                .json(&body)
                .send()
                .await
                .map_err(|e| RpcError::Unreachable {
                    url: format!("{}: {}", self.config.url, e),
                })?;

            let status = response.status();
            match response.json::<JsonRpcResponse>().await {
                Ok(envelope) => Ok(envelope),
                Err(_) if !status.is_success() => Err(RpcError::Unreachable {
                    url: format!("{} (HTTP {})", self.config.url, status),
                }),
                Err(e) => Err(RpcError::ParseError(format!("{}: {}", method, e))),
            }
        };

        let envelope = timed_request(method, self.timeout(), send).await?;

        if let Some(err) = envelope.error {
            tracing::debug!(method = %method, code = err.code, message = %err.message, "RPC returned error");
            return Err(RpcError::JsonRpc {
                code: err.code,
                message: err.message,
            });
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| RpcError::ParseError(format!("{}: {}", method, e)))
    }

    /// `eth_chainId`
    pub async fn chain_id(&self) -> Result<u64> {
        let hex: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&hex)
    }

    /// `eth_blockNumber`
    pub async fn block_number(&self) -> Result<BlockNumber> {
        let hex: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&hex)
    }

    /// `eth_syncing`: false when fully synced, an object otherwise
    pub async fn is_syncing(&self) -> Result<bool> {
        let status: Value = self.request("eth_syncing", json!([])).await?;
        Ok(!matches!(status, Value::Bool(false)))
    }

    /// Check if the endpoint is reachable
    pub async fn is_online(&self) -> bool {
        self.block_number().await.is_ok()
    }

    /// `eth_call` against the latest block
    pub async fn call(&self, to: EvmAddress, data: &[u8]) -> Result<Vec<u8>> {
        let params = json!([
            { "to": to.to_hex(), "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);
        let hex_result: String = self.request("eth_call", params).await?;
        decode_hex(&hex_result)
    }

    /// `eth_call` served from the read cache when possible
    pub async fn call_cached(&self, key: CacheKey, data: &[u8]) -> Result<Vec<u8>> {
        if let Some(hit) = self.cache.get(&key, data).await {
            return Ok(hit);
        }
        let result = self.call(key.target, data).await?;
        self.cache.insert(key, data.to_vec(), result.clone()).await;
        Ok(result)
    }

    /// `eth_estimateGas`; a revert surfaces as [`RpcError::JsonRpc`]
    pub async fn estimate_gas(
        &self,
        from: Option<EvmAddress>,
        to: EvmAddress,
        data: &[u8],
    ) -> Result<u64> {
        let mut tx = json!({ "to": to.to_hex(), "data": format!("0x{}", hex::encode(data)) });
        if let Some(from) = from {
            tx["from"] = json!(from.to_hex());
        }
        let hex: String = self.request("eth_estimateGas", json!([tx])).await?;
        parse_quantity(&hex)
    }

    /// `eth_getTransactionReceipt`; `None` while pending or unknown
    pub async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<TransactionReceipt>> {
        self.request("eth_getTransactionReceipt", json!([hash.to_hex()]))
            .await
    }

    /// Whether the node knows the transaction at all (mempool or chain)
    pub async fn transaction_known(&self, hash: &TxHash) -> Result<bool> {
        let tx: Option<Value> = self
            .request("eth_getTransactionByHash", json!([hash.to_hex()]))
            .await?;
        Ok(tx.is_some())
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_quantity(value: &str) -> Result<u64> {
    let digits = value.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| RpcError::ParseError(format!("invalid quantity '{}': {}", value, e)))
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| RpcError::ParseError(format!("invalid hex data: {}", e)))
}

/// Wrap an RPC call with a timeout
async fn timed_request<T>(
    method: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| RpcError::Timeout {
            method: method.to_string(),
            secs: timeout.as_secs(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x64").unwrap(), 100);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_envelope_with_error() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted: Paused"}}"#;
        let envelope: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        let err = envelope.error.unwrap();
        assert_eq!(err.code, 3);
        assert_eq!(err.message, "execution reverted: Paused");
        assert!(envelope.result.is_null());
    }

    #[test]
    fn test_null_result_decodes_to_none() {
        let raw = r#"{"jsonrpc":"2.0","id":7,"result":null}"#;
        let envelope: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        let receipt: Option<TransactionReceipt> = serde_json::from_value(envelope.result).unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn test_receipt_status() {
        let raw = serde_json::json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "status": "0x1",
            "gasUsed": "0x5208"
        });
        let receipt: TransactionReceipt = serde_json::from_value(raw).unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.block_number(), Some(16));

        let reverted = TransactionReceipt {
            status: Some("0x0".to_string()),
            ..receipt
        };
        assert!(!reverted.succeeded());
    }

    #[tokio::test]
    async fn test_timed_request_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, RpcError>(1u64)
        };
        let err = timed_request("eth_call", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout { ref method, .. } if method == "eth_call"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let config = RpcConfig {
            url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
        };
        let client = RpcClient::new_unchecked(config, 100).unwrap();
        assert!(!client.is_online().await);
        assert!(matches!(
            client.block_number().await,
            Err(RpcError::Unreachable { .. }) | Err(RpcError::Timeout { .. })
        ));
    }
}
