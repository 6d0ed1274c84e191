use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{BlockSelector, RpcConfig};
use crate::error::RpcError;
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{Block, Transaction};

const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<P> {
    jsonrpc: &'static str,
    method: &'static str,
    params: P,
    id: u64,
}

/// `[selector, include_full_transactions]`
#[derive(Debug, Serialize)]
struct GetBlockParams(&'static str, bool);

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Block as delivered by the node. Extra fields are ignored; the ones below
/// are required.
#[derive(Debug, Deserialize)]
struct RawBlock {
    number: String,
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    hash: String,
    from: String,
    /// `null` for contract creation
    to: Option<String>,
}

impl RawBlock {
    fn decode(self) -> Result<Block, RpcError> {
        let number = parse_hex_to_u64(&self.number)?;
        let transactions = self
            .transactions
            .into_iter()
            .map(|tx| Transaction {
                hash: tx.hash,
                from: tx.from,
                to: tx.to.unwrap_or_default(),
            })
            .collect();

        Ok(Block { number, transactions })
    }
}

/// Parse a `0x`-prefixed quantity into an integer
pub fn parse_hex_to_u64(hex_str: &str) -> Result<u64, RpcError> {
    let digits = hex_str
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Decode(format!("block number '{}' is missing the 0x prefix", hex_str)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| RpcError::Decode(format!("failed to parse block number '{}': {}", hex_str, e)))
}

/// Client for the single request the tracker needs: fetch the newest block
/// with full transaction objects.
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    endpoint: String,
    selector: BlockSelector,
}

impl RpcClient {
    pub fn new(endpoint: String, selector: BlockSelector, timeout: Duration) -> Result<Self, RpcError> {
        LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", serde_json::json!(endpoint))
            .with_metadata("block_selector", serde_json::json!(selector.as_str()))
            .with_metadata("timeout_ms", serde_json::json!(timeout.as_millis() as u64))
            .info("Initializing RPC client");

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            selector,
        })
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self, RpcError> {
        Self::new(
            config.endpoint.clone(),
            config.block_selector,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn selector(&self) -> BlockSelector {
        self.selector
    }

    /// One `eth_getBlockByNumber` round trip. Never retries.
    pub async fn fetch_latest_block(&self) -> Result<Block, RpcError> {
        let monitor = PerformanceMonitor::new("rpc_fetch_latest_block");
        let result = self.request_block().await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(GET_BLOCK_BY_NUMBER, duration, result.is_ok());

        let block = result?;
        LogContext::new("rpc_client", "fetch_latest_block")
            .with_block_number(block.number)
            .with_metadata("transaction_count", serde_json::json!(block.transactions.len()))
            .debug(&format!(
                "Retrieved block {} with {} transactions",
                block.number,
                block.transactions.len()
            ));

        Ok(block)
    }

    async fn request_block(&self) -> Result<Block, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: GET_BLOCK_BY_NUMBER,
            params: GetBlockParams(self.selector.as_str(), true),
            id: 1,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let envelope: Option<JsonRpcResponse> = serde_json::from_slice(&body).ok();

        // Some providers pair an error object with a non-2xx status; the error
        // object is the more useful report.
        if let Some(JsonRpcResponse { error: Some(error), .. }) = &envelope {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message.clone(),
            });
        }

        if !status.is_success() {
            return Err(RpcError::Transport(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let envelope = envelope
            .ok_or_else(|| RpcError::Transport("response body is not a JSON-RPC envelope".to_string()))?;

        decode_block_result(envelope.result)
    }
}

fn decode_block_result(result: Option<Value>) -> Result<Block, RpcError> {
    let value = match result {
        Some(Value::Null) | None => {
            return Err(RpcError::Decode("response carried no block".to_string()));
        }
        Some(value) => value,
    };

    let raw: RawBlock = serde_json::from_value(value)
        .map_err(|e| RpcError::Decode(format!("malformed block payload: {}", e)))?;
    raw.decode()
}
