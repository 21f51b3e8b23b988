//! Chain access seam and its JSON-RPC implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use ethpm_common::http_client::{HttpClient, send_checked};
use ethpm_common::{Address, ChainId, TransportError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::abi::{self, Token};
use crate::error::{ChainError, Result};
use crate::types::{H256, Log, LogFilter, parse_quantity, quantity};

/// Signature of the registry call mapping a release to its id.
pub const GET_RELEASE_ID: &str = "getReleaseId(string,string)";

/// Signature of the registry call returning `(name, version, manifest uri)`.
pub const GET_RELEASE_DATA: &str = "getReleaseData(bytes32)";

/// Read-only access to one chain.
///
/// The scraper and the resolver only ever talk to a chain through this
/// trait, so tests substitute an in-memory chain.
#[trait_variant::make(Send)]
pub trait ChainClient {
    /// Chain id reported by the node
    async fn chain_id(&self) -> Result<ChainId>;

    /// Current head block number
    async fn block_number(&self) -> Result<u64>;

    /// Hash of block `number`, or `None` if the node does not know it
    async fn block_hash(&self, number: u64) -> Result<Option<H256>>;

    /// Logs matching `filter`, in block order
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>>;

    /// Manifest URI a registry recorded for `package_name@version`
    async fn release_manifest_uri(
        &self,
        registry: &Address,
        package_name: &str,
        version: &str,
    ) -> Result<String>;
}

impl<T: ChainClient + Sync> ChainClient for Arc<T> {
    async fn chain_id(&self) -> Result<ChainId> {
        self.as_ref().chain_id().await
    }

    async fn block_number(&self) -> Result<u64> {
        self.as_ref().block_number().await
    }

    async fn block_hash(&self, number: u64) -> Result<Option<H256>> {
        self.as_ref().block_hash(number).await
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        self.as_ref().get_logs(filter).await
    }

    async fn release_manifest_uri(
        &self,
        registry: &Address,
        package_name: &str,
        version: &str,
    ) -> Result<String> {
        self.as_ref()
            .release_manifest_uri(registry, package_name, version)
            .await
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: String,
    topics: Vec<H256>,
    data: String,
    block_number: String,
    log_index: String,
    #[serde(default)]
    transaction_hash: Option<H256>,
}

impl RawLog {
    fn into_log(self) -> Result<Log> {
        let address = Address::parse(&self.address)
            .map_err(|e| ChainError::response(e.to_string()))?;
        let data = self
            .data
            .strip_prefix("0x")
            .and_then(|h| hex::decode(h).ok())
            .ok_or_else(|| ChainError::response("log data is not hex"))?;
        Ok(Log {
            address,
            topics: self.topics,
            data: Bytes::from(data),
            block_number: parse_quantity(&self.block_number)
                .ok_or_else(|| ChainError::response("bad blockNumber"))?,
            log_index: parse_quantity(&self.log_index)
                .ok_or_else(|| ChainError::response("bad logIndex"))?,
            transaction_hash: self.transaction_hash,
        })
    }
}

#[derive(Deserialize)]
struct RawBlock {
    hash: Option<H256>,
}

/// [`ChainClient`] over Ethereum JSON-RPC.
#[derive(Debug, Clone)]
pub struct JsonRpcClient<H> {
    http: H,
    endpoint: Url,
    next_id: Arc<AtomicU64>,
}

#[cfg(feature = "reqwest-client")]
impl JsonRpcClient<reqwest::Client> {
    /// Client for `endpoint` with a per-request timeout.
    pub fn new(endpoint: Url, timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self::with_http(http, endpoint))
    }
}

impl<H> JsonRpcClient<H>
where
    H: HttpClient + Sync,
    TransportError: From<H::Error>,
{
    /// Client for `endpoint` over any [`HttpClient`].
    pub fn with_http(http: H, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The RPC endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Issue one JSON-RPC request and decode its `result`.
    #[tracing::instrument(level = "trace", skip(self, params))]
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))?;
        let request = http::Request::builder()
            .method(http::Method::POST)
            .uri(self.endpoint.as_str())
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body)
            .map_err(<TransportError as From<http::Error>>::from)?;
        let response = send_checked(&self.http, request).await?;
        let response: RpcResponse = serde_json::from_slice(&response)?;
        if let Some(error) = response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(serde_json::from_value(
            response.result.unwrap_or(Value::Null),
        )?)
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let result: String = self
            .request(
                "eth_call",
                json!([
                    { "to": to.to_lower_hex(), "data": format!("0x{}", hex::encode(data)) },
                    "latest"
                ]),
            )
            .await?;
        result
            .strip_prefix("0x")
            .and_then(|h| hex::decode(h).ok())
            .ok_or_else(|| ChainError::response("eth_call result is not hex"))
    }
}

impl<H> ChainClient for JsonRpcClient<H>
where
    H: HttpClient + Sync,
    TransportError: From<H::Error>,
{
    async fn chain_id(&self) -> Result<ChainId> {
        let id: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&id).ok_or_else(|| ChainError::response("bad eth_chainId"))
    }

    async fn block_number(&self) -> Result<u64> {
        let n: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&n).ok_or_else(|| ChainError::response("bad eth_blockNumber"))
    }

    async fn block_hash(&self, number: u64) -> Result<Option<H256>> {
        let block: Option<RawBlock> = self
            .request("eth_getBlockByNumber", json!([quantity(number), false]))
            .await?;
        Ok(block.and_then(|b| b.hash))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let raw: Vec<RawLog> = self.request("eth_getLogs", json!([filter.to_json()])).await?;
        let mut logs = raw
            .into_iter()
            .map(RawLog::into_log)
            .collect::<Result<Vec<_>>>()?;
        logs.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(logs)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn release_manifest_uri(
        &self,
        registry: &Address,
        package_name: &str,
        version: &str,
    ) -> Result<String> {
        let id_data = self
            .call(
                registry,
                &abi::encode_call(
                    GET_RELEASE_ID,
                    &[Token::String(package_name), Token::String(version)],
                ),
            )
            .await?;
        let release_id = abi::decode_bytes32(&id_data)?;
        if release_id == [0u8; 32] {
            return Err(ChainError::ReleaseNotFound {
                package_name: package_name.to_owned(),
                version: version.to_owned(),
            });
        }
        let data = self
            .call(
                registry,
                &abi::encode_call(GET_RELEASE_DATA, &[Token::Bytes32(release_id)]),
            )
            .await?;
        let mut fields = abi::decode_strings(&data, 3)?;
        let manifest_uri = fields.pop().unwrap_or_default();
        if manifest_uri.is_empty() {
            return Err(ChainError::ReleaseNotFound {
                package_name: package_name.to_owned(),
                version: version.to_owned(),
            });
        }
        Ok(manifest_uri)
    }
}
