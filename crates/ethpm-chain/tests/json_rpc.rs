use std::convert::Infallible;
use std::sync::Mutex;

use ethpm_chain::abi::{self, Token};
use ethpm_chain::client::{GET_RELEASE_DATA, GET_RELEASE_ID};
use ethpm_chain::{
    ChainClient, ChainError, JsonRpcClient, LogFilter, VERSION_RELEASE_SIGNATURE, VersionRelease,
    version_release_topic,
};
use ethpm_common::Address;
use ethpm_common::http_client::HttpClient;
use serde_json::{Value, json};

/// Answers JSON-RPC requests from a fixed script and records what was asked.
struct ScriptedNode {
    seen: Mutex<Vec<Value>>,
    release_known: bool,
}

impl ScriptedNode {
    fn new(release_known: bool) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            release_known,
        }
    }

    fn answer(&self, method: &str, params: &Value) -> Value {
        match method {
            "eth_chainId" => json!({ "result": "0x1" }),
            "eth_blockNumber" => json!({ "result": "0x69" }),
            "eth_getBlockByNumber" => json!({ "result": {
                "number": params[0],
                "hash": format!("0x{}", "ab".repeat(32)),
            }}),
            "eth_getLogs" => {
                let data = abi::encode_call(
                    VERSION_RELEASE_SIGNATURE,
                    &[
                        Token::String("owned"),
                        Token::String("1.0.0"),
                        Token::String("ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW"),
                    ],
                );
                let log = |block: &str, index: &str| {
                    json!({
                        "address": "0x6b5da3ca4286baa7fbaf64eeee1834c7d430b729",
                        "topics": [version_release_topic().to_string()],
                        "data": format!("0x{}", hex::encode(&data[4..])),
                        "blockNumber": block,
                        "logIndex": index,
                    })
                };
                // deliberately out of order
                json!({ "result": [log("0x68", "0x0"), log("0x66", "0x1"), log("0x66", "0x0")] })
            }
            "eth_call" => {
                let data = params[0]["data"].as_str().unwrap();
                let calldata = hex::decode(&data[2..]).unwrap();
                if calldata[..4] == abi::selector(GET_RELEASE_ID) {
                    let id = if self.release_known { [7u8; 32] } else { [0u8; 32] };
                    json!({ "result": format!("0x{}", hex::encode(id)) })
                } else if calldata[..4] == abi::selector(GET_RELEASE_DATA) {
                    let ret = abi::encode_call(
                        "ret(string,string,string)",
                        &[
                            Token::String("owned"),
                            Token::String("1.0.0"),
                            Token::String("ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW"),
                        ],
                    );
                    json!({ "result": format!("0x{}", hex::encode(&ret[4..])) })
                } else {
                    json!({ "error": { "code": -32000, "message": "execution reverted" } })
                }
            }
            _ => json!({ "error": { "code": -32601, "message": "method not found" } }),
        }
    }
}

impl HttpClient for ScriptedNode {
    type Error = Infallible;

    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, Self::Error> {
        let body: Value = serde_json::from_slice(request.body()).unwrap();
        self.seen.lock().unwrap().push(body.clone());
        let mut answer = self.answer(body["method"].as_str().unwrap(), &body["params"]);
        answer["jsonrpc"] = json!("2.0");
        answer["id"] = body["id"].clone();
        Ok(http::Response::new(serde_json::to_vec(&answer).unwrap()))
    }
}

fn client(release_known: bool) -> JsonRpcClient<ScriptedNode> {
    JsonRpcClient::with_http(
        ScriptedNode::new(release_known),
        url::Url::parse("http://127.0.0.1:8545/").unwrap(),
    )
}

#[tokio::test]
async fn head_and_block_hash() {
    let client = client(true);
    assert_eq!(client.chain_id().await.unwrap(), 1);
    assert_eq!(client.block_number().await.unwrap(), 105);
    let hash = client.block_hash(105).await.unwrap().unwrap();
    assert_eq!(hash.short(), "0xabab..abab");
}

#[tokio::test]
async fn logs_come_back_in_block_order() {
    let client = client(true);
    let registry = Address::parse("0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729").unwrap();
    let logs = client
        .get_logs(&LogFilter {
            address: Some(registry),
            topic0: Some(version_release_topic()),
            from_block: 100,
            to_block: 105,
        })
        .await
        .unwrap();
    let order: Vec<_> = logs.iter().map(|l| (l.block_number, l.log_index)).collect();
    assert_eq!(order, vec![(102, 0), (102, 1), (104, 0)]);
    let release = VersionRelease::from_log(&logs[0]).unwrap();
    assert_eq!(release.package_name, "owned");
}

#[tokio::test]
async fn release_lookup_uses_two_calls() {
    let client = client(true);
    let registry = Address::parse("0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729").unwrap();
    let uri = client
        .release_manifest_uri(&registry, "owned", "1.0.0")
        .await
        .unwrap();
    assert_eq!(uri, "ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW");
}

#[tokio::test]
async fn unknown_release_is_reported() {
    let client = client(false);
    let registry = Address::parse("0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729").unwrap();
    let err = client
        .release_manifest_uri(&registry, "owned", "9.9.9")
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::ReleaseNotFound { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn rpc_errors_surface_code() {
    let client = client(true);
    let err = client
        .request::<Value>("eth_unknown", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Rpc { code: -32601, .. }));
}
