//! In-process stand-ins for the content network and a chain.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use ethpm::{Config, ContentClient, ContentSource, Error, RetryPolicy};
use ethpm_chain::abi::{Token, encode_call};
use ethpm_chain::{
    ChainClient, ChainError, H256, Log, LogFilter, VERSION_RELEASE_SIGNATURE,
    version_release_topic,
};
use ethpm_common::http_client::HttpClient;
use ethpm_common::{Address, ChainId, ContentAddress, TransportError};
use ethpm_store::MemoryContentStore;
use serde_json::json;

pub const REGISTRY: &str = "0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729";
pub const OTHER_REGISTRY: &str = "0x1457890158DECD360e6d4d979edBcDD59c35feeB";

/// Content network fake: serves what was published, counts fetches.
#[derive(Default)]
pub struct Network {
    served: Mutex<HashMap<ContentAddress, Bytes>>,
    fetches: Mutex<Vec<ContentAddress>>,
    flaky: Mutex<HashMap<ContentAddress, usize>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, bytes: impl Into<Bytes>) -> ContentAddress {
        let bytes = bytes.into();
        let address = ContentAddress::compute(&bytes).unwrap();
        self.served.lock().unwrap().insert(address, bytes);
        address
    }

    /// Serve `bytes` under `address` whether or not they match.
    pub fn serve_as(&self, address: ContentAddress, bytes: impl Into<Bytes>) {
        self.served.lock().unwrap().insert(address, bytes.into());
    }

    pub fn unpublish(&self, address: &ContentAddress) {
        self.served.lock().unwrap().remove(address);
    }

    /// Fail the next `times` fetches of `address` with a timeout.
    pub fn flake(&self, address: ContentAddress, times: usize) {
        self.flaky.lock().unwrap().insert(address, times);
    }

    pub fn fetch_count(&self, address: &ContentAddress) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|a| *a == address)
            .count()
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

impl ContentSource for Network {
    async fn fetch(&self, address: &ContentAddress) -> ethpm::Result<Bytes> {
        self.fetches.lock().unwrap().push(*address);
        if let Some(left) = self.flaky.lock().unwrap().get_mut(address) {
            if *left > 0 {
                *left -= 1;
                return Err(Error::transport(TransportError::Timeout));
            }
        }
        self.served.lock().unwrap().get(address).cloned().ok_or_else(|| {
            Error::transport(TransportError::Http(ethpm_common::HttpError {
                status: http::StatusCode::NOT_FOUND,
                body: None,
            }))
        })
    }
}

/// Chain fake: a fixed head, a list of release events, a release table.
pub struct Chain {
    pub chain_id: ChainId,
    pub head: u64,
    logs: Vec<Log>,
    releases: BTreeMap<(Address, String, String), String>,
    pub log_queries: Mutex<Vec<(u64, u64)>>,
    log_failures: AtomicUsize,
    stalled: AtomicBool,
    pub release_lookups: AtomicUsize,
}

impl Chain {
    pub fn new(chain_id: ChainId, head: u64) -> Self {
        Self {
            chain_id,
            head,
            logs: Vec::new(),
            releases: BTreeMap::new(),
            log_queries: Mutex::new(Vec::new()),
            log_failures: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
            release_lookups: AtomicUsize::new(0),
        }
    }

    /// Record a `VersionRelease` event at `block` and register the release.
    pub fn release(&mut self, block: u64, registry: &str, name: &str, version: &str, uri: &str) {
        let registry = Address::parse(registry).unwrap();
        let data = encode_call(
            VERSION_RELEASE_SIGNATURE,
            &[Token::String(name), Token::String(version), Token::String(uri)],
        );
        let log_index = self.logs.iter().filter(|l| l.block_number == block).count() as u64;
        self.logs.push(Log {
            address: registry,
            topics: vec![version_release_topic()],
            data: Bytes::copy_from_slice(&data[4..]),
            block_number: block,
            log_index,
            transaction_hash: None,
        });
        self.releases
            .insert((registry, name.to_owned(), version.to_owned()), uri.to_owned());
    }

    /// Fail the next `times` log queries with a timeout.
    pub fn fail_log_queries(&self, times: usize) {
        self.log_failures.store(times, Ordering::SeqCst);
    }

    /// Make release lookups and block hash queries never answer.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    async fn maybe_stall(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

impl ChainClient for Chain {
    async fn chain_id(&self) -> ethpm_chain::Result<ChainId> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> ethpm_chain::Result<u64> {
        Ok(self.head)
    }

    async fn block_hash(&self, number: u64) -> ethpm_chain::Result<Option<H256>> {
        self.maybe_stall().await;
        Ok((number <= self.head).then(|| H256([number as u8; 32])))
    }

    async fn get_logs(&self, filter: &LogFilter) -> ethpm_chain::Result<Vec<Log>> {
        if self
            .log_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainError::Transport(TransportError::Timeout));
        }
        self.log_queries
            .lock()
            .unwrap()
            .push((filter.from_block, filter.to_block));
        Ok(self
            .logs
            .iter()
            .filter(|l| (filter.from_block..=filter.to_block).contains(&l.block_number))
            .filter(|l| filter.address.is_none_or(|a| a == l.address))
            .filter(|l| filter.topic0.is_none_or(|t| l.topics.first() == Some(&t)))
            .cloned()
            .collect())
    }

    async fn release_manifest_uri(
        &self,
        registry: &Address,
        package_name: &str,
        version: &str,
    ) -> ethpm_chain::Result<String> {
        self.release_lookups.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        self.releases
            .get(&(*registry, package_name.to_owned(), version.to_owned()))
            .cloned()
            .ok_or_else(|| ChainError::ReleaseNotFound {
                package_name: package_name.to_owned(),
                version: version.to_owned(),
            })
    }
}

/// HTTP client for code paths that must not reach the network.
pub struct NoHttp;

impl HttpClient for NoHttp {
    type Error = std::convert::Infallible;

    async fn send_http(
        &self,
        _request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, Self::Error> {
        panic!("unexpected HTTP request")
    }
}

/// Config rooted at `root` with fast retries.
pub fn config(root: &Path) -> Config {
    Config::new()
        .root(root)
        .packages_dir(root.join("_ethpm_packages"))
        .retry(
            RetryPolicy::new()
                .max_retries(3)
                .base_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(5))
                .build(),
        )
        .timeout(Duration::from_secs(5))
        .build()
}

pub fn content_client(
    network: &Arc<Network>,
    store: &MemoryContentStore,
    config: &Config,
) -> ContentClient<Arc<Network>, MemoryContentStore> {
    ContentClient::new(network.clone(), store.clone(), config)
}

/// A v2 manifest document.
pub fn manifest(
    name: &str,
    version: &str,
    sources: &[(&str, String)],
    dependencies: &[(&str, String)],
) -> Vec<u8> {
    let sources: serde_json::Map<_, _> = sources
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    let deps: serde_json::Map<_, _> = dependencies
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    let mut doc = json!({
        "manifest_version": "2",
        "package_name": name,
        "version": version,
        "sources": sources,
    });
    if !deps.is_empty() {
        doc["build_dependencies"] = json!(deps);
    }
    serde_json::to_vec(&doc).unwrap()
}

pub fn ipfs(address: &ContentAddress) -> String {
    format!("ipfs://{address}")
}

pub fn erc1319(registry: &str, chain_id: ChainId, name: &str, version: &str) -> String {
    format!("erc1319://{registry}:{chain_id}/{name}?version={version}")
}
