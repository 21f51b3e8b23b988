//! Content Store Client
//!
//! Reads go to the local store first and fall back to a remote
//! [`ContentSource`]. Every remotely fetched payload is verified against its
//! address before it is written locally or handed to a caller; payloads that
//! do not verify are dropped.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ethpm_common::ContentAddress;
use ethpm_common::TransportError;
use ethpm_common::http_client::{HttpClient, send_checked};
use ethpm_store::ContentStore;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::{Config, RetryPolicy};
use crate::error::{Error, Result, unavailable};
use crate::retry::{with_retry, with_timeout};

/// Somewhere bytes can be fetched by content address.
///
/// Implementations need not verify what they return; [`ContentClient`] does.
#[trait_variant::make(Send)]
pub trait ContentSource {
    /// Fetch the bytes published under `address`.
    async fn fetch(&self, address: &ContentAddress) -> Result<Bytes>;
}

impl<T: ContentSource + Sync> ContentSource for Arc<T> {
    async fn fetch(&self, address: &ContentAddress) -> Result<Bytes> {
        self.as_ref().fetch(address).await
    }
}

/// Public HTTP gateway: `GET <gateway>/ipfs/<cid>`.
#[derive(Debug, Clone)]
pub struct GatewaySource<H> {
    http: H,
    base: Url,
}

impl<H> GatewaySource<H> {
    /// Source reading through the gateway at `base`
    pub fn new(http: H, base: Url) -> Self {
        Self { http, base }
    }
}

impl<H> ContentSource for GatewaySource<H>
where
    H: HttpClient + Sync,
    TransportError: From<H::Error>,
{
    async fn fetch(&self, address: &ContentAddress) -> Result<Bytes> {
        let url = self
            .base
            .join(&format!("ipfs/{address}"))
            .map_err(|e| Error::install(format!("bad gateway url: {e}")))?;
        let request = http::Request::builder()
            .method(http::Method::GET)
            .uri(url.as_str())
            .body(Vec::new())
            .map_err(<TransportError as From<http::Error>>::from)?;
        Ok(send_checked(&self.http, request).await?)
    }
}

/// Local node HTTP API: `POST <api>/api/v0/cat?arg=<cid>`.
#[derive(Debug, Clone)]
pub struct LocalNodeSource<H> {
    http: H,
    api: Url,
}

impl<H> LocalNodeSource<H> {
    /// Source reading from the node API at `api`
    pub fn new(http: H, api: Url) -> Self {
        Self { http, api }
    }
}

impl<H> ContentSource for LocalNodeSource<H>
where
    H: HttpClient + Sync,
    TransportError: From<H::Error>,
{
    async fn fetch(&self, address: &ContentAddress) -> Result<Bytes> {
        let mut url = self
            .api
            .join("api/v0/cat")
            .map_err(|e| Error::install(format!("bad node api url: {e}")))?;
        url.query_pairs_mut().append_pair("arg", &address.to_string());
        let request = http::Request::builder()
            .method(http::Method::POST)
            .uri(url.as_str())
            .body(Vec::new())
            .map_err(<TransportError as From<http::Error>>::from)?;
        Ok(send_checked(&self.http, request).await?)
    }
}

/// Either remote backend, chosen at runtime.
#[derive(Debug, Clone)]
pub enum RemoteSource<H> {
    /// Public gateway
    Gateway(GatewaySource<H>),
    /// Local node
    LocalNode(LocalNodeSource<H>),
}

impl<H: Clone> RemoteSource<H> {
    /// The backend `config` asks for.
    pub fn from_config(http: H, config: &Config) -> Self {
        if config.use_local_node {
            RemoteSource::LocalNode(LocalNodeSource::new(http, config.local_node.clone()))
        } else {
            RemoteSource::Gateway(GatewaySource::new(http, config.gateway.clone()))
        }
    }
}

impl<H> ContentSource for RemoteSource<H>
where
    H: HttpClient + Sync,
    TransportError: From<H::Error>,
{
    async fn fetch(&self, address: &ContentAddress) -> Result<Bytes> {
        match self {
            RemoteSource::Gateway(s) => s.fetch(address).await,
            RemoteSource::LocalNode(s) => s.fetch(address).await,
        }
    }
}

/// Verified, locally cached access to content-addressed bytes.
pub struct ContentClient<S, C> {
    source: Arc<S>,
    store: C,
    retry: RetryPolicy,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl<S, C: Clone> Clone for ContentClient<S, C> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            store: self.store.clone(),
            retry: self.retry,
            timeout: self.timeout,
            permits: self.permits.clone(),
        }
    }
}

impl<S, C> ContentClient<S, C>
where
    S: ContentSource + Sync,
    C: ContentStore + Sync,
{
    /// Client over `source` caching into `store`, with retry, timeout and
    /// concurrency limit taken from `config`.
    pub fn new(source: S, store: C, config: &Config) -> Self {
        Self {
            source: Arc::new(source),
            store,
            retry: config.retry,
            timeout: config.timeout,
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
        }
    }

    /// The local store
    pub fn store(&self) -> &C {
        &self.store
    }

    /// Bytes for `address`, from the local store if present, otherwise
    /// fetched, verified and stored.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %address))]
    pub async fn fetch(&self, address: &ContentAddress) -> Result<Bytes> {
        if let Some(bytes) = self.store.get(address).await? {
            return Ok(bytes);
        }
        let bytes = self.fetch_remote(address).await?;
        self.store.insert(address, &bytes).await?;
        Ok(bytes)
    }

    /// Fetch and verify without consulting or touching the local store.
    pub async fn fetch_remote(&self, address: &ContentAddress) -> Result<Bytes> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::install("content client is shut down"))?;
        let bytes = with_retry(&self.retry, "content fetch", || {
            with_timeout(self.timeout, self.source.fetch(address))
        })
        .await
        .map_err(|e| unavailable(address, e))?;
        if !address.verify(&bytes) {
            tracing::warn!(%address, len = bytes.len(), "discarding content that does not match its address");
            return Err(Error::integrity(address));
        }
        Ok(bytes)
    }

    /// Local existence check; never touches the network.
    pub async fn has(&self, address: &ContentAddress) -> Result<bool> {
        Ok(self.store.has(address).await?)
    }

    /// Store `data` locally and return its address.
    pub async fn put(&self, data: &[u8]) -> Result<ContentAddress> {
        Ok(self.store.put(data).await?)
    }
}
