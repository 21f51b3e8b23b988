//! Blob-host client
//!
//! Fetches git blobs through a hosting API that returns
//! `{ "content": "<base64>", "encoding": "base64" }`, and checks the decoded
//! bytes against the blob hash in the URI.

use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use ethpm_common::http_client::{HttpClient, send_checked};
use ethpm_common::{BlobUri, TransportError};
use serde::Deserialize;
use url::Url;

use crate::config::{Config, RetryPolicy};
use crate::error::{Error, ErrorKind, Result};
use crate::retry::{with_retry, with_timeout};

#[derive(Deserialize)]
struct BlobDocument {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// Client for one blob-hosting API.
#[derive(Debug, Clone)]
pub struct BlobHostClient<H> {
    http: H,
    base: Url,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<H> BlobHostClient<H>
where
    H: HttpClient + Sync,
    TransportError: From<H::Error>,
{
    /// Client for the blob host named in `config`.
    pub fn new(http: H, config: &Config) -> Self {
        Self {
            http,
            base: config.blob_host.clone(),
            retry: config.retry,
            timeout: config.timeout,
        }
    }

    /// Fetch and verify the blob `uri` names.
    #[tracing::instrument(level = "debug", skip(self), fields(blob = %uri.blob_hash))]
    pub async fn fetch(&self, uri: &BlobUri) -> Result<Bytes> {
        if self.base.host_str() != Some(uri.host.as_str()) {
            return Err(Error::validation(format!(
                "blob host {} is not the configured host {}",
                uri.host, self.base
            )));
        }
        let url = self
            .base
            .join(&format!(
                "repos/{}/{}/git/blobs/{}",
                uri.owner, uri.repo, uri.blob_hash
            ))
            .map_err(|e| Error::install(format!("bad blob host url: {e}")))?;

        let body = with_retry(&self.retry, "blob fetch", || {
            with_timeout(self.timeout, self.get(&url))
        })
        .await
        .map_err(|e| {
            Error::new(ErrorKind::Install, Some(Box::new(e)))
                .with_context(format!("could not fetch blob {}", uri.blob_hash))
        })?;

        let doc: BlobDocument = serde_json::from_slice(&body).map_err(|e| {
            Error::new(ErrorKind::Install, Some(Box::new(e)))
                .with_context("blob host returned an unexpected document")
        })?;
        if let Some(encoding) = doc.encoding.as_deref().filter(|e| *e != "base64") {
            return Err(Error::install(format!("unsupported blob encoding {encoding:?}")));
        }
        let compact: String = doc.content.split_whitespace().collect();
        let bytes = BASE64_STANDARD.decode(compact).map_err(|e| {
            Error::new(ErrorKind::Install, Some(Box::new(e)))
                .with_context("blob content is not valid base64")
        })?;

        if !uri.blob_hash.verify(&bytes) {
            tracing::warn!(blob = %uri.blob_hash, "discarding blob that does not match its hash");
            return Err(Error::integrity(uri.blob_hash));
        }
        Ok(Bytes::from(bytes))
    }

    async fn get(&self, url: &Url) -> Result<Bytes> {
        let request = http::Request::builder()
            .method(http::Method::GET)
            .uri(url.as_str())
            .header(http::header::ACCEPT, "application/vnd.github+json")
            .header(http::header::USER_AGENT, concat!("ethpm/", env!("CARGO_PKG_VERSION")))
            .body(Vec::new())
            .map_err(<TransportError as From<http::Error>>::from)?;
        Ok(send_checked(&self.http, request).await?)
    }
}
