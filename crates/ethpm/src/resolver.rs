//! Package reference resolution
//!
//! Turns what the user typed (a URI, or the alias of a registry in the
//! registry store plus a release) into a [`Uri`], and a [`Uri`] into the
//! verified bytes of a manifest.

use bytes::Bytes;
use ethpm_chain::ChainClient;
use ethpm_common::http_client::HttpClient;
use ethpm_common::{ContentAddress, Manifest, RegistryUri, Release, TransportError, Uri};
use ethpm_store::{ContentStore, RegistryRef, RegistryStore};
use smol_str::SmolStr;

use crate::blob::BlobHostClient;
use crate::config::{Config, RetryPolicy};
use crate::content::{ContentClient, ContentSource};
use crate::error::{Error, ErrorKind, Result};
use crate::retry::{with_retry, with_timeout};

/// A manifest fetched and verified, with where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    /// URI that was asked for
    pub install_uri: Uri,
    /// URI the manifest bytes were actually fetched from
    pub resolved_uri: Uri,
    /// Content address of the manifest bytes
    pub address: ContentAddress,
    /// Raw manifest bytes
    pub bytes: Bytes,
    /// Parsed manifest
    pub manifest: Manifest,
    /// Registry the release was looked up on, without the release part
    pub registry: Option<RegistryUri>,
}

/// Resolve a command-line install target to a [`Uri`].
///
/// `target` is either a URI or the alias of a registry in `registries`. A
/// registry given without a release is completed by `release`.
pub async fn resolve_target(
    registries: &RegistryStore,
    target: &str,
    release: Option<Release>,
) -> Result<Uri> {
    if Uri::looks_like_uri(target) {
        let uri = Uri::parse(target)?;
        return match (uri, release) {
            (Uri::Registry(r), Some(release)) if r.release.is_none() => {
                Ok(Uri::Registry(r.with_release(release)))
            }
            (uri, None) => Ok(uri),
            (uri, Some(_)) => Err(Error::validation(format!(
                "{uri} already names a package; drop --package-name/--package-version"
            ))),
        };
    }

    let entry = registries
        .get(&RegistryRef::Alias(SmolStr::new(target)))
        .await?
        .ok_or_else(|| {
            Error::validation(format!("{target:?} is neither a URI nor a registry alias"))
                .with_help("list known registries with `ethpm registry list`")
        })?;
    let release = release.ok_or_else(|| {
        Error::validation(format!(
            "registry {target} needs --package-name and --package-version"
        ))
    })?;
    Ok(Uri::Registry(entry.uri.with_release(release)))
}

/// Fetches manifests by URI.
pub struct Resolver<S, C, K, H> {
    content: ContentClient<S, C>,
    chain: Option<K>,
    blobs: Option<BlobHostClient<H>>,
    retry: RetryPolicy,
    timeout: std::time::Duration,
}

impl<S, C, K, H> Resolver<S, C, K, H>
where
    S: ContentSource + Sync,
    C: ContentStore + Sync,
    K: ChainClient + Sync,
    H: HttpClient + Sync,
    TransportError: From<H::Error>,
{
    /// Resolver reading content through `content`.
    ///
    /// Registry URIs need a chain client and blob URIs a blob host client;
    /// without them those schemes fail to resolve. Chain calls use the
    /// retry policy and request timeout of `config`.
    pub fn new(
        content: ContentClient<S, C>,
        chain: Option<K>,
        blobs: Option<BlobHostClient<H>>,
        config: &Config,
    ) -> Self {
        Self {
            content,
            chain,
            blobs,
            retry: config.retry,
            timeout: config.timeout,
        }
    }

    /// The content client
    pub fn content(&self) -> &ContentClient<S, C> {
        &self.content
    }

    /// Fetch the manifest `uri` refers to.
    #[tracing::instrument(level = "debug", skip(self), fields(uri = %uri))]
    pub async fn resolve(&self, uri: &Uri) -> Result<ResolvedManifest> {
        let (resolved_uri, registry) = match uri {
            Uri::Registry(r) => {
                let manifest_uri = self.release_manifest_uri(r).await?;
                (manifest_uri, Some(r.bare()))
            }
            other => (other.clone(), None),
        };
        let (address, bytes) = self.fetch(&resolved_uri).await?;
        let manifest = Manifest::from_slice(&bytes)?;
        tracing::debug!(
            package = %manifest.package_name,
            version = %manifest.version,
            %address,
            "resolved manifest"
        );
        Ok(ResolvedManifest {
            install_uri: uri.clone(),
            resolved_uri,
            address,
            bytes,
            manifest,
            registry,
        })
    }

    /// Verified bytes behind a content or blob URI, plus their content
    /// address. Blob bytes are added to the local content store.
    pub async fn fetch(&self, uri: &Uri) -> Result<(ContentAddress, Bytes)> {
        match uri {
            Uri::Content(c) => Ok((c.address, self.content.fetch(&c.address).await?)),
            Uri::Blob(b) => {
                let blobs = self.blobs.as_ref().ok_or_else(|| {
                    Error::install(format!("no blob host configured to fetch {uri}"))
                })?;
                let bytes = blobs.fetch(b).await?;
                let address = self.content.put(&bytes).await?;
                Ok((address, bytes))
            }
            Uri::Registry(_) => Err(Error::install(format!(
                "{uri} is a registry, not a content location"
            ))),
        }
    }

    async fn release_manifest_uri(&self, registry: &RegistryUri) -> Result<Uri> {
        let release = registry.release.as_ref().ok_or_else(|| {
            Error::validation(format!("{registry} does not name a package release"))
                .with_help("append /<package>?version=<version>, or pass --package-name and --package-version")
        })?;
        let chain = self.chain.as_ref().ok_or_else(|| {
            Error::validation(format!("resolving {registry} needs a JSON-RPC endpoint"))
                .with_help("set `rpc` in config.kdl or pass --rpc")
        })?;

        let chain_id = with_retry(&self.retry, "eth_chainId", || {
            with_timeout(self.timeout, async move { Ok(chain.chain_id().await?) })
        })
        .await?;
        if chain_id != registry.registry.chain_id {
            return Err(Error::validation(format!(
                "RPC endpoint serves chain {chain_id} but {registry} lives on chain {}",
                registry.registry.chain_id
            )));
        }

        let raw = with_retry(&self.retry, "release lookup", || {
            with_timeout(self.timeout, async move {
                Ok(chain
                    .release_manifest_uri(
                        &registry.registry.address,
                        &release.package_name,
                        &release.version,
                    )
                    .await?)
            })
        })
        .await
        .map_err(|e| e.with_kind(ErrorKind::Install))?;

        let uri = Uri::parse(&raw)?;
        if matches!(uri, Uri::Registry(_)) {
            return Err(Error::install(format!(
                "registry {registry} points at another registry ({uri})"
            )));
        }
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use ethpm_store::MemoryContentStore;

    use super::*;

    #[tokio::test]
    async fn targets() {
        let dir = tempfile::tempdir().unwrap();
        let registries = RegistryStore::open(dir.path().join("registry-store"));
        let registry =
            RegistryUri::parse("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1").unwrap();
        registries.add(&registry, Some("mainnet")).await.unwrap();
        let release = || {
            Some(Release {
                package_name: "owned".into(),
                version: "1.0.0".into(),
            })
        };

        let uri = resolve_target(&registries, "mainnet", release()).await.unwrap();
        assert_eq!(
            uri.to_string(),
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1/owned?version=1.0.0"
        );
        let uri = resolve_target(&registries, &registry.to_string(), release())
            .await
            .unwrap();
        assert!(uri.as_registry().unwrap().release.is_some());

        let err = resolve_target(&registries, "mainnet", None).await.unwrap_err();
        assert!(err.kind().is_validation());
        let err = resolve_target(&registries, "nowhere", release()).await.unwrap_err();
        assert!(err.kind().is_validation());
        let err = resolve_target(&registries, "bzz://abc", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UriNotSupported);
        let err = resolve_target(
            &registries,
            "ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW",
            release(),
        )
        .await
        .unwrap_err();
        assert!(err.kind().is_validation());
    }

    struct Nothing;

    impl ContentSource for Nothing {
        async fn fetch(&self, address: &ContentAddress) -> Result<Bytes> {
            Err(Error::install(format!("{address} not served")))
        }
    }

    #[tokio::test]
    async fn registry_without_chain_is_a_validation_error() {
        let config = crate::Config::new().root("/unused").build();
        let resolver: Resolver<_, _, ethpm_chain::JsonRpcClient<NoHttp>, NoHttp> =
            Resolver::new(
                ContentClient::new(Nothing, MemoryContentStore::new(), &config),
                None,
                None,
                &config,
            );
        let uri = Uri::parse(
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1/owned?version=1.0.0",
        )
        .unwrap();
        let err = resolver.resolve(&uri).await.unwrap_err();
        assert!(err.kind().is_validation());

        let bare =
            Uri::parse("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1").unwrap();
        let err = resolver.resolve(&bare).await.unwrap_err();
        assert!(err.kind().is_validation());
    }

    struct NoHttp;

    impl HttpClient for NoHttp {
        type Error = std::convert::Infallible;

        async fn send_http(
            &self,
            _request: http::Request<Vec<u8>>,
        ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
            unreachable!("no request expected")
        }
    }
}
