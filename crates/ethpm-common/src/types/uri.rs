//! Package reference URIs.
//!
//! Three schemes are understood:
//!
//! - `ipfs://<cid>`: a manifest or source by content address
//! - `erc1319://<address>:<chainId>[/<package>?version=<version>]`: a registry,
//!   optionally narrowed to one release
//! - `https://<host>/repos/<owner>/<repo>/git/blobs/<sha1>`: a git blob on a
//!   blob-hosting API
//!
//! Parsing never touches the network. Every [`Uri`] displays as a string that
//! parses back to an equal value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use smol_str::{SmolStr, ToSmolStr};

use super::address::{Address, ChainId, RegistryId};
use super::content::{ContentAddress, GitBlobHash};
use super::{is_valid_package_name, is_valid_version};

/// Scheme prefix for content-addressed references.
pub const CONTENT_SCHEME: &str = "ipfs://";

/// Scheme prefix for on-chain registry references.
pub const REGISTRY_SCHEME: &str = "erc1319://";

/// Raised when a string matches none of the supported URI grammars.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("URI not supported: {uri:?} ({reason})")]
#[diagnostic(
    code(ethpm::uri::not_supported),
    help(
        "supported forms are ipfs://<cid>, erc1319://<address>:<chain id>[/<package>?version=<version>] and https://api.github.com/repos/<owner>/<repo>/git/blobs/<sha>"
    )
)]
pub struct UriNotSupportedError {
    /// The rejected input
    pub uri: String,
    /// Which rule the input broke
    pub reason: SmolStr,
}

impl UriNotSupportedError {
    fn new(uri: &str, reason: impl Into<SmolStr>) -> Self {
        Self {
            uri: uri.to_owned(),
            reason: reason.into(),
        }
    }
}

/// A parsed package reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Uri {
    /// `ipfs://<cid>`
    Content(ContentUri),
    /// `erc1319://<address>:<chainId>[/<package>?version=<version>]`
    Registry(RegistryUri),
    /// Git blob on a blob-hosting API
    Blob(BlobUri),
}

/// Reference to immutable bytes by content address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentUri {
    /// Content address of the referenced bytes
    pub address: ContentAddress,
}

/// A package name and version published on a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Release {
    /// Published package name
    pub package_name: SmolStr,
    /// Exact version or version range
    pub version: SmolStr,
}

/// Reference to an on-chain registry, optionally narrowed to one release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryUri {
    /// Chain id and contract address of the registry
    pub registry: RegistryId,
    /// Package name and version, always present together
    pub release: Option<Release>,
}

/// Reference to a git blob on a blob-hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobUri {
    /// API host, e.g. `api.github.com`
    pub host: SmolStr,
    /// Repository owner
    pub owner: SmolStr,
    /// Repository name
    pub repo: SmolStr,
    /// Git object id of the blob
    pub blob_hash: GitBlobHash,
}

impl Uri {
    /// Parse any supported URI.
    pub fn parse(s: &str) -> Result<Self, UriNotSupportedError> {
        if s.starts_with(CONTENT_SCHEME) {
            ContentUri::parse(s).map(Uri::Content)
        } else if s.starts_with(REGISTRY_SCHEME) {
            RegistryUri::parse(s).map(Uri::Registry)
        } else if s.starts_with("https://") {
            BlobUri::parse(s).map(Uri::Blob)
        } else {
            Err(UriNotSupportedError::new(s, "unknown scheme"))
        }
    }

    /// Whether `s` has a `scheme://` prefix and should be treated as a URI
    /// rather than an alias.
    pub fn looks_like_uri(s: &str) -> bool {
        s.contains("://")
    }

    /// The registry part, if this is a registry URI.
    pub fn as_registry(&self) -> Option<&RegistryUri> {
        match self {
            Uri::Registry(r) => Some(r),
            _ => None,
        }
    }

    /// The content address, if this is a content URI.
    pub fn content_address(&self) -> Option<ContentAddress> {
        match self {
            Uri::Content(c) => Some(c.address),
            _ => None,
        }
    }
}

impl ContentUri {
    /// Wrap a content address.
    pub fn new(address: ContentAddress) -> Self {
        Self { address }
    }

    /// Parse `ipfs://<cid>`.
    pub fn parse(s: &str) -> Result<Self, UriNotSupportedError> {
        let rest = s
            .strip_prefix(CONTENT_SCHEME)
            .ok_or_else(|| UriNotSupportedError::new(s, "expected ipfs:// scheme"))?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let address = ContentAddress::parse(rest)
            .map_err(|e| UriNotSupportedError::new(s, e.to_smolstr()))?;
        Ok(Self { address })
    }
}

impl RegistryUri {
    /// A registry URI with no release selected.
    pub fn new(registry: RegistryId) -> Self {
        Self {
            registry,
            release: None,
        }
    }

    /// The same registry, narrowed to `release`.
    pub fn with_release(&self, release: Release) -> Self {
        Self {
            registry: self.registry,
            release: Some(release),
        }
    }

    /// The registry without any release selected.
    pub fn bare(&self) -> Self {
        Self::new(self.registry)
    }

    /// Parse `erc1319://<address>:<chainId>[/<package>?version=<version>]`.
    pub fn parse(s: &str) -> Result<Self, UriNotSupportedError> {
        let rest = s
            .strip_prefix(REGISTRY_SCHEME)
            .ok_or_else(|| UriNotSupportedError::new(s, "expected erc1319:// scheme"))?;

        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };
        let (authority, package) = match path.split_once('/') {
            Some((a, p)) => (a, (!p.is_empty()).then_some(p)),
            None => (path, None),
        };

        let (address, chain) = authority
            .rsplit_once(':')
            .ok_or_else(|| UriNotSupportedError::new(s, "missing :<chain id>"))?;
        let address = Address::parse(address)
            .map_err(|e| UriNotSupportedError::new(s, e.reason))?;
        if chain.is_empty() || !chain.bytes().all(|b| b.is_ascii_digit()) {
            return Err(UriNotSupportedError::new(s, "chain id must be a number"));
        }
        let chain_id: ChainId = chain
            .parse()
            .map_err(|_| UriNotSupportedError::new(s, "chain id out of range"))?;

        let version = match query {
            None => None,
            Some(q) => match q.split_once('=') {
                Some(("version", v)) if !v.is_empty() => Some(v),
                _ => return Err(UriNotSupportedError::new(s, "query must be version=<version>")),
            },
        };

        let release = match (package, version) {
            (None, None) => None,
            (Some(name), Some(version)) => {
                if !is_valid_package_name(name) {
                    return Err(UriNotSupportedError::new(s, "invalid package name"));
                }
                if !is_valid_version(version) {
                    return Err(UriNotSupportedError::new(s, "invalid version"));
                }
                Some(Release {
                    package_name: name.to_smolstr(),
                    version: version.to_smolstr(),
                })
            }
            (Some(_), None) => {
                return Err(UriNotSupportedError::new(s, "package name without version"));
            }
            (None, Some(_)) => {
                return Err(UriNotSupportedError::new(s, "version without package name"));
            }
        };

        Ok(Self {
            registry: RegistryId::new(address, chain_id),
            release,
        })
    }

    /// Whether both URIs name the same on-chain registry.
    ///
    /// Only chain id and address take part; the release is ignored.
    pub fn same_registry(&self, other: &RegistryUri) -> bool {
        self.registry == other.registry
    }
}

impl BlobUri {
    /// Parse `https://<host>/repos/<owner>/<repo>/git/blobs/<sha1>`.
    pub fn parse(s: &str) -> Result<Self, UriNotSupportedError> {
        let url = url::Url::parse(s).map_err(|e| UriNotSupportedError::new(s, e.to_smolstr()))?;
        if url.scheme() != "https" {
            return Err(UriNotSupportedError::new(s, "blob URIs must use https"));
        }
        if url.query().is_some() || url.fragment().is_some() || url.port().is_some() {
            return Err(UriNotSupportedError::new(s, "unexpected query, fragment or port"));
        }
        let host = url
            .host_str()
            .ok_or_else(|| UriNotSupportedError::new(s, "missing host"))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segs| segs.collect())
            .unwrap_or_default();
        let [repos, owner, repo, git, blobs, hash] = segments.as_slice() else {
            return Err(UriNotSupportedError::new(s, "not a blob API path"));
        };
        if *repos != "repos" || *git != "git" || *blobs != "blobs" {
            return Err(UriNotSupportedError::new(s, "not a blob API path"));
        }
        if !is_repo_segment(owner) || !is_repo_segment(repo) {
            return Err(UriNotSupportedError::new(s, "invalid owner or repository"));
        }
        let blob_hash = GitBlobHash::parse(hash)
            .ok_or_else(|| UriNotSupportedError::new(s, "blob hash must be 40 hex digits"))?;
        Ok(Self {
            host: host.to_smolstr(),
            owner: owner.to_smolstr(),
            repo: repo.to_smolstr(),
            blob_hash,
        })
    }
}

fn is_repo_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

impl FromStr for Uri {
    type Err = UriNotSupportedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for RegistryUri {
    type Err = UriNotSupportedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CONTENT_SCHEME}{}", self.address)
    }
}

impl fmt::Display for RegistryUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{REGISTRY_SCHEME}{}:{}",
            self.registry.address, self.registry.chain_id
        )?;
        if let Some(release) = &self.release {
            write!(f, "/{}?version={}", release.package_name, release.version)?;
        }
        Ok(())
    }
}

impl fmt::Display for BlobUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "https://{}/repos/{}/{}/git/blobs/{}",
            self.host, self.owner, self.repo, self.blob_hash
        )
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uri::Content(u) => fmt::Display::fmt(u, f),
            Uri::Registry(u) => fmt::Display::fmt(u, f),
            Uri::Blob(u) => fmt::Display::fmt(u, f),
        }
    }
}

impl From<ContentAddress> for Uri {
    fn from(address: ContentAddress) -> Self {
        Uri::Content(ContentUri { address })
    }
}

impl From<RegistryUri> for Uri {
    fn from(value: RegistryUri) -> Self {
        Uri::Registry(value)
    }
}

impl Serialize for Uri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

impl Serialize for RegistryUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegistryUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_uris() {
        for uri in [
            "ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1/owned?version=1.0.0",
            "https://api.github.com/repos/ethpm/py-ethpm/git/blobs/a7232a93f1e9e75d606f6c1da18aa16037e03480",
        ] {
            let parsed = Uri::parse(uri).unwrap();
            assert_eq!(parsed.to_string(), uri);
        }
    }

    #[test]
    fn unsupported_uris() {
        for uri in [
            "123",
            "www.google.com",
            "bzz://da6adeeb4589d8652bbe5679aae6b6409ec85a20e92a8823c7c99e25dba9493d",
            "ipfs://notacid",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729",
            "erc1319://0x6b5DA3cA:1",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:-1",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1/owned",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1?version=1.0.0",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1/Owned?version=1.0.0",
            "https://github.com/ethpm/py-ethpm",
            "https://api.github.com/repos/ethpm/py-ethpm/git/blobs/xyz",
        ] {
            assert!(Uri::parse(uri).is_err(), "{uri} should be rejected");
        }
    }

    #[test]
    fn registry_uri_parts() {
        let uri =
            RegistryUri::parse("erc1319://0x6b5da3ca4286baa7fbaf64eeee1834c7d430b729:3/dai?version=1.0.0")
                .unwrap();
        assert_eq!(uri.registry.chain_id, 3);
        let release = uri.release.as_ref().unwrap();
        assert_eq!(release.package_name, "dai");
        assert_eq!(release.version, "1.0.0");
        // checksummed on display
        assert_eq!(
            uri.to_string(),
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:3/dai?version=1.0.0"
        );
        assert_eq!(
            uri.bare().to_string(),
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:3"
        );
    }

    #[test]
    fn serde_uses_string_form() {
        let uri = Uri::parse("ipfs://QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o").unwrap();
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, "\"ipfs://QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o\"");
        let back: Uri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uri);
    }
}
