//! Runtime configuration
//!
//! Defaults come from [`Config::new`]; a `config.kdl` file under the data
//! root may override them, and command-line flags override both.
//!
//! ```kdl
//! gateway "https://ipfs.io/"
//! local-node "http://127.0.0.1:5001/"
//! rpc "https://mainnet.infura.io/v3/<key>"
//! blob-host "https://api.github.com/"
//! timeout-ms 30000
//! retry {
//!     max-retries 3
//!     base-delay-ms 250
//!     max-delay-ms 5000
//! }
//! scrape {
//!     batch-span 5000
//!     workers 8
//!     genesis-offset 0
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use ethpm_common::ChainId;
use url::Url;

use crate::error::{Error, Result};

/// Environment variable overriding the data root.
pub const ROOT_ENV: &str = "XDG_ETHPMCLI_ROOT";

/// Required name of a packages directory.
pub const PACKAGES_DIR_NAME: &str = "_ethpm_packages";

/// Name of the optional configuration file inside the data root.
pub const CONFIG_FILE: &str = "config.kdl";

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
#[builder(start_fn = new)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[builder(default = 3)]
    pub max_retries: usize,
    /// Delay before the first retry; doubles on each subsequent one
    #[builder(default = Duration::from_millis(250))]
    pub base_delay: Duration,
    /// Upper bound on any single delay
    #[builder(default = Duration::from_secs(5))]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new().build()
    }
}

/// Everything the installer and scraper need to know about their
/// environment.
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct Config {
    /// Data root holding the registry store, chain data and content mirror
    #[builder(into)]
    pub root: PathBuf,
    /// Packages directory installs are written to
    #[builder(into, default = PathBuf::from(PACKAGES_DIR_NAME))]
    pub packages_dir: PathBuf,
    /// Public content gateway
    #[builder(default = Url::parse("https://ipfs.io/").expect("valid url"))]
    pub gateway: Url,
    /// HTTP API of a local content node
    #[builder(default = Url::parse("http://127.0.0.1:5001/").expect("valid url"))]
    pub local_node: Url,
    /// Fetch from the local node instead of the gateway
    #[builder(default)]
    pub use_local_node: bool,
    /// Ethereum JSON-RPC endpoint
    pub rpc: Option<Url>,
    /// Blob-hosting API base
    #[builder(default = Url::parse("https://api.github.com/").expect("valid url"))]
    pub blob_host: Url,
    /// Per-request timeout for network calls
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,
    /// Backoff for transient failures
    #[builder(default)]
    pub retry: RetryPolicy,
    /// Maximum block span per log query
    #[builder(default = 5_000)]
    pub batch_span: u64,
    /// Concurrent fetches per install or scrape batch
    #[builder(default = 8)]
    pub workers: usize,
    /// Block number reported for chains never scraped
    #[builder(default)]
    pub genesis_offset: u64,
}

impl Config {
    /// Defaults rooted at [`default_root`], overlaid with `config.kdl` if
    /// present.
    pub async fn load() -> Result<Self> {
        Self::load_from(default_root()?).await
    }

    /// Defaults rooted at `root`, overlaid with `<root>/config.kdl` if
    /// present.
    pub async fn load_from(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = Config::new().root(root.clone()).build();
        let path = root.join(CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(ConfigFile::from_kdl(&text)
                .map_err(|e| e.with_context(format!("in {}", path.display())))?
                .apply(config)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(config),
            Err(e) => Err(Error::validation(format!("cannot read {}: {e}", path.display()))),
        }
    }

    /// `<root>/registry-store`
    pub fn registry_store_path(&self) -> PathBuf {
        self.root.join("registry-store")
    }

    /// `<root>/chain-data`
    pub fn chain_data_dir(&self) -> PathBuf {
        self.root.join("chain-data")
    }

    /// `<root>/chain-data/<chain id>`
    pub fn chain_data_path(&self, chain_id: ChainId) -> PathBuf {
        self.chain_data_dir().join(chain_id.to_string())
    }

    /// `<root>/content`
    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    /// `<root>/_keyfile.json`
    pub fn keyfile_path(&self) -> PathBuf {
        self.root.join("_keyfile.json")
    }
}

/// `$XDG_ETHPMCLI_ROOT`, else `<data dir>/ethpmcli`.
pub fn default_root() -> Result<PathBuf> {
    if let Some(root) = std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    dirs::data_dir()
        .map(|d| d.join("ethpmcli"))
        .ok_or_else(|| {
            Error::validation("cannot determine a data directory")
                .with_help(format!("set {ROOT_ENV} to choose one"))
        })
}

/// Settings read from `config.kdl`; unset fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    /// `gateway "<url>"`
    pub gateway: Option<Url>,
    /// `local-node "<url>"`
    pub local_node: Option<Url>,
    /// `rpc "<url>"`
    pub rpc: Option<Url>,
    /// `blob-host "<url>"`
    pub blob_host: Option<Url>,
    /// `timeout-ms <n>`
    pub timeout: Option<Duration>,
    /// `retry { max-retries <n> }`
    pub max_retries: Option<usize>,
    /// `retry { base-delay-ms <n> }`
    pub base_delay: Option<Duration>,
    /// `retry { max-delay-ms <n> }`
    pub max_delay: Option<Duration>,
    /// `scrape { batch-span <n> }`
    pub batch_span: Option<u64>,
    /// `scrape { workers <n> }`
    pub workers: Option<usize>,
    /// `scrape { genesis-offset <n> }`
    pub genesis_offset: Option<u64>,
}

impl ConfigFile {
    /// Parse a KDL document.
    pub fn from_kdl(text: &str) -> Result<Self> {
        let doc = text
            .parse::<kdl::KdlDocument>()
            .map_err(|e| Error::validation(format!("failed to parse KDL: {e}")))?;

        let mut file = ConfigFile::default();
        for node in doc.nodes() {
            match node.name().value() {
                "gateway" => file.gateway = Some(url_arg(node)?),
                "local-node" => file.local_node = Some(url_arg(node)?),
                "rpc" => file.rpc = Some(url_arg(node)?),
                "blob-host" => file.blob_host = Some(url_arg(node)?),
                "timeout-ms" => file.timeout = Some(Duration::from_millis(int_arg(node)?)),
                "retry" => {
                    for child in children(node)?.nodes() {
                        match child.name().value() {
                            "max-retries" => file.max_retries = Some(int_arg(child)? as usize),
                            "base-delay-ms" => {
                                file.base_delay = Some(Duration::from_millis(int_arg(child)?))
                            }
                            "max-delay-ms" => {
                                file.max_delay = Some(Duration::from_millis(int_arg(child)?))
                            }
                            other => {
                                return Err(Error::validation(format!(
                                    "unknown retry field: {other}"
                                )));
                            }
                        }
                    }
                }
                "scrape" => {
                    for child in children(node)?.nodes() {
                        match child.name().value() {
                            "batch-span" => {
                                let span = int_arg(child)?;
                                if span == 0 {
                                    return Err(Error::validation("batch-span must be positive"));
                                }
                                file.batch_span = Some(span);
                            }
                            "workers" => {
                                let workers = int_arg(child)?;
                                if workers == 0 {
                                    return Err(Error::validation("workers must be positive"));
                                }
                                file.workers = Some(workers as usize);
                            }
                            "genesis-offset" => file.genesis_offset = Some(int_arg(child)?),
                            other => {
                                return Err(Error::validation(format!(
                                    "unknown scrape field: {other}"
                                )));
                            }
                        }
                    }
                }
                other => {
                    return Err(Error::validation(format!("unknown config node: {other}")));
                }
            }
        }
        Ok(file)
    }

    /// Overlay these settings on `config`.
    pub fn apply(self, mut config: Config) -> Config {
        if let Some(v) = self.gateway {
            config.gateway = v;
        }
        if let Some(v) = self.local_node {
            config.local_node = v;
        }
        if let Some(v) = self.rpc {
            config.rpc = Some(v);
        }
        if let Some(v) = self.blob_host {
            config.blob_host = v;
        }
        if let Some(v) = self.timeout {
            config.timeout = v;
        }
        if let Some(v) = self.max_retries {
            config.retry.max_retries = v;
        }
        if let Some(v) = self.base_delay {
            config.retry.base_delay = v;
        }
        if let Some(v) = self.max_delay {
            config.retry.max_delay = v;
        }
        if let Some(v) = self.batch_span {
            config.batch_span = v;
        }
        if let Some(v) = self.workers {
            config.workers = v;
        }
        if let Some(v) = self.genesis_offset {
            config.genesis_offset = v;
        }
        config
    }
}

fn children(node: &kdl::KdlNode) -> Result<&kdl::KdlDocument> {
    node.children()
        .ok_or_else(|| Error::validation(format!("{} block has no children", node.name().value())))
}

fn url_arg(node: &kdl::KdlNode) -> Result<Url> {
    let name = node.name().value();
    let val = node
        .entries()
        .get(0)
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| Error::validation(format!("{name} expects a string value")))?;
    Url::parse(val).map_err(|e| Error::validation(format!("{name}: invalid URL {val:?}: {e}")))
}

fn int_arg(node: &kdl::KdlNode) -> Result<u64> {
    let name = node.name().value();
    node.entries()
        .get(0)
        .and_then(|e| e.value().as_integer())
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| Error::validation(format!("{name} expects a non-negative integer")))
}

/// Whether `path` has the required packages-directory name.
pub(crate) fn is_packages_dir_name(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()) == Some(PACKAGES_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new().root("/tmp/ethpm").build();
        assert_eq!(config.packages_dir, PathBuf::from("_ethpm_packages"));
        assert_eq!(config.gateway.as_str(), "https://ipfs.io/");
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.batch_span, 5_000);
        assert_eq!(
            config.chain_data_path(1),
            PathBuf::from("/tmp/ethpm/chain-data/1")
        );
    }

    #[test]
    fn kdl_overrides() {
        let file = ConfigFile::from_kdl(
            r#"
            gateway "https://gateway.example/"
            timeout-ms 1500
            retry {
                max-retries 5
                base-delay-ms 10
            }
            scrape {
                batch-span 100
                genesis-offset 7
            }
            "#,
        )
        .unwrap();
        let config = file.apply(Config::new().root("/r").build());
        assert_eq!(config.gateway.as_str(), "https://gateway.example/");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.retry.max_delay, Duration::from_secs(5));
        assert_eq!(config.batch_span, 100);
        assert_eq!(config.genesis_offset, 7);
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn kdl_rejects_unknown_and_bad_values() {
        assert!(ConfigFile::from_kdl("colour \"blue\"").is_err());
        assert!(ConfigFile::from_kdl("timeout-ms \"soon\"").is_err());
        assert!(ConfigFile::from_kdl("scrape { batch-span 0; }").is_err());
        assert!(ConfigFile::from_kdl("gateway \"not a url\"").is_err());
    }

    #[tokio::test]
    async fn load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path()).await.unwrap();
        assert_eq!(config.root, dir.path());
        assert!(config.rpc.is_none());
    }
}
