use ethpm_common::TransportError;
use miette::Diagnostic;
use thiserror::Error;

/// Result alias for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors talking to a chain through its JSON-RPC interface.
#[derive(Debug, Error, Diagnostic)]
#[allow(missing_docs)]
pub enum ChainError {
    #[error("HTTP error: {0}")]
    #[diagnostic(
        code(ethpm_chain::http),
        help("check that the RPC endpoint is reachable")
    )]
    Transport(#[from] TransportError),
    #[error("JSON-RPC error {code}: {message}")]
    #[diagnostic(code(ethpm_chain::rpc))]
    Rpc { code: i64, message: String },
    #[error("malformed RPC response: {0}")]
    #[diagnostic(code(ethpm_chain::response))]
    Response(String),
    #[error("ABI decode error: {0}")]
    #[diagnostic(code(ethpm_chain::abi))]
    Decode(String),
    #[error("serialize/deserialize error: {0}")]
    #[diagnostic(code(ethpm_chain::serde))]
    Serde(#[from] serde_json::Error),
    #[error("release {package_name}@{version} not found on registry")]
    #[diagnostic(
        code(ethpm_chain::release_not_found),
        help("check the package name and version against the registry's releases")
    )]
    ReleaseNotFound {
        package_name: String,
        version: String,
    },
    #[error("URL error: {0}")]
    #[diagnostic(code(ethpm_chain::url))]
    Url(#[from] url::ParseError),
}

impl ChainError {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub(crate) fn response(msg: impl Into<String>) -> Self {
        Self::Response(msg.into())
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Provider-side limit and internal errors (`-32005`, `-32603`) count as
    /// transient alongside transport failures.
    pub fn is_transient(&self) -> bool {
        match self {
            ChainError::Transport(e) => e.is_transient(),
            ChainError::Rpc { code, .. } => matches!(code, -32005 | -32603),
            _ => false,
        }
    }
}
