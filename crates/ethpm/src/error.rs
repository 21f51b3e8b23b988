//! Error taxonomy for ethPM operations
//!
//! Callers branch on [`Error::kind`]. Validation and unsupported-URI errors
//! are always raised before any network access or disk mutation.

use std::error::Error as StdError;
use std::fmt;

use ethpm_chain::ChainError;
use ethpm_common::{ContentAddress, TransportError, UriNotSupportedError};
use ethpm_store::{StoreError, StoreErrorKind};

/// Boxed error type for error sources
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type alias for ethPM operations
pub type Result<T> = std::result::Result<T, Error>;

/// ethPM operation error with rich diagnostics
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct Error {
    kind: ErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<String>,
    context: Option<String>,
    transient: bool,
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or conflicting input: alias collisions, cross-registry
    /// dependencies, bad paths
    Validation,
    /// Unparsable or unsupported URI
    UriNotSupported,
    /// Fetch or write failure during install, already-installed conflicts,
    /// invalid target directories
    Install,
    /// Missing or invalid keyfile
    Authorization,
    /// Bytes did not hash to the address they were fetched under
    ContentIntegrity,
    /// Network failure talking to a content source or blob host
    Transport,
    /// Local store failure
    Storage,
    /// Blockchain RPC failure
    Chain,
    /// Scrape run could not complete
    Scrape,
}

impl ErrorKind {
    /// Whether this is a user-input error (including unsupported URIs).
    pub fn is_validation(&self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::UriNotSupported)
    }
}

impl Error {
    /// Create a new error with the given kind and optional source
    pub fn new(kind: ErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
            transient: false,
        }
    }

    /// Add a help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Add context information to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Re-categorize, keeping source and context.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether retrying could plausibly succeed (timeouts, connection
    /// failures, 5xx and rate limiting).
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, None).with_context(msg)
    }

    /// Create an install error
    pub fn install(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Install, None).with_context(msg)
    }

    /// Create an authorization error
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, None)
            .with_context(msg)
            .with_help("pass a keyfile with `ethpm auth --keyfile-path <path>`")
    }

    /// Create a content-integrity error
    pub fn integrity(address: impl fmt::Display) -> Self {
        Self::new(ErrorKind::ContentIntegrity, None)
            .with_context(format!("fetched bytes do not hash to {address}"))
            .with_help("the source served different content; the bytes were discarded")
    }

    /// Create a scrape error
    pub fn scrape(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scrape, None).with_context(msg)
    }

    /// Wrap a transport error
    pub fn transport(source: TransportError) -> Self {
        let transient = source.is_transient();
        Self {
            transient,
            ..Self::new(ErrorKind::Transport, Some(Box::new(source)))
        }
    }

    /// Wrap a chain error
    pub fn chain(source: ChainError) -> Self {
        let transient = source.is_transient();
        Self {
            transient,
            ..Self::new(ErrorKind::Chain, Some(Box::new(source)))
        }
    }

    /// Wrap a store error. Integrity failures keep their category, and
    /// lookups of missing or duplicate entries are the caller's input.
    pub fn storage(source: StoreError) -> Self {
        let kind = match source.kind() {
            StoreErrorKind::Integrity => ErrorKind::ContentIntegrity,
            StoreErrorKind::NotFound
            | StoreErrorKind::AlreadyExists
            | StoreErrorKind::InvalidInput => ErrorKind::Validation,
            _ => ErrorKind::Storage,
        };
        Self::new(kind, Some(Box::new(source)))
    }

    /// Mark whether the error is worth retrying.
    pub(crate) fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;

        if let Some(ctx) = &self.context {
            write!(f, ": {}", ctx)?;
        }

        if let Some(src) = &self.source {
            write!(f, ": {}", src)?;
        }

        Ok(())
    }
}

impl From<UriNotSupportedError> for Error {
    fn from(e: UriNotSupportedError) -> Self {
        Self::new(ErrorKind::UriNotSupported, Some(Box::new(e)))
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::transport(e)
    }
}

impl From<ChainError> for Error {
    fn from(e: ChainError) -> Self {
        Self::chain(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::storage(e)
    }
}

impl From<ethpm_common::manifest::ManifestError> for Error {
    fn from(e: ethpm_common::manifest::ManifestError) -> Self {
        use ethpm_common::manifest::ManifestError;
        let kind = match &e {
            ManifestError::Uri(_) => ErrorKind::UriNotSupported,
            ManifestError::InvalidSourcePath { .. } | ManifestError::InvalidDependencyName(_) => {
                ErrorKind::Validation
            }
            ManifestError::Malformed(_) => ErrorKind::Install,
        };
        Self::new(kind, Some(Box::new(e)))
    }
}

/// Shorthand for the error raised when an address's bytes are unavailable.
pub(crate) fn unavailable(address: &ContentAddress, source: Error) -> Error {
    let transient = source.is_transient();
    Error::new(ErrorKind::Install, Some(Box::new(source)))
        .with_context(format!("could not fetch {address}"))
        .transient(transient)
}
