//! Error types for persistent stores

use std::error::Error;
use std::fmt;
use std::path::Path;

/// Boxed error type for error sources
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store operation error with rich diagnostics
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct StoreError {
    kind: StoreErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<String>,
    context: Option<String>,
}

/// Error categories for store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Filesystem operation failed
    Io,
    /// Persisted data could not be (de)serialized
    Serialization,
    /// Entry does not exist
    NotFound,
    /// Entry already exists
    AlreadyExists,
    /// Caller passed a value the store does not accept
    InvalidInput,
    /// Update would violate a store invariant
    Conflict,
    /// Another process holds the lock
    Locked,
    /// Stored bytes do not match their address
    Integrity,
}

impl StoreError {
    /// Create a new error with the given kind and optional source
    pub fn new(kind: StoreErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
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

    /// Get the error kind
    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    /// Create an I/O error
    pub fn io(source: std::io::Error, path: &Path) -> Self {
        Self::new(StoreErrorKind::Io, Some(Box::new(source)))
            .with_context(format!("path: {}", path.display()))
    }

    /// Create a serialization error
    pub fn serialization(source: impl Error + Send + Sync + 'static, path: &Path) -> Self {
        Self::new(StoreErrorKind::Serialization, Some(Box::new(source)))
            .with_context(format!("path: {}", path.display()))
            .with_help("the file may be corrupt; remove it to start over")
    }

    /// Create a not found error
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        Self::new(StoreErrorKind::NotFound, None)
            .with_context(format!("{} not found: {}", resource, id))
    }

    /// Create an already exists error
    pub fn already_exists(resource: &str, id: impl fmt::Display) -> Self {
        Self::new(StoreErrorKind::AlreadyExists, None)
            .with_context(format!("{} already exists: {}", resource, id))
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::InvalidInput, None).with_context(msg)
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Conflict, None).with_context(msg)
    }

    /// Create a lock contention error
    pub fn locked(path: &Path) -> Self {
        Self::new(StoreErrorKind::Locked, None)
            .with_context(format!("lock held: {}", path.display()))
            .with_help("another ethpm process is using this store; wait for it to finish")
    }

    /// Create an integrity error
    pub fn integrity(address: impl fmt::Display) -> Self {
        Self::new(StoreErrorKind::Integrity, None)
            .with_context(format!("bytes do not hash to {}", address))
    }
}

impl fmt::Display for StoreError {
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
