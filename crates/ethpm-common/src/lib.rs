//! Common types for the ethPM package tooling
//!
//! Everything in here is pure: parsing, hashing and (de)serialization. No
//! type in this crate touches the network or the filesystem, with the
//! exception of the [`http_client::HttpClient`] seam which other crates use
//! to talk to content gateways, blob hosts and JSON-RPC providers.
//!
//! - [`types::uri::Uri`]: the three supported package reference schemes
//! - [`types::content::ContentAddress`]: CID-based content addresses
//! - [`types::address::Address`]: 20-byte account addresses
//! - [`manifest::Manifest`]: ethPM v2 package manifests

#![warn(missing_docs)]
pub use smol_str;
pub use url;

pub mod digest;
pub mod error;
/// HTTP client abstraction used by ethpm crates.
pub mod http_client;
pub mod manifest;
/// Baseline ethPM data types.
pub mod types;

pub use error::{HttpError, TransportError};
pub use manifest::Manifest;
pub use types::address::{Address, ChainId, RegistryId};
pub use types::content::{ContentAddress, GitBlobHash};
pub use types::uri::{BlobUri, ContentUri, RegistryUri, Release, Uri, UriNotSupportedError};
