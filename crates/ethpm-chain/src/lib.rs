//! Blockchain access for ethPM
//!
//! [`ChainClient`] is the seam: the event scraper asks it for the head block
//! and for `VersionRelease` logs, and the resolver asks it which manifest a
//! registry recorded for a release. [`JsonRpcClient`] implements it over
//! plain Ethereum JSON-RPC through the shared [`HttpClient`] abstraction.
//!
//! [`HttpClient`]: ethpm_common::http_client::HttpClient

#![warn(missing_docs)]

pub mod abi;
pub mod client;
pub mod error;
pub mod events;
pub mod types;

pub use client::{ChainClient, JsonRpcClient};
pub use error::{ChainError, Result};
pub use events::{VERSION_RELEASE_SIGNATURE, VersionRelease, version_release_topic};
pub use types::{H256, Log, LogFilter};
