//! ethPM package installation and registry scraping
//!
//! This crate ties the pieces of the workspace together:
//!
//! - [`Resolver`] turns a package reference into a verified manifest,
//!   looking releases up on chain through an
//!   [`ethpm_chain::ChainClient`] and fetching bytes through a
//!   [`ContentClient`].
//! - [`Installer`] resolves a manifest's dependency tree and writes it into
//!   an `_ethpm_packages` directory.
//! - [`Scraper`] follows a chain's `VersionRelease` events and mirrors every
//!   released package into the local content store, checkpointing as it
//!   goes.
//!
//! Network access sits behind traits ([`ContentSource`],
//! [`ethpm_chain::ChainClient`], [`ethpm_common::http_client::HttpClient`])
//! so every component can be driven by in-process fakes.
//!
//! ```no_run
//! # async fn example() -> ethpm::Result<()> {
//! use ethpm::{Config, ContentClient, InstallRequest, Installer, RemoteSource, Resolver};
//! use ethpm_store::{FileContentStore, PackageIndex};
//!
//! let config = Config::load().await?;
//! let http = reqwest::Client::new();
//! let content = ContentClient::new(
//!     RemoteSource::from_config(http.clone(), &config),
//!     FileContentStore::new(config.content_dir()),
//!     &config,
//! );
//! let resolver = Resolver::<_, _, ethpm_chain::JsonRpcClient<reqwest::Client>, reqwest::Client>::new(
//!     content, None, None, &config,
//! );
//! let installer = Installer::new(resolver, PackageIndex::open(&config.packages_dir), config.workers);
//! let uri: ethpm_common::Uri = "ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW".parse()?;
//! installer.install(InstallRequest::new().uri(uri).build()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod blob;
pub mod config;
pub mod content;
pub mod error;
pub mod install;
pub mod resolver;
pub mod retry;
pub mod scrape;
pub mod validation;

pub use blob::BlobHostClient;
pub use config::{Config, RetryPolicy};
pub use content::{ContentClient, ContentSource, GatewaySource, LocalNodeSource, RemoteSource};
pub use error::{Error, ErrorKind, Result};
pub use install::{InstallRequest, Installer, render_tree};
pub use resolver::{ResolvedManifest, Resolver, resolve_target};
pub use scrape::{ScrapeReport, ScrapeState, Scraper};
pub use validation::same_registry;
