//! Persistent state for ethPM tooling
//!
//! Each store is an explicit handle over a location on disk. Handles are
//! cheap to clone and hold no state in memory between calls; every operation
//! reads the current file contents, and every mutation replaces a file
//! atomically.
//!
//! - [`content`]: content-addressed byte mirror
//! - [`registry`]: aliases for on-chain registries, one of them active
//! - [`chain`]: per-chain scrape checkpoints
//! - [`index`]: records of installed packages

#![warn(missing_docs)]

pub mod chain;
pub mod content;
pub mod error;
pub mod fs;
pub mod index;
pub mod registry;

pub use chain::{ChainCheckpoint, ChainDataStore};
pub use content::{ContentStore, FileContentStore, MemoryContentStore};
pub use error::{Result, StoreError, StoreErrorKind};
pub use fs::FileLock;
pub use index::{InstalledDependency, InstalledPackageRecord, PackageIndex};
pub use registry::{RegistryRef, RegistryStore, RegistryStoreEntry};
