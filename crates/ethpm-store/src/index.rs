//! Installed-package index (`_ethpm_packages/ethpm.lock`)

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ethpm_common::{ContentAddress, RegistryUri, Uri};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::Result;
use crate::fs::{FileLock, read_json, write_json};

/// Name of the index file inside a packages directory.
pub const INDEX_FILE: &str = "ethpm.lock";

/// Directory (inside a packages directory) holding advisory lock files.
pub const LOCKS_DIR: &str = ".locks";

/// A build dependency materialized beneath an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledDependency {
    /// Directory name under the parent's `_ethpm_packages`
    pub alias: SmolStr,
    /// URI the parent manifest declared
    pub uri: Uri,
    /// Address of the dependency's manifest
    pub manifest_address: ContentAddress,
    /// Published package name
    pub package_name: SmolStr,
    /// Package version
    pub version: SmolStr,
    /// Nested dependencies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<InstalledDependency>,
}

/// Record of one top-level install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackageRecord {
    /// Directory name under the packages dir, unique within it
    pub alias: SmolStr,
    /// URI the user asked for
    pub install_uri: Uri,
    /// URI the manifest was actually fetched from
    pub resolved_uri: Uri,
    /// Address of the manifest
    pub manifest_address: ContentAddress,
    /// Published package name
    pub package_name: SmolStr,
    /// Package version
    pub version: SmolStr,
    /// Registry the package came from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryUri>,
    /// Every content address written to disk for this install
    #[serde(default)]
    pub materialized: BTreeSet<ContentAddress>,
    /// Build dependency tree
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<InstalledDependency>,
}

/// Handle to the index file of one packages directory.
#[derive(Debug, Clone)]
pub struct PackageIndex {
    packages_dir: PathBuf,
}

impl PackageIndex {
    /// Index for `packages_dir` (an `_ethpm_packages` directory).
    pub fn open(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
        }
    }

    /// The packages directory
    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Path of the index file
    pub fn path(&self) -> PathBuf {
        self.packages_dir.join(INDEX_FILE)
    }

    /// Path of the lock file serializing installs of `alias`.
    pub fn alias_lock_path(&self, alias: &str) -> PathBuf {
        self.packages_dir
            .join(LOCKS_DIR)
            .join(format!("{alias}.lock"))
    }

    /// Take the per-alias install lock without waiting.
    pub fn lock_alias(&self, alias: &str) -> Result<FileLock> {
        FileLock::try_acquire(self.alias_lock_path(alias))
    }

    async fn lock_index(&self) -> Result<FileLock> {
        FileLock::acquire(self.packages_dir.join(LOCKS_DIR).join("index.lock")).await
    }

    async fn load(&self) -> Result<BTreeMap<SmolStr, InstalledPackageRecord>> {
        Ok(read_json(&self.path()).await?.unwrap_or_default())
    }

    /// All records, ordered by alias.
    pub async fn list(&self) -> Result<Vec<InstalledPackageRecord>> {
        Ok(self.load().await?.into_values().collect())
    }

    /// The record for `alias`, if installed.
    pub async fn get(&self, alias: &str) -> Result<Option<InstalledPackageRecord>> {
        Ok(self.load().await?.remove(alias))
    }

    /// Find a record by alias, falling back to package name.
    pub async fn find(&self, alias_or_name: &str) -> Result<Option<InstalledPackageRecord>> {
        let mut records = self.load().await?;
        if let Some(record) = records.remove(alias_or_name) {
            return Ok(Some(record));
        }
        Ok(records
            .into_values()
            .find(|r| r.package_name == alias_or_name))
    }

    /// Insert or replace the record for `record.alias`.
    pub async fn upsert(&self, record: InstalledPackageRecord) -> Result<()> {
        let _lock = self.lock_index().await?;
        let mut records = self.load().await?;
        records.insert(record.alias.clone(), record);
        write_json(&self.path(), &records).await
    }

    /// Remove the record for `alias`, returning it if it existed.
    pub async fn remove(&self, alias: &str) -> Result<Option<InstalledPackageRecord>> {
        let _lock = self.lock_index().await?;
        let mut records = self.load().await?;
        let removed = records.remove(alias);
        if removed.is_some() {
            write_json(&self.path(), &records).await?;
        }
        Ok(removed)
    }
}
