//! Registry store: local aliases for on-chain registries
//!
//! Persisted as one JSON document. Every mutation is a locked
//! read-modify-write followed by an atomic replace, so readers never see a
//! state with zero or several active entries once any entry exists.

use std::fmt;
use std::path::{Path, PathBuf};

use ethpm_common::types::is_valid_alias;
use ethpm_common::{RegistryId, RegistryUri};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{Result, StoreError};
use crate::fs::{FileLock, read_json, write_json};

/// One registry known to the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStoreEntry {
    /// Registry URI without any release part
    pub uri: RegistryUri,
    /// Optional local alias, unique within the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<SmolStr>,
    /// Whether this is the active registry
    pub active: bool,
}

impl RegistryStoreEntry {
    /// Chain id and address of the registry.
    pub fn id(&self) -> RegistryId {
        self.uri.registry
    }
}

/// How a caller names a registry in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRef {
    /// By local alias
    Alias(SmolStr),
    /// By chain id and address
    Id(RegistryId),
}

impl fmt::Display for RegistryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryRef::Alias(a) => f.write_str(a),
            RegistryRef::Id(id) => write!(f, "{}", RegistryUri::new(*id)),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryTable {
    entries: Vec<RegistryStoreEntry>,
}

impl RegistryTable {
    fn find(&self, r: &RegistryRef) -> Option<usize> {
        self.entries.iter().position(|e| match r {
            RegistryRef::Alias(alias) => e.alias.as_deref() == Some(alias.as_str()),
            RegistryRef::Id(id) => e.id() == *id,
        })
    }
}

/// Handle to the persisted registry table.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    /// Open the store at `path`. The file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    async fn load(&self) -> Result<RegistryTable> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    /// All entries, in insertion order.
    pub async fn list(&self) -> Result<Vec<RegistryStoreEntry>> {
        Ok(self.load().await?.entries)
    }

    /// The active entry, if any registry has been added.
    pub async fn active(&self) -> Result<Option<RegistryStoreEntry>> {
        Ok(self.load().await?.entries.into_iter().find(|e| e.active))
    }

    /// Look up an entry by alias or identity.
    pub async fn get(&self, r: &RegistryRef) -> Result<Option<RegistryStoreEntry>> {
        let table = self.load().await?;
        Ok(table.find(r).map(|i| table.entries[i].clone()))
    }

    /// Add a registry. The first registry added becomes active.
    ///
    /// Fails with `InvalidInput` for a malformed alias and with
    /// `AlreadyExists` if the registry or the alias is already present.
    #[tracing::instrument(level = "debug", skip(self, uri), fields(uri = %uri))]
    pub async fn add(&self, uri: &RegistryUri, alias: Option<&str>) -> Result<RegistryStoreEntry> {
        if let Some(alias) = alias.filter(|a| !is_valid_alias(a)) {
            return Err(StoreError::invalid_input(format!("invalid registry alias {alias:?}"))
                .with_help("aliases start with a letter and contain only letters, digits, - and _"));
        }
        let _lock = FileLock::acquire(self.lock_path()).await?;
        let mut table = self.load().await?;

        if table.find(&RegistryRef::Id(uri.registry)).is_some() {
            return Err(StoreError::already_exists("registry", uri.bare()));
        }
        if let Some(alias) = alias {
            if table.find(&RegistryRef::Alias(alias.into())).is_some() {
                return Err(StoreError::already_exists("registry alias", alias)
                    .with_help("choose a different --alias"));
            }
        }

        let entry = RegistryStoreEntry {
            uri: uri.bare(),
            alias: alias.map(SmolStr::from),
            active: table.entries.is_empty(),
        };
        table.entries.push(entry.clone());
        write_json(&self.path, &table).await?;
        tracing::debug!(active = entry.active, "registry added");
        Ok(entry)
    }

    /// Make the named registry the only active one.
    #[tracing::instrument(level = "debug", skip(self, r), fields(registry = %r))]
    pub async fn activate(&self, r: &RegistryRef) -> Result<RegistryStoreEntry> {
        let _lock = FileLock::acquire(self.lock_path()).await?;
        let mut table = self.load().await?;
        let index = table
            .find(r)
            .ok_or_else(|| StoreError::not_found("registry", r))?;
        for (i, entry) in table.entries.iter_mut().enumerate() {
            entry.active = i == index;
        }
        write_json(&self.path, &table).await?;
        Ok(table.entries[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreErrorKind;

    fn uri(s: &str) -> RegistryUri {
        RegistryUri::parse(s).unwrap()
    }

    #[tokio::test]
    async fn first_registry_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("registry-store"));
        store
            .add(&uri("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1"), None)
            .await
            .unwrap();
        let second = store
            .add(
                &uri("erc1319://0xA635F17288187daE5b424D343E21FF44a79ce922:1"),
                Some("other"),
            )
            .await
            .unwrap();
        assert!(!second.active);

        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].active);
        assert_eq!(list[1].alias.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn duplicates_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("registry-store"));
        store
            .add(
                &uri("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1"),
                Some("foo"),
            )
            .await
            .unwrap();

        // same registry, different spelling and release
        let err = store
            .add(
                &uri("erc1319://0x6b5da3ca4286baa7fbaf64eeee1834c7d430b729:1/dai?version=1.0.0"),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::AlreadyExists);

        // different registry, colliding alias
        let err = store
            .add(
                &uri("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:3"),
                Some("foo"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::AlreadyExists);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_alias_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry-store");
        let store = RegistryStore::open(&path);
        for alias in ["1bad", "-dash", "has space", ""] {
            let err = store
                .add(
                    &uri("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1"),
                    Some(alias),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), StoreErrorKind::InvalidInput, "{alias:?}");
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn activate_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("registry-store"));
        let err = store
            .activate(&RegistryRef::Alias("missing".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::NotFound);
    }
}
