//! Content-addressed byte storage
//!
//! The local mirror that both the installer and the scraper write into.
//! Every write is keyed by the address the bytes hash to, so concurrent
//! writers of the same content are harmless and a second write is a no-op.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use ethpm_common::ContentAddress;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::fs::write_atomic;

/// Async content storage trait
///
/// Implementations must only ever hand out bytes that hash to the address
/// they were requested under.
#[trait_variant::make(Send)]
pub trait ContentStore: Clone {
    /// Get the bytes stored under `address`
    ///
    /// Returns `None` if nothing is stored there.
    async fn get(&self, address: &ContentAddress) -> Result<Option<Bytes>>;

    /// Store `data` under its computed CIDv0 address and return the address.
    ///
    /// Storing the same bytes twice writes once.
    async fn put(&self, data: &[u8]) -> Result<ContentAddress>;

    /// Store `data` under an address obtained elsewhere (for example a raw
    /// CIDv1). Fails with an integrity error if the bytes do not match.
    async fn insert(&self, address: &ContentAddress, data: &[u8]) -> Result<()>;

    /// Local existence check; never touches the network.
    async fn has(&self, address: &ContentAddress) -> Result<bool>;
}

/// In-memory content store
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    blocks: Arc<RwLock<BTreeMap<ContentAddress, Bytes>>>,
}

impl MemoryContentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct entries
    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    async fn get(&self, address: &ContentAddress) -> Result<Option<Bytes>> {
        Ok(self.blocks.read().await.get(address).cloned())
    }

    async fn put(&self, data: &[u8]) -> Result<ContentAddress> {
        let address = ContentAddress::compute(data)
            .map_err(|e| StoreError::new(crate::StoreErrorKind::Integrity, Some(Box::new(e))))?;
        self.blocks
            .write()
            .await
            .entry(address)
            .or_insert_with(|| Bytes::copy_from_slice(data));
        Ok(address)
    }

    async fn insert(&self, address: &ContentAddress, data: &[u8]) -> Result<()> {
        if !address.verify(data) {
            return Err(StoreError::integrity(address));
        }
        self.blocks
            .write()
            .await
            .entry(*address)
            .or_insert_with(|| Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn has(&self, address: &ContentAddress) -> Result<bool> {
        Ok(self.blocks.read().await.contains_key(address))
    }
}

/// Directory-backed content store, one file per address
///
/// Files are named by the address string and written atomically. Reads
/// re-verify the bytes so a corrupted mirror entry is reported rather than
/// served.
#[derive(Debug, Clone)]
pub struct FileContentStore {
    dir: PathBuf,
}

impl FileContentStore {
    /// Use `dir` as the mirror directory. Nothing is created until the first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The mirror directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an address is stored at
    pub fn path_of(&self, address: &ContentAddress) -> PathBuf {
        self.dir.join(address.to_string())
    }

    /// Addresses currently present in the mirror
    pub async fn list(&self) -> Result<Vec<ContentAddress>> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(StoreError::io(e, &self.dir)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(e, &self.dir))?
        {
            if let Some(address) = entry
                .file_name()
                .to_str()
                .and_then(|name| ContentAddress::parse(name).ok())
            {
                out.push(address);
            }
        }
        out.sort();
        Ok(out)
    }

    async fn write_once(&self, address: &ContentAddress, data: &[u8]) -> Result<()> {
        let path = self.path_of(address);
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(e, &path))?
        {
            return Ok(());
        }
        write_atomic(&path, data).await?;
        tracing::trace!(%address, bytes = data.len(), "content mirrored");
        Ok(())
    }
}

impl ContentStore for FileContentStore {
    async fn get(&self, address: &ContentAddress) -> Result<Option<Bytes>> {
        let path = self.path_of(address);
        match tokio::fs::read(&path).await {
            Ok(bytes) if address.verify(&bytes) => Ok(Some(Bytes::from(bytes))),
            Ok(_) => Err(StoreError::integrity(address)
                .with_help(format!("delete {} and fetch it again", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(e, &path)),
        }
    }

    async fn put(&self, data: &[u8]) -> Result<ContentAddress> {
        let address = ContentAddress::compute(data)
            .map_err(|e| StoreError::new(crate::StoreErrorKind::Integrity, Some(Box::new(e))))?;
        self.write_once(&address, data).await?;
        Ok(address)
    }

    async fn insert(&self, address: &ContentAddress, data: &[u8]) -> Result<()> {
        if !address.verify(data) {
            return Err(StoreError::integrity(address));
        }
        self.write_once(address, data).await
    }

    async fn has(&self, address: &ContentAddress) -> Result<bool> {
        let path = self.path_of(address);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(e, &path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreErrorKind;

    #[tokio::test]
    async fn memory_put_is_idempotent() {
        let store = MemoryContentStore::new();
        let a = store.put(b"pragma solidity ^0.5.0;").await.unwrap();
        let b = store.put(b"pragma solidity ^0.5.0;").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get(&a).await.unwrap().unwrap().as_ref(),
            b"pragma solidity ^0.5.0;"
        );
    }

    #[tokio::test]
    async fn insert_rejects_mismatched_bytes() {
        let store = MemoryContentStore::new();
        let address = ContentAddress::compute(b"expected").unwrap();
        let err = store.insert(&address, b"tampered").await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Integrity);
        assert!(!store.has(&address).await.unwrap());
    }

    #[tokio::test]
    async fn file_store_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContentStore::new(dir.path().join("content"));
        assert!(store.list().await.unwrap().is_empty());

        let address = store.put(b"contract Owned {}").await.unwrap();
        store.put(b"contract Owned {}").await.unwrap();
        assert!(store.has(&address).await.unwrap());
        assert_eq!(store.list().await.unwrap(), vec![address]);
        assert_eq!(
            store.get(&address).await.unwrap().unwrap().as_ref(),
            b"contract Owned {}"
        );
    }

    #[tokio::test]
    async fn file_store_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContentStore::new(dir.path());
        let address = store.put(b"original").await.unwrap();
        std::fs::write(store.path_of(&address), b"corrupted").unwrap();
        let err = store.get(&address).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Integrity);
    }
}
