//! Filesystem helpers: crash-safe writes, JSON documents and advisory locks

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};

/// Replace `path` with `bytes` so that readers see either the old or the new
/// contents, never a mix.
///
/// Writes a sibling temp file, syncs it, renames over the target and then
/// syncs the directory so the rename itself is durable.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(e, parent))?;
    }
    let tmp = tmp_path(path);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(e, &tmp))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StoreError::io(e, &tmp))?;
    file.sync_all().await.map_err(|e| StoreError::io(e, &tmp))?;
    drop(file);
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(e, path));
    }
    sync_parent(path).await
}

#[cfg(unix)]
async fn sync_parent(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let handle = tokio::fs::File::open(dir)
        .await
        .map_err(|e| StoreError::io(e, dir))?;
    handle.sync_all().await.map_err(|e| StoreError::io(e, dir))
}

// directories cannot be opened as files here
#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// unique per process and per call
fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}

/// Read a JSON document, returning `None` if the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::serialization(e, path)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(e, path)),
    }
}

/// Atomically replace `path` with the pretty-printed JSON of `value`.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let buf = serde_json::to_vec_pretty(value).map_err(|e| StoreError::serialization(e, path))?;
    write_atomic(path, &buf).await
}

/// An exclusive advisory lock on a file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Take the lock or fail immediately with [`StoreErrorKind::Locked`].
    ///
    /// [`StoreErrorKind::Locked`]: crate::error::StoreErrorKind::Locked
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(StoreError::locked(&path))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(StoreError::locked(&path)),
            Err(e) => Err(StoreError::io(e, &path)),
        }
    }

    /// Wait for the lock without blocking the async runtime.
    pub async fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let join_path = path.clone();
        tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&path)?;
            file.lock_exclusive().map_err(|e| StoreError::io(e, &path))?;
            Ok(Self { file, path })
        })
        .await
        .map_err(|e| {
            StoreError::io(std::io::Error::other(e), &join_path).with_help("lock task was cancelled")
        })?
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(e, parent))?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| StoreError::io(e, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorKind;

    #[tokio::test]
    async fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");

        // no temp files left behind
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn parent_directory_is_synced() {
        let dir = tempfile::tempdir().unwrap();
        sync_parent(&dir.path().join("doc.json")).await.unwrap();
        sync_parent(Path::new("doc.json")).await.unwrap();
        let err = sync_parent(&dir.path().join("gone").join("doc.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Io);
    }

    #[tokio::test]
    async fn missing_json_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<u32>> = read_json(&dir.path().join("absent")).await.unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn second_lock_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.lock");
        let held = FileLock::try_acquire(&path).unwrap();
        let err = FileLock::try_acquire(&path).unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Locked);
        drop(held);
        assert!(FileLock::try_acquire(&path).is_ok());
    }
}
