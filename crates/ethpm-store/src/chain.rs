//! Per-chain scrape checkpoints

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ethpm_common::{ChainId, ContentAddress};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::fs::{FileLock, read_json, write_json};

/// How far a chain has been scraped and what has been mirrored from it.
///
/// Both fields only ever grow, and they are always persisted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    /// Chain this checkpoint belongs to
    pub chain_id: ChainId,
    /// Highest block whose events are fully mirrored
    pub last_scraped_block: u64,
    /// Content addresses mirrored so far
    #[serde(default)]
    pub mirrored: BTreeSet<ContentAddress>,
}

impl ChainCheckpoint {
    /// A checkpoint that has seen nothing past `genesis_offset`.
    pub fn zero(chain_id: ChainId, genesis_offset: u64) -> Self {
        Self {
            chain_id,
            last_scraped_block: genesis_offset,
            mirrored: BTreeSet::new(),
        }
    }
}

/// Directory of checkpoint files, one per chain id.
///
/// [`advance`](Self::advance) is the only mutator. It replaces the whole
/// checkpoint file atomically, so a crash leaves either the old or the new
/// checkpoint on disk.
#[derive(Debug, Clone)]
pub struct ChainDataStore {
    dir: PathBuf,
    genesis_offset: u64,
}

impl ChainDataStore {
    /// Open the store rooted at `dir` (typically `<root>/chain-data`).
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            genesis_offset: 0,
        }
    }

    /// Block number reported for chains that have never been scraped.
    pub fn with_genesis_offset(mut self, genesis_offset: u64) -> Self {
        self.genesis_offset = genesis_offset;
        self
    }

    /// Block number a never-scraped chain starts from
    pub fn genesis_offset(&self) -> u64 {
        self.genesis_offset
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, chain_id: ChainId) -> PathBuf {
        self.dir.join(chain_id.to_string())
    }

    /// Path of the advisory lock serializing scrapers of `chain_id`.
    pub fn lock_path(&self, chain_id: ChainId) -> PathBuf {
        self.dir.join(format!("{chain_id}.lock"))
    }

    /// Take the per-chain scrape lock, failing fast if another process holds it.
    pub fn lock(&self, chain_id: ChainId) -> Result<FileLock> {
        FileLock::try_acquire(self.lock_path(chain_id))
    }

    /// Current checkpoint, or the zero checkpoint if none is stored.
    pub async fn get(&self, chain_id: ChainId) -> Result<ChainCheckpoint> {
        let path = self.path(chain_id);
        let checkpoint: Option<ChainCheckpoint> = read_json(&path).await?;
        match checkpoint {
            Some(c) if c.chain_id != chain_id => Err(StoreError::conflict(format!(
                "checkpoint file for chain {chain_id} records chain {}",
                c.chain_id
            ))
            .with_context(format!("path: {}", path.display()))),
            Some(c) => Ok(c),
            None => Ok(ChainCheckpoint::zero(chain_id, self.genesis_offset)),
        }
    }

    /// Move the checkpoint to `new_block` and record `new_ids` as mirrored.
    ///
    /// Rejects `new_block` below the current checkpoint and leaves the store
    /// unchanged in that case.
    #[tracing::instrument(level = "debug", skip(self, new_ids))]
    pub async fn advance(
        &self,
        chain_id: ChainId,
        new_block: u64,
        new_ids: impl IntoIterator<Item = ContentAddress>,
    ) -> Result<ChainCheckpoint> {
        let mut checkpoint = self.get(chain_id).await?;
        if new_block < checkpoint.last_scraped_block {
            return Err(StoreError::conflict(format!(
                "cannot move chain {chain_id} checkpoint back from block {} to {new_block}",
                checkpoint.last_scraped_block
            )));
        }
        checkpoint.last_scraped_block = new_block;
        checkpoint.mirrored.extend(new_ids);
        write_json(&self.path(chain_id), &checkpoint).await?;
        Ok(checkpoint)
    }
}
