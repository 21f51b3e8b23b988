//! Registry event scraper
//!
//! One call to [`Scraper::run`] is one poll cycle: it reads the chain's
//! checkpoint, walks the blocks between it and the chain head in batches of
//! at most `batch_span` blocks, mirrors the content behind every
//! `VersionRelease` event in the batch and then advances the checkpoint to
//! the end of the batch.
//!
//! The checkpoint only moves once every mirror write of its batch has
//! completed. A batch that fails leaves the checkpoint where it was, so the
//! next run repeats that batch; content already mirrored by the failed
//! attempt is found in the local store and is not fetched again.

use std::collections::BTreeSet;
use std::fmt;

use ethpm_chain::{ChainClient, H256, LogFilter, VersionRelease, version_release_topic};
use ethpm_common::{Address, ChainId, ContentAddress, Manifest, Uri};
use ethpm_store::{ChainCheckpoint, ChainDataStore, ContentStore, StoreErrorKind};
use futures::{StreamExt, TryStreamExt, stream};

use crate::config::{Config, RetryPolicy};
use crate::content::{ContentClient, ContentSource};
use crate::error::{Error, ErrorKind, Result};
use crate::retry::{with_retry, with_timeout};

/// Where a poll cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    /// Nothing to do, or finished
    Idle,
    /// Querying logs for a batch
    FetchingRange,
    /// Decoding events
    Extracting,
    /// Fetching content into the local store
    Mirroring,
    /// Persisting the new checkpoint
    Checkpointing,
    /// Gave up; the checkpoint is at its last consistent value
    Error,
}

impl fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrapeState::Idle => "idle",
            ScrapeState::FetchingRange => "fetching-range",
            ScrapeState::Extracting => "extracting",
            ScrapeState::Mirroring => "mirroring",
            ScrapeState::Checkpointing => "checkpointing",
            ScrapeState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeReport {
    /// Chain that was scraped
    pub chain_id: ChainId,
    /// First block examined, or `None` if there was nothing to scrape
    pub from_block: Option<u64>,
    /// Checkpoint after the run
    pub last_scraped_block: u64,
    /// Hash of `last_scraped_block`, if the node reported one
    pub block_hash: Option<H256>,
    /// Releases seen, in block order
    pub releases: Vec<VersionRelease>,
    /// Content addresses newly mirrored by this run
    pub mirrored: BTreeSet<ContentAddress>,
}

/// Scrapes one chain into a content store.
pub struct Scraper<S, C, K> {
    chain: K,
    content: ContentClient<S, C>,
    checkpoints: ChainDataStore,
    registry: Option<Address>,
    expected_chain_id: Option<ChainId>,
    batch_span: u64,
    workers: usize,
    retry: RetryPolicy,
    timeout: std::time::Duration,
}

impl<S, C, K> Scraper<S, C, K>
where
    S: ContentSource + Send + Sync,
    C: ContentStore + Send + Sync,
    K: ChainClient + Send + Sync,
{
    /// Scraper for whatever chain `chain` serves, with batch span, worker
    /// limit, retry and timeout from `config`.
    pub fn new(
        chain: K,
        content: ContentClient<S, C>,
        checkpoints: ChainDataStore,
        config: &Config,
    ) -> Self {
        Self {
            chain,
            content,
            checkpoints,
            registry: None,
            expected_chain_id: None,
            batch_span: config.batch_span.max(1),
            workers: config.workers.max(1),
            retry: config.retry,
            timeout: config.timeout,
        }
    }

    /// Only follow events emitted by `registry`.
    pub fn with_registry(mut self, registry: Address) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Refuse to run unless the node serves `chain_id`.
    pub fn with_expected_chain_id(mut self, chain_id: ChainId) -> Self {
        self.expected_chain_id = Some(chain_id);
        self
    }

    /// Run one poll cycle up to the current head.
    ///
    /// Blocks below `start_block` are skipped on a chain's first run;
    /// afterwards the checkpoint decides where to resume, and a
    /// `start_block` past the resume point is rejected.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run(&self, start_block: Option<u64>) -> Result<ScrapeReport> {
        let chain_id = self.call("eth_chainId", || self.chain.chain_id()).await?;
        if let Some(expected) = self.expected_chain_id {
            if expected != chain_id {
                return Err(Error::validation(format!(
                    "RPC endpoint serves chain {chain_id}, not chain {expected}"
                )));
            }
        }

        let _lock = self.checkpoints.lock(chain_id).map_err(|e| match e.kind() {
            StoreErrorKind::Locked => Error::scrape(format!(
                "another scrape of chain {chain_id} is running"
            ))
            .with_help("scrapes of one chain are serialized; wait for the other to finish"),
            _ => Error::from(e),
        })?;

        let mut checkpoint = self.checkpoints.get(chain_id).await?;
        let head = self.call("eth_blockNumber", || self.chain.block_number()).await?;
        let from = self.first_block(&checkpoint, start_block)?;

        let mut state = ScrapeState::Idle;
        let mut report = ScrapeReport {
            chain_id,
            from_block: None,
            last_scraped_block: checkpoint.last_scraped_block,
            block_hash: None,
            releases: Vec::new(),
            mirrored: BTreeSet::new(),
        };

        if from > head {
            tracing::debug!(
                chain_id,
                head,
                checkpoint = checkpoint.last_scraped_block,
                "nothing to scrape"
            );
        } else {
            report.from_block = Some(from);
            let mut batch_start = from;
            while batch_start <= head {
                let batch_end = batch_start.saturating_add(self.batch_span - 1).min(head);
                let batch = self
                    .scrape_batch(
                        chain_id,
                        batch_start,
                        batch_end,
                        &mut checkpoint,
                        &mut state,
                        &mut report,
                    )
                    .await;
                if let Err(e) = batch {
                    transition(&mut state, ScrapeState::Error);
                    tracing::warn!(
                        chain_id,
                        from = batch_start,
                        to = batch_end,
                        checkpoint = checkpoint.last_scraped_block,
                        error = %e,
                        "batch failed; checkpoint left in place"
                    );
                    let transient = e.is_transient();
                    return Err(Error::new(ErrorKind::Scrape, Some(Box::new(e)))
                        .with_context(format!(
                            "blocks {batch_start}..={batch_end} of chain {chain_id}"
                        ))
                        .transient(transient));
                }
                batch_start = batch_end + 1;
            }
        }
        transition(&mut state, ScrapeState::Idle);

        report.last_scraped_block = checkpoint.last_scraped_block;
        let last = report.last_scraped_block;
        report.block_hash = match self
            .call("eth_getBlockByNumber", || self.chain.block_hash(last))
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                tracing::debug!(error = %e, "no block hash for report");
                None
            }
        };
        Ok(report)
    }

    /// First block of this run: the checkpoint's successor, or `start_block`
    /// if the chain has never been scraped.
    fn first_block(&self, checkpoint: &ChainCheckpoint, start_block: Option<u64>) -> Result<u64> {
        let resume = checkpoint.last_scraped_block.saturating_add(1);
        let fresh = *checkpoint
            == ChainCheckpoint::zero(checkpoint.chain_id, self.checkpoints.genesis_offset());
        match start_block {
            Some(start) if fresh => Ok(start.max(resume)),
            Some(start) if start > resume => Err(Error::validation(format!(
                "chain {} is scraped up to block {}; starting at block {start} would skip \
                 blocks {resume}..{start}",
                checkpoint.chain_id, checkpoint.last_scraped_block
            ))
            .with_help("drop --start-block to resume from the checkpoint")),
            _ => Ok(resume),
        }
    }

    async fn scrape_batch(
        &self,
        chain_id: ChainId,
        from: u64,
        to: u64,
        checkpoint: &mut ChainCheckpoint,
        state: &mut ScrapeState,
        report: &mut ScrapeReport,
    ) -> Result<()> {
        transition(state, ScrapeState::FetchingRange);
        let filter = LogFilter {
            address: self.registry,
            topic0: Some(version_release_topic()),
            from_block: from,
            to_block: to,
        };
        let logs = self.call("eth_getLogs", || self.chain.get_logs(&filter)).await?;

        transition(state, ScrapeState::Extracting);
        let mut releases = Vec::with_capacity(logs.len());
        let mut manifests = Vec::new();
        for log in &logs {
            let release = match VersionRelease::from_log(log) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(block = log.block_number, index = log.log_index, error = %e, "skipping undecodable log");
                    continue;
                }
            };
            match Uri::parse(&release.manifest_uri) {
                Ok(Uri::Content(c)) => manifests.push(c.address),
                Ok(other) => tracing::warn!(
                    package = %release.package_name,
                    version = %release.version,
                    uri = %other,
                    "release manifest is not content-addressed; not mirrored"
                ),
                Err(e) => tracing::warn!(
                    package = %release.package_name,
                    version = %release.version,
                    error = %e,
                    "release has an unsupported manifest URI"
                ),
            }
            releases.push(release);
        }

        transition(state, ScrapeState::Mirroring);
        let mirrored = self.mirror(manifests, &checkpoint.mirrored).await?;

        transition(state, ScrapeState::Checkpointing);
        *checkpoint = self
            .checkpoints
            .advance(chain_id, to, mirrored.iter().copied())
            .await?;
        tracing::info!(
            chain_id,
            from,
            to,
            releases = releases.len(),
            mirrored = mirrored.len(),
            "scraped blocks {from}..={to}"
        );
        report.releases.extend(releases);
        report.mirrored.extend(mirrored);
        Ok(())
    }

    /// Mirror `manifests` and everything they reference, skipping `known`.
    /// Returns once every fetch has finished.
    async fn mirror(
        &self,
        manifests: Vec<ContentAddress>,
        known: &BTreeSet<ContentAddress>,
    ) -> Result<BTreeSet<ContentAddress>> {
        let mut mirrored = BTreeSet::new();
        let mut frontier: Vec<(ContentAddress, bool)> =
            manifests.into_iter().map(|a| (a, true)).collect();

        while !frontier.is_empty() {
            frontier.retain(|(a, _)| !known.contains(a) && !mirrored.contains(a));
            // a manifest reference wins over a source reference to the same bytes
            frontier.sort_by_key(|(a, is_manifest)| (*a, !*is_manifest));
            frontier.dedup_by_key(|(a, _)| *a);
            mirrored.extend(frontier.iter().map(|(a, _)| *a));

            let fetched: Vec<Vec<(ContentAddress, bool)>> = stream::iter(frontier.drain(..))
                .map(|(address, is_manifest)| async move {
                    let bytes = self.content.fetch(&address).await?;
                    Ok::<_, Error>(if is_manifest {
                        references(&address, &bytes)
                    } else {
                        Vec::new()
                    })
                })
                .buffer_unordered(self.workers)
                .try_collect()
                .await?;
            frontier = fetched.into_iter().flatten().collect();
        }
        Ok(mirrored)
    }

    async fn call<T, F, Fut>(&self, what: &'static str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ethpm_chain::Result<T>>,
    {
        with_retry(&self.retry, what, || {
            let fut = f();
            with_timeout(self.timeout, async move { Ok(fut.await?) })
        })
        .await
    }
}

/// Content-scheme sources (leaves) and dependencies (manifests) of a
/// mirrored manifest. Anything that does not parse is mirrored as-is.
fn references(address: &ContentAddress, bytes: &[u8]) -> Vec<(ContentAddress, bool)> {
    let manifest = match Manifest::from_slice(bytes) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%address, error = %e, "mirrored manifest does not parse");
            return Vec::new();
        }
    };
    let mut out = Vec::new();
    for value in manifest.sources.values() {
        if let Ok(Uri::Content(c)) = Uri::parse(value.trim()) {
            out.push((c.address, false));
        }
    }
    for value in manifest.build_dependencies.values() {
        if let Ok(Uri::Content(c)) = Uri::parse(value) {
            out.push((c.address, true));
        }
    }
    out
}

fn transition(state: &mut ScrapeState, next: ScrapeState) {
    if *state != next {
        tracing::debug!(from = %state, to = %next, "scrape state");
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_split_sources_and_dependencies() {
        let source = ContentAddress::compute(b"contract Owned {}").unwrap();
        let dep = ContentAddress::compute(b"{}").unwrap();
        let manifest = serde_json::json!({
            "manifest_version": "2",
            "package_name": "owned",
            "version": "1.0.0",
            "sources": {
                "./Owned.sol": format!("ipfs://{source}"),
                "./Inline.sol": "contract Inline {}",
            },
            "build_dependencies": { "dep": format!("ipfs://{dep}") },
        });
        let bytes = serde_json::to_vec(&manifest).unwrap();
        let address = ContentAddress::compute(&bytes).unwrap();
        let mut refs = references(&address, &bytes);
        refs.sort();
        let mut expected = vec![(source, false), (dep, true)];
        expected.sort();
        assert_eq!(refs, expected);
        assert!(references(&address, b"not json").is_empty());
    }

    #[test]
    fn transitions_log_once() {
        let mut state = ScrapeState::Idle;
        transition(&mut state, ScrapeState::FetchingRange);
        transition(&mut state, ScrapeState::FetchingRange);
        assert_eq!(state, ScrapeState::FetchingRange);
        assert_eq!(ScrapeState::Checkpointing.to_string(), "checkpointing");
    }
}
