//! Installer
//!
//! An install runs in three phases:
//!
//! 1. validate the request (alias, packages dir) without touching anything;
//! 2. resolve the manifest and, depth-first, every build dependency,
//!    refusing cross-registry dependencies before they are fetched;
//! 3. materialize the tree into a staging directory inside the packages dir,
//!    rename it into place and record it in the index.
//!
//! Until the final rename the alias directory is untouched, and the index is
//! written last, so a failed or cancelled install leaves nothing registered.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bon::Builder;
use bytes::Bytes;
use ethpm_chain::ChainClient;
use ethpm_common::http_client::HttpClient;
use ethpm_common::manifest::Source;
use ethpm_common::{ContentAddress, TransportError, Uri};
use ethpm_store::{
    ContentStore, InstalledDependency, InstalledPackageRecord, PackageIndex, StoreErrorKind,
};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use smol_str::SmolStr;
use tokio::sync::{Mutex, OnceCell};

use crate::config::PACKAGES_DIR_NAME;
use crate::content::ContentSource;
use crate::error::{Error, ErrorKind, Result};
use crate::resolver::{ResolvedManifest, Resolver};
use crate::validation::{check_dependency_registry, validate_alias, validate_packages_dir};

/// Manifest file name inside an installed package directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Directory holding a package's sources.
pub const SOURCES_DIR: &str = "_src";

/// What to install and under which name.
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct InstallRequest {
    /// Package to install
    pub uri: Uri,
    /// Directory name; defaults to the manifest's package name
    #[builder(into)]
    pub alias: Option<SmolStr>,
    /// Replace an existing install of the same alias
    #[builder(default)]
    pub force: bool,
}

struct PackageNode {
    alias: SmolStr,
    resolved: Arc<ResolvedManifest>,
    dependencies: Vec<PackageNode>,
}

type Memo = Mutex<HashMap<Uri, Arc<OnceCell<Arc<ResolvedManifest>>>>>;

/// Installs packages into one packages directory.
pub struct Installer<S, C, K, H> {
    resolver: Resolver<S, C, K, H>,
    index: PackageIndex,
    workers: usize,
}

impl<S, C, K, H> Installer<S, C, K, H>
where
    S: ContentSource + Send + Sync,
    C: ContentStore + Send + Sync,
    K: ChainClient + Send + Sync,
    H: HttpClient + Send + Sync,
    TransportError: From<H::Error>,
{
    /// Installer writing into `index`'s packages dir, running at most
    /// `workers` fetches per fan-out.
    pub fn new(resolver: Resolver<S, C, K, H>, index: PackageIndex, workers: usize) -> Self {
        Self {
            resolver,
            index,
            workers: workers.max(1),
        }
    }

    /// The installed-package index
    pub fn index(&self) -> &PackageIndex {
        &self.index
    }

    /// Install `request.uri` and its build dependencies.
    #[tracing::instrument(level = "debug", skip(self, request), fields(uri = %request.uri))]
    pub async fn install(&self, request: InstallRequest) -> Result<InstalledPackageRecord> {
        if let Some(alias) = &request.alias {
            validate_alias(alias)?;
        }
        let packages_dir = self.index.packages_dir().to_path_buf();
        validate_packages_dir(&packages_dir)?;
        if let Some(alias) = &request.alias {
            self.ensure_free(alias, request.force).await?;
        }

        let root = Arc::new(self.resolver.resolve(&request.uri).await?);
        check_manifest(&root)?;
        let alias = request
            .alias
            .clone()
            .unwrap_or_else(|| root.manifest.package_name.clone());
        validate_alias(&alias)?;

        let memo = Memo::default();
        let dependencies = self
            .resolve_dependencies(root.clone(), vec![root.address], &memo)
            .await?;
        let node = PackageNode {
            alias: alias.clone(),
            resolved: root,
            dependencies,
        };

        tokio::fs::create_dir_all(&packages_dir)
            .await
            .map_err(|e| io_error(e, &packages_dir))?;
        let _lock = self.index.lock_alias(&alias).map_err(|e| match e.kind() {
            StoreErrorKind::Locked => Error::install(format!(
                "another install of {alias} is in progress"
            )),
            _ => Error::from(e),
        })?;
        self.ensure_free(&alias, request.force).await?;

        let fetched = self.fetch_sources(&node).await?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&packages_dir)
            .map_err(|e| io_error(e, &packages_dir))?;
        let (dependencies, materialized) =
            materialize(&node, staging.path().to_path_buf(), &fetched).await?;

        let record = InstalledPackageRecord {
            alias: alias.clone(),
            install_uri: node.resolved.install_uri.clone(),
            resolved_uri: node.resolved.resolved_uri.clone(),
            manifest_address: node.resolved.address,
            package_name: node.resolved.manifest.package_name.clone(),
            version: node.resolved.manifest.version.clone(),
            registry: node.resolved.registry.clone(),
            materialized,
            dependencies,
        };

        let target = packages_dir.join(alias.as_str());
        let displaced = Displaced::take(&target, &packages_dir).await?;
        let staged = staging.keep();
        if let Err(e) = tokio::fs::rename(&staged, &target).await {
            let _ = tokio::fs::remove_dir_all(&staged).await;
            displaced.restore(&target).await;
            return Err(io_error(e, &target));
        }
        if let Err(e) = self.index.upsert(record.clone()).await {
            let _ = tokio::fs::remove_dir_all(&target).await;
            displaced.restore(&target).await;
            return Err(e.into());
        }
        displaced.discard().await;

        tracing::info!(
            alias = %record.alias,
            package = %record.package_name,
            version = %record.version,
            "installed {} to {}",
            record.install_uri,
            target.display()
        );
        Ok(record)
    }

    /// Remove an installed package, found by alias or package name.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn uninstall(&self, alias_or_name: &str) -> Result<InstalledPackageRecord> {
        let record = self.index.find(alias_or_name).await?.ok_or_else(|| {
            Error::validation(format!("no installed package named {alias_or_name}"))
                .with_help("see `ethpm list` for installed packages")
        })?;
        let _lock = self.index.lock_alias(&record.alias).map_err(|e| match e.kind() {
            StoreErrorKind::Locked => {
                Error::install(format!("{} is being installed", record.alias))
            }
            _ => Error::from(e),
        })?;

        let packages_dir = self.index.packages_dir();
        let target = packages_dir.join(record.alias.as_str());
        let displaced = Displaced::take(&target, packages_dir).await?;
        if let Err(e) = self.index.remove(&record.alias).await {
            displaced.restore(&target).await;
            return Err(e.into());
        }
        displaced.discard().await;
        tracing::info!(alias = %record.alias, "uninstalled");
        Ok(record)
    }

    /// Every installed package.
    pub async fn list(&self) -> Result<Vec<InstalledPackageRecord>> {
        Ok(self.index.list().await?)
    }

    async fn ensure_free(&self, alias: &str, force: bool) -> Result<()> {
        if force {
            return Ok(());
        }
        let installed = self.index.get(alias).await?.is_some();
        if installed || path_exists(&self.index.packages_dir().join(alias)).await? {
            return Err(Error::install(format!("{alias} is already installed"))
                .with_help("uninstall it first, pick another --alias, or pass --force"));
        }
        Ok(())
    }

    async fn resolve_memo(&self, uri: &Uri, memo: &Memo) -> Result<Arc<ResolvedManifest>> {
        let cell = memo.lock().await.entry(uri.clone()).or_default().clone();
        cell.get_or_try_init(|| async {
            let resolved = self.resolver.resolve(uri).await?;
            check_manifest(&resolved)?;
            Ok(Arc::new(resolved))
        })
        .await
        .cloned()
    }

    /// Resolve `parent`'s dependencies depth-first. A dependency whose
    /// manifest is already on the path from the root is skipped.
    fn resolve_dependencies<'s>(
        &'s self,
        parent: Arc<ResolvedManifest>,
        ancestors: Vec<ContentAddress>,
        memo: &'s Memo,
    ) -> BoxFuture<'s, Result<Vec<PackageNode>>> {
        async move {
            let declared = parent.manifest.dependencies()?;
            for (_, uri) in &declared {
                check_dependency_registry(parent.registry.as_ref(), uri)?;
            }

            let resolved: Vec<(SmolStr, Arc<ResolvedManifest>)> = stream::iter(declared)
                .map(|(name, uri)| async move {
                    let resolved = self.resolve_memo(&uri, memo).await?;
                    Ok::<_, Error>((name, resolved))
                })
                .buffered(self.workers)
                .try_collect()
                .await?;

            stream::iter(resolved)
                .filter(|(name, dep)| {
                    let cyclic = ancestors.contains(&dep.address);
                    if cyclic {
                        tracing::debug!(
                            dependency = %name,
                            address = %dep.address,
                            "skipping dependency already being resolved"
                        );
                    }
                    futures::future::ready(!cyclic)
                })
                .map(|(name, dep)| {
                    let mut path = ancestors.clone();
                    path.push(dep.address);
                    async move {
                        let dependencies =
                            self.resolve_dependencies(dep.clone(), path, memo).await?;
                        Ok::<_, Error>(PackageNode {
                            alias: name,
                            resolved: dep,
                            dependencies,
                        })
                    }
                })
                .buffered(self.workers)
                .try_collect()
                .await
        }
        .boxed()
    }

    /// Fetch every distinct source URI in the tree once.
    async fn fetch_sources(&self, root: &PackageNode) -> Result<Fetched> {
        let mut uris = HashSet::new();
        collect_source_uris(root, &mut uris)?;
        stream::iter(uris)
            .map(|uri| async move {
                let fetched = self.resolver.fetch(&uri).await?;
                Ok::<_, Error>((uri, fetched))
            })
            .buffer_unordered(self.workers)
            .try_collect()
            .await
    }
}

type Fetched = HashMap<Uri, (ContentAddress, Bytes)>;

fn collect_source_uris(node: &PackageNode, out: &mut HashSet<Uri>) -> Result<()> {
    for (_, source) in node.resolved.manifest.sources()? {
        if let Source::Uri(uri) = source {
            out.insert(uri);
        }
    }
    for child in &node.dependencies {
        collect_source_uris(child, out)?;
    }
    Ok(())
}

/// Write `node` into `dir`; returns the dependency records and every
/// content address written.
fn materialize<'a>(
    node: &'a PackageNode,
    dir: PathBuf,
    fetched: &'a Fetched,
) -> BoxFuture<'a, Result<(Vec<InstalledDependency>, BTreeSet<ContentAddress>)>> {
    async move {
        let mut materialized = BTreeSet::from([node.resolved.address]);
        write_file(&dir.join(MANIFEST_FILE), &node.resolved.bytes).await?;

        let src_dir = dir.join(SOURCES_DIR);
        for (path, source) in node.resolved.manifest.sources()? {
            let bytes = match source {
                Source::Inline(text) => Bytes::copy_from_slice(text.as_bytes()),
                Source::Uri(uri) => {
                    let (address, bytes) = fetched.get(&uri).ok_or_else(|| {
                        Error::install(format!("source {uri} was not fetched"))
                    })?;
                    materialized.insert(*address);
                    bytes.clone()
                }
            };
            write_file(&src_dir.join(&path), &bytes).await?;
        }

        let deps_dir = dir.join(PACKAGES_DIR_NAME);
        let mut records = Vec::with_capacity(node.dependencies.len());
        for child in &node.dependencies {
            let (dependencies, written) =
                materialize(child, deps_dir.join(child.alias.as_str()), fetched).await?;
            materialized.extend(written);
            records.push(InstalledDependency {
                alias: child.alias.clone(),
                uri: child.resolved.install_uri.clone(),
                manifest_address: child.resolved.address,
                package_name: child.resolved.manifest.package_name.clone(),
                version: child.resolved.manifest.version.clone(),
                dependencies,
            });
        }
        Ok((records, materialized))
    }
    .boxed()
}

/// Reject manifests whose sources or dependency names cannot be laid out
/// on disk, before anything is written.
fn check_manifest(resolved: &ResolvedManifest) -> Result<()> {
    resolved.manifest.sources()?;
    resolved.manifest.dependencies()?;
    Ok(())
}

fn io_error(e: std::io::Error, path: &Path) -> Error {
    Error::new(ErrorKind::Install, Some(Box::new(e))).with_context(format!("{}", path.display()))
}

async fn path_exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| io_error(e, path))
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(e, parent))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| io_error(e, path))
}

/// An existing alias directory moved aside, so it can be put back if the
/// operation replacing or removing it fails.
struct Displaced {
    trash: Option<(tempfile::TempDir, PathBuf)>,
}

impl Displaced {
    async fn take(target: &Path, packages_dir: &Path) -> Result<Self> {
        if !path_exists(target).await? {
            return Ok(Self { trash: None });
        }
        let trash = tempfile::Builder::new()
            .prefix(".trash-")
            .tempdir_in(packages_dir)
            .map_err(|e| io_error(e, packages_dir))?;
        let held = trash.path().join("package");
        tokio::fs::rename(target, &held)
            .await
            .map_err(|e| io_error(e, target))?;
        Ok(Self {
            trash: Some((trash, held)),
        })
    }

    async fn restore(self, target: &Path) {
        if let Some((_trash, held)) = self.trash {
            if let Err(e) = tokio::fs::rename(&held, target).await {
                tracing::error!(path = %target.display(), error = %e, "could not restore previous package tree");
            }
        }
    }

    async fn discard(self) {
        if let Some((trash, _)) = self.trash {
            let path = trash.keep();
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "could not remove old package tree");
            }
        }
    }
}

/// Render a record and its dependency tree, one package per line.
///
/// ```text
/// owned (owned==1.0.0) ipfs://Qm...
/// └── safe-math (safe-math==1.0.0) ipfs://Qm...
/// ```
pub fn render_tree(record: &InstalledPackageRecord) -> String {
    let mut out = format!(
        "{} ({}=={}) {}\n",
        record.alias, record.package_name, record.version, record.install_uri
    );
    render_children(&record.dependencies, "", &mut out);
    out
}

fn render_children(deps: &[InstalledDependency], prefix: &str, out: &mut String) {
    for (i, dep) in deps.iter().enumerate() {
        let last = i + 1 == deps.len();
        let (branch, indent) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        out.push_str(&format!(
            "{prefix}{branch}{} ({}=={}) {}\n",
            dep.alias, dep.package_name, dep.version, dep.uri
        ));
        render_children(&dep.dependencies, &format!("{prefix}{indent}"), out);
    }
}
