//! `install`, `uninstall` and `list`

use std::path::PathBuf;

use ethpm::{
    BlobHostClient, Config, ContentClient, InstallRequest, Installer, RemoteSource, Resolver,
    render_tree, resolve_target,
};
use ethpm_chain::JsonRpcClient;
use ethpm_common::{Release, TransportError};
use ethpm_store::{FileContentStore, PackageIndex, RegistryStore};

use crate::cli::{EthpmDirArgs, InstallArgs, UninstallArgs};
use crate::with_rpc;

pub(crate) type Http = reqwest::Client;
pub(crate) type CliContent = ContentClient<RemoteSource<Http>, FileContentStore>;
type CliInstaller = Installer<RemoteSource<Http>, FileContentStore, JsonRpcClient<Http>, Http>;

pub(crate) fn http_client(config: &Config) -> ethpm::Result<Http> {
    let http = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(concat!("ethpm/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(TransportError::from)?;
    Ok(http)
}

/// Content client mirroring into `dir`.
pub(crate) fn content_client(http: &Http, config: &Config, dir: PathBuf) -> CliContent {
    ContentClient::new(
        RemoteSource::from_config(http.clone(), config),
        FileContentStore::new(dir),
        config,
    )
}

fn installer(config: &Config) -> ethpm::Result<CliInstaller> {
    let http = http_client(config)?;
    let content = content_client(&http, config, config.content_dir());
    let chain = config
        .rpc
        .clone()
        .map(|rpc| JsonRpcClient::with_http(http.clone(), rpc));
    let blobs = BlobHostClient::new(http, config);
    let resolver = Resolver::new(content, chain, Some(blobs), config);
    Ok(Installer::new(
        resolver,
        PackageIndex::open(&config.packages_dir),
        config.workers,
    ))
}

fn with_dir(mut config: Config, dir: EthpmDirArgs) -> Config {
    if let Some(dir) = dir.ethpm_dir {
        config.packages_dir = dir;
    }
    config
}

pub(crate) async fn install(args: InstallArgs, config: Config) -> miette::Result<()> {
    let mut config = with_rpc(with_dir(config, args.dir), args.rpc.as_deref())?;
    config.use_local_node |= args.local_content_node;

    let release = match (args.package_name, args.package_version) {
        (Some(package_name), Some(version)) => Some(Release {
            package_name: package_name.into(),
            version: version.into(),
        }),
        _ => None,
    };
    let registries = RegistryStore::open(config.registry_store_path());
    let uri = resolve_target(&registries, &args.uri, release).await?;

    let request = InstallRequest::new()
        .uri(uri)
        .maybe_alias(args.alias)
        .force(args.force)
        .build();
    let record = installer(&config)?.install(request).await?;
    tracing::info!(
        "{} package sourced from {} installed to {}",
        record.alias,
        args.uri,
        config.packages_dir.display()
    );
    Ok(())
}

pub(crate) async fn uninstall(args: UninstallArgs, config: Config) -> miette::Result<()> {
    let config = with_dir(config, args.dir);
    let record = installer(&config)?.uninstall(&args.package).await?;
    tracing::info!(
        "{} ({}=={}) removed from {}",
        record.alias,
        record.package_name,
        record.version,
        config.packages_dir.display()
    );
    Ok(())
}

pub(crate) async fn list(args: EthpmDirArgs, config: Config) -> miette::Result<()> {
    let config = with_dir(config, args);
    let records = installer(&config)?.list().await?;
    if records.is_empty() {
        tracing::info!("no packages installed in {}", config.packages_dir.display());
    }
    for record in &records {
        print!("{}", render_tree(record));
    }
    Ok(())
}
