//! `scrape`

use ethpm::{Config, Error, Scraper};
use ethpm_chain::JsonRpcClient;
use ethpm_common::Address;
use ethpm_store::ChainDataStore;

use crate::cli::ScrapeArgs;
use crate::packages::{content_client, http_client};
use crate::with_rpc;

pub(crate) async fn scrape(args: ScrapeArgs, config: Config) -> miette::Result<()> {
    let config = with_rpc(config, args.rpc.as_deref())?;
    let rpc = config.rpc.clone().ok_or_else(|| {
        Error::validation("scrape needs a JSON-RPC endpoint")
            .with_help("pass --rpc <url> or set `rpc` in config.kdl")
    })?;
    let registry = args
        .registry
        .as_deref()
        .map(Address::parse)
        .transpose()
        .map_err(|e| Error::validation(format!("invalid --registry: {e}")))?;

    let http = http_client(&config)?;
    let content_dir = args.content_dir.unwrap_or_else(|| config.content_dir());
    let content = content_client(&http, &config, content_dir);
    let checkpoints =
        ChainDataStore::open(config.chain_data_dir()).with_genesis_offset(config.genesis_offset);
    let chain = JsonRpcClient::with_http(http, rpc);
    let mut scraper = Scraper::new(chain, content, checkpoints, &config);
    if let Some(registry) = registry {
        scraper = scraper.with_registry(registry);
    }
    if let Some(chain_id) = args.chain_id {
        scraper = scraper.with_expected_chain_id(chain_id);
    }

    tracing::info!("Loading content scraper...");
    let report = scraper.run(args.start_block).await?;
    for release in &report.releases {
        tracing::info!(
            block = release.block_number,
            "{}=={} released at {}",
            release.package_name,
            release.version,
            release.manifest_uri
        );
    }
    let hash = report
        .block_hash
        .map(|h| h.short())
        .unwrap_or_else(|| "hash unavailable".to_owned());
    tracing::info!(
        chain_id = report.chain_id,
        releases = report.releases.len(),
        mirrored = report.mirrored.len(),
        "All blocks scraped up to # {}: {}.",
        report.last_scraped_block,
        hash
    );
    if let Some(h) = report.block_hash {
        tracing::debug!("All blocks scraped up to # {}: {h}.", report.last_scraped_block);
    }
    Ok(())
}
