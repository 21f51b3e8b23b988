//! The `ethpm` command-line tool
//!
//! [`cli`] holds the clap command surface; [`run`] executes a parsed
//! command against a [`Config`]. Every command reports its outcome through
//! `tracing` and returns a [`miette::Result`], which [`exit_code`] maps to
//! the process exit status.

pub mod auth;
pub mod cli;
pub mod create;
mod packages;
mod registry;
mod scrape;

use ethpm::{Config, Error, ErrorKind};
use tracing_subscriber::EnvFilter;
use url::Url;

pub use cli::{Cli, Command};

/// A command that needs a transaction-signing or interactive collaborator
/// this tool does not ship.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("`ethpm {command}` requires {collaborator}, which this build does not include")]
#[diagnostic(
    code(ethpm::cli::collaborator_missing),
    help("use a wallet or deployment tool that can sign transactions for this step")
)]
pub struct CollaboratorMissing {
    command: &'static str,
    collaborator: &'static str,
}

/// Run `command` with `config`.
pub async fn run(command: Command, config: Config) -> miette::Result<()> {
    match command {
        Command::Install(args) => packages::install(args, config).await,
        Command::Uninstall(args) => packages::uninstall(args, config).await,
        Command::List(args) => packages::list(args, config).await,
        Command::Scrape(args) => scrape::scrape(args, config).await,
        Command::Registry(cmd) => registry::run(cmd, config).await,
        Command::Release(args) => auth::release(args, config).await,
        Command::Auth(args) => auth::auth(args, config).await,
        Command::Create(cmd) => create::run(cmd).await,
    }
}

/// Process exit status for a failed command.
///
/// 2 for invalid input (including unsupported URIs), 3 for a missing or
/// invalid keyfile, 1 for everything else.
pub fn exit_code(report: &miette::Report) -> u8 {
    match report.downcast_ref::<Error>().map(Error::kind) {
        Some(kind) if kind.is_validation() => 2,
        Some(ErrorKind::Authorization) => 3,
        _ => 1,
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`, or `debug` with
/// `--verbose`).
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

/// Override the configured RPC endpoint with a `--rpc` flag.
fn with_rpc(mut config: Config, rpc: Option<&str>) -> ethpm::Result<Config> {
    if let Some(rpc) = rpc {
        let url = Url::parse(rpc)
            .map_err(|e| Error::validation(format!("invalid --rpc URL {rpc:?}: {e}")))?;
        config.rpc = Some(url);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let report = miette::Report::new(Error::validation("bad alias"));
        assert_eq!(exit_code(&report), 2);
        let report = miette::Report::new(Error::from(
            ethpm_common::Uri::parse("bzz://abc").unwrap_err(),
        ));
        assert_eq!(exit_code(&report), 2);
        let report = miette::Report::new(Error::authorization("no keyfile"));
        assert_eq!(exit_code(&report), 3);
        let report = miette::Report::new(Error::install("disk full"));
        assert_eq!(exit_code(&report), 1);
        let report = miette::Report::new(CollaboratorMissing {
            command: "release",
            collaborator: "a transaction signer",
        });
        assert_eq!(exit_code(&report), 1);
    }

    #[test]
    fn rpc_flag_overrides_config() {
        let config = Config::new().root("/tmp/ethpm").build();
        let config = with_rpc(config, Some("http://127.0.0.1:8545")).unwrap();
        assert_eq!(config.rpc.unwrap().as_str(), "http://127.0.0.1:8545/");
        let config = Config::new().root("/tmp/ethpm").build();
        let err = with_rpc(config, Some("not a url")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
