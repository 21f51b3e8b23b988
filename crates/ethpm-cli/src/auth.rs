//! Keyfile handling for `auth` and `release`
//!
//! The keyfile itself is never decrypted here. `auth` checks that it names
//! an account and keeps a copy at `<root>/_keyfile.json`; signing is left to
//! an external collaborator.

use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use ethpm::validation::validate_alias;
use ethpm::{Config, Error};
use ethpm_common::{Address, Uri};
use ethpm_store::RegistryStore;

use crate::CollaboratorMissing;
use crate::cli::{AuthArgs, ReleaseArgs};

/// Account a keyfile belongs to.
///
/// Keyfiles are JSON documents with an `address` field, written with or
/// without the `0x` prefix.
pub fn keyfile_address(bytes: &[u8]) -> ethpm::Result<Address> {
    let doc: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::authorization(format!("keyfile is not JSON: {e}")))?;
    let raw = doc
        .get("address")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::authorization("keyfile has no `address` field"))?;
    let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
    Address::parse(&format!("0x{hex_part}"))
        .map_err(|e| Error::authorization(format!("keyfile address {raw:?} is invalid: {e}")))
}

/// Account of the keyfile stored under the data root.
pub async fn stored_address(config: &Config) -> ethpm::Result<Address> {
    let path = config.keyfile_path();
    match tokio::fs::read(&path).await {
        Ok(bytes) => keyfile_address(&bytes),
        Err(e) if e.kind() == IoErrorKind::NotFound => Err(Error::authorization(
            "no valid keyfile found",
        )
        .with_help("use `ethpm auth --keyfile-path <path_to_keyfile>` to set your keyfile")),
        Err(e) => Err(Error::authorization(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

/// Check the keyfile at `source` and store a copy under the data root.
pub async fn import_keyfile(config: &Config, source: &Path) -> ethpm::Result<Address> {
    let bytes = tokio::fs::read(source).await.map_err(|e| {
        Error::authorization(format!("cannot read keyfile {}: {e}", source.display()))
    })?;
    let address = keyfile_address(&bytes)?;
    ethpm_store::fs::write_atomic(&config.keyfile_path(), &bytes).await?;
    Ok(address)
}

pub(crate) async fn auth(args: AuthArgs, config: Config) -> miette::Result<()> {
    let address = match args.keyfile_path {
        Some(path) => import_keyfile(&config, &path).await?,
        None => stored_address(&config).await?,
    };
    tracing::info!("Keyfile stored for address: {}", address.to_checksum());
    Ok(())
}

pub(crate) async fn release(args: ReleaseArgs, config: Config) -> miette::Result<()> {
    validate_alias(&args.package_name)?;
    if args.package_version.trim().is_empty() {
        return Err(Error::validation("--version must not be empty").into());
    }
    let manifest_uri = Uri::parse(&args.manifest_uri).map_err(Error::from)?;
    if manifest_uri.content_address().is_none() {
        return Err(Error::validation(format!(
            "{manifest_uri} is not content-addressed; release an ipfs:// manifest URI"
        ))
        .into());
    }

    let signer = match &args.keyfile_path {
        Some(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                Error::authorization(format!("cannot read keyfile {}: {e}", path.display()))
            })?;
            keyfile_address(&bytes)?
        }
        None => stored_address(&config).await?,
    };
    if args.keyfile_password.is_none() {
        return Err(
            Error::authorization("--keyfile-password is required to unlock the keyfile").into(),
        );
    }

    let registry = RegistryStore::open(config.registry_store_path())
        .active()
        .await
        .map_err(Error::from)?
        .ok_or_else(|| {
            Error::validation("no active registry")
                .with_help("add one with `ethpm registry add <uri>`")
        })?;

    tracing::debug!(
        package = %args.package_name,
        version = %args.package_version,
        %manifest_uri,
        registry = %registry.uri,
        signer = %signer,
        "release requested"
    );
    Err(CollaboratorMissing {
        command: "release",
        collaborator: "a transaction-signing collaborator",
    }
    .into())
}
