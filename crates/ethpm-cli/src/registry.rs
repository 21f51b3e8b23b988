//! `registry add|activate|list|deploy`

use ethpm::{Config, Error};
use ethpm_common::{RegistryUri, Uri};
use ethpm_store::{RegistryRef, RegistryStore};
use smol_str::SmolStr;

use crate::CollaboratorMissing;
use crate::auth::stored_address;
use crate::cli::RegistryCommand;

pub(crate) async fn run(cmd: RegistryCommand, config: Config) -> miette::Result<()> {
    let store = RegistryStore::open(config.registry_store_path());
    match cmd {
        RegistryCommand::Add { uri, alias } => {
            let parsed = RegistryUri::parse(&uri).map_err(Error::from)?;
            let entry = store.add(&parsed, alias.as_deref()).await.map_err(Error::from)?;
            match &entry.alias {
                Some(alias) => tracing::info!(
                    "Registry @ {} (alias: {alias}) added to registry store",
                    entry.uri
                ),
                None => tracing::info!("Registry @ {} added to registry store", entry.uri),
            }
            if entry.active {
                tracing::info!("{} is now the active registry", entry.uri);
            }
        }
        RegistryCommand::Activate { uri_or_alias } => {
            let entry = store
                .activate(&registry_ref(&uri_or_alias)?)
                .await
                .map_err(Error::from)?;
            tracing::info!("Registry @ {} activated", entry.uri);
        }
        RegistryCommand::List => {
            let entries = store.list().await.map_err(Error::from)?;
            if entries.is_empty() {
                tracing::info!("no registries in {}", store.path().display());
            }
            for entry in entries {
                let marker = if entry.active { "*" } else { " " };
                match entry.alias {
                    Some(alias) => println!("{marker} {} --- {alias}", entry.uri),
                    None => println!("{marker} {}", entry.uri),
                }
            }
        }
        RegistryCommand::Deploy { chain_id } => {
            if chain_id == 0 {
                return Err(Error::validation("--chain-id must be a positive chain id").into());
            }
            let deployer = stored_address(&config).await?;
            tracing::debug!(chain_id, %deployer, "registry deploy requested");
            return Err(CollaboratorMissing {
                command: "registry deploy",
                collaborator: "a contract-deployment collaborator",
            }
            .into());
        }
    }
    Ok(())
}

/// A registry URI names a registry by id, anything else by alias.
fn registry_ref(uri_or_alias: &str) -> ethpm::Result<RegistryRef> {
    if Uri::looks_like_uri(uri_or_alias) {
        let uri = RegistryUri::parse(uri_or_alias)?;
        Ok(RegistryRef::Id(uri.registry))
    } else {
        Ok(RegistryRef::Alias(SmolStr::new(uri_or_alias)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethpm::ErrorKind;

    #[test]
    fn registry_refs() {
        let r = registry_ref("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1").unwrap();
        assert!(matches!(r, RegistryRef::Id(id) if id.chain_id == 1));
        assert_eq!(
            registry_ref("mainnet").unwrap(),
            RegistryRef::Alias(SmolStr::new("mainnet"))
        );
        let err = registry_ref("ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UriNotSupported);
    }
}
