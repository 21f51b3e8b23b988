//! Input checks that run before any network access or disk mutation

use std::path::Path;

use ethpm_common::types::is_valid_alias;
use ethpm_common::{RegistryUri, Uri};

use crate::config::{PACKAGES_DIR_NAME, is_packages_dir_name};
use crate::error::{Error, Result};

/// Whether `a` and `b` name the same on-chain registry.
///
/// Chain id and address must match (address case-insensitively); package
/// name and version are ignored.
pub fn same_registry(a: &RegistryUri, b: &RegistryUri) -> bool {
    a.same_registry(b)
}

/// Aliases are directory names: a letter, then letters, digits, `-` or `_`.
pub fn validate_alias(alias: &str) -> Result<()> {
    if is_valid_alias(alias) {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid alias {alias:?}"))
            .with_help("an alias starts with a letter and contains only letters, digits, `-` and `_`"))
    }
}

/// The packages dir must be named `_ethpm_packages` and sit in an existing
/// directory. The dir itself is created on first install.
pub fn validate_packages_dir(path: &Path) -> Result<()> {
    if !is_packages_dir_name(path) {
        return Err(Error::install(format!(
            "{} is not named {PACKAGES_DIR_NAME}",
            path.display()
        )));
    }
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(Error::install(format!(
            "parent directory {} does not exist",
            parent.display()
        )));
    }
    if path.exists() && !path.is_dir() {
        return Err(Error::install(format!("{} is not a directory", path.display())));
    }
    Ok(())
}

/// A registry dependency of a package that came from a registry must come
/// from that same registry.
pub fn check_dependency_registry(parent: Option<&RegistryUri>, dependency: &Uri) -> Result<()> {
    match (parent, dependency) {
        (Some(parent), Uri::Registry(dep)) if !same_registry(parent, dep) => {
            Err(Error::validation(format!(
                "dependency {dep} is published on a different registry than {}",
                parent.bare()
            ))
            .with_help("cross-registry dependencies are refused to prevent package substitution"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(s: &str) -> RegistryUri {
        RegistryUri::parse(s).unwrap()
    }

    #[test]
    fn aliases() {
        assert!(validate_alias("owned").is_ok());
        assert!(validate_alias("Owned_2-x").is_ok());
        for bad in ["", "1owned", "_owned", "own ed", "own/ed", "../x"] {
            assert!(validate_alias(bad).unwrap_err().kind().is_validation(), "{bad}");
        }
    }

    #[test]
    fn packages_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(validate_packages_dir(&tmp.path().join("_ethpm_packages")).is_ok());
        let err = validate_packages_dir(&tmp.path().join("packages")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Install);
        let err = validate_packages_dir(&tmp.path().join("missing/_ethpm_packages")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Install);
    }

    #[test]
    fn cross_registry_dependencies() {
        let parent = registry("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1/owned?version=1.0.0");
        let same = Uri::parse("erc1319://0x6b5da3ca4286baa7fbaf64eeee1834c7d430b729:1/safe-math?version=1.0.0").unwrap();
        let other_chain = Uri::parse("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:3/safe-math?version=1.0.0").unwrap();
        let content = Uri::parse("ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW").unwrap();

        assert!(check_dependency_registry(Some(&parent), &same).is_ok());
        assert!(check_dependency_registry(Some(&parent), &content).is_ok());
        assert!(check_dependency_registry(None, &other_chain).is_ok());
        let err = check_dependency_registry(Some(&parent), &other_chain).unwrap_err();
        assert!(err.kind().is_validation());
    }
}
