//! ethPM v2 package manifests
//!
//! Only the fields the resolver needs are typed. `meta`, `contract_types`
//! and `deployments` are carried as opaque JSON; schema validation of their
//! contents belongs to a dedicated manifest validator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::types::content::ContentAddress;
use crate::types::is_valid_alias;
use crate::types::uri::{Uri, UriNotSupportedError};

/// Errors raised while reading a manifest
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ManifestError {
    /// Bytes are not a manifest document
    #[error("malformed manifest: {0}")]
    #[diagnostic(code(ethpm::manifest::malformed))]
    Malformed(#[from] serde_json::Error),

    /// A source key escapes the package directory or is otherwise unusable
    #[error("invalid source path {path:?}: {reason}")]
    #[diagnostic(
        code(ethpm::manifest::source_path),
        help("source paths are relative, e.g. ./contracts/Owned.sol")
    )]
    InvalidSourcePath {
        /// Path as written in the manifest
        path: String,
        /// What was wrong with it
        reason: &'static str,
    },

    /// A dependency key cannot be used as a directory name
    #[error("invalid build dependency name {0:?}")]
    #[diagnostic(code(ethpm::manifest::dependency_name))]
    InvalidDependencyName(String),

    /// A source or dependency value looked like a URI but did not parse
    #[error(transparent)]
    #[diagnostic(transparent)]
    Uri(#[from] UriNotSupportedError),
}

/// An ethPM v2 manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version, `"2"`
    pub manifest_version: SmolStr,
    /// Published package name
    pub package_name: SmolStr,
    /// Package version
    pub version: SmolStr,
    /// Free-form package metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// Source path → URI or inlined source text
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, String>,
    /// Contract name → contract type object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contract_types: BTreeMap<String, serde_json::Value>,
    /// Chain URI → deployments on that chain
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deployments: BTreeMap<String, serde_json::Value>,
    /// Dependency name → manifest URI
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub build_dependencies: BTreeMap<String, String>,
}

/// Where a source file's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source<'m> {
    /// Fetched from a URI
    Uri(Uri),
    /// Written into the manifest itself
    Inline(&'m str),
}

impl Manifest {
    /// Parse raw manifest bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Declared build dependencies as `(name, uri)` pairs, sorted by name.
    pub fn dependencies(&self) -> Result<Vec<(SmolStr, Uri)>, ManifestError> {
        self.build_dependencies
            .iter()
            .map(|(name, uri)| {
                if !is_valid_alias(name) {
                    return Err(ManifestError::InvalidDependencyName(name.clone()));
                }
                Ok((SmolStr::new(name), Uri::parse(uri)?))
            })
            .collect()
    }

    /// Sources keyed by normalized relative path.
    pub fn sources(&self) -> Result<Vec<(String, Source<'_>)>, ManifestError> {
        self.sources
            .iter()
            .map(|(path, value)| {
                let path = normalize_source_path(path)?;
                let source = if is_uri_like(value) {
                    Source::Uri(Uri::parse(value.trim())?)
                } else {
                    Source::Inline(value.as_str())
                };
                Ok((path, source))
            })
            .collect()
    }

    /// Content addresses of all content-scheme sources and dependencies.
    pub fn content_references(&self) -> Result<Vec<ContentAddress>, ManifestError> {
        let mut out: Vec<ContentAddress> = self
            .sources()?
            .into_iter()
            .filter_map(|(_, source)| match source {
                Source::Uri(uri) => uri.content_address(),
                Source::Inline(_) => None,
            })
            .collect();
        out.extend(
            self.dependencies()?
                .into_iter()
                .filter_map(|(_, uri)| uri.content_address()),
        );
        out.sort();
        out.dedup();
        Ok(out)
    }
}

fn is_uri_like(value: &str) -> bool {
    let value = value.trim();
    Uri::looks_like_uri(value) && !value.contains(char::is_whitespace)
}

/// Normalize a manifest source key into a relative path with `/` separators.
///
/// Strips a leading `./`. Absolute paths and `..` components are rejected so
/// a manifest cannot write outside its package directory.
pub fn normalize_source_path(path: &str) -> Result<String, ManifestError> {
    let err = |reason| ManifestError::InvalidSourcePath {
        path: path.to_owned(),
        reason,
    };
    if path.starts_with('/') || path.contains('\\') || path.contains(':') {
        return Err(err("must be a relative path"));
    }
    let parts: Vec<&str> = path
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.is_empty() {
        return Err(err("empty path"));
    }
    if parts.iter().any(|p| *p == "..") {
        return Err(err("must not contain .."));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNED: &str = r#"{
        "manifest_version": "2",
        "package_name": "owned",
        "version": "1.0.0",
        "meta": {"license": "MIT"},
        "sources": {
            "./contracts/Owned.sol": "ipfs://QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o",
            "./contracts/Inline.sol": "pragma solidity ^0.4.24;\n// see https://example.com\ncontract Inline {}\n"
        },
        "build_dependencies": {
            "safe-math-lib": "ipfs://QmbeVyFLSuEUxiXKwSsEjef6icpdTdA4kGG9BcrJXKNKUW"
        }
    }"#;

    #[test]
    fn reads_sources_and_dependencies() {
        let manifest = Manifest::from_slice(OWNED.as_bytes()).unwrap();
        assert_eq!(manifest.package_name, "owned");

        let sources = manifest.sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].0, "contracts/Inline.sol");
        assert!(matches!(sources[0].1, Source::Inline(_)));
        assert!(matches!(sources[1].1, Source::Uri(Uri::Content(_))));

        let deps = manifest.dependencies().unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].0, "safe-math-lib");

        assert_eq!(manifest.content_references().unwrap().len(), 2);
    }

    #[test]
    fn source_paths_stay_inside_package() {
        assert_eq!(normalize_source_path("./a/b.sol").unwrap(), "a/b.sol");
        assert_eq!(normalize_source_path("a//./b.sol").unwrap(), "a/b.sol");
        assert!(normalize_source_path("/etc/passwd").is_err());
        assert!(normalize_source_path("./../escape.sol").is_err());
        assert!(normalize_source_path("./").is_err());
        assert!(normalize_source_path("C:\\x.sol").is_err());
    }

    #[test]
    fn rejects_non_manifest() {
        assert!(matches!(
            Manifest::from_slice(b"[1, 2, 3]"),
            Err(ManifestError::Malformed(_))
        ));
    }
}
