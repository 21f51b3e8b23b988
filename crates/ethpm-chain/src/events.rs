//! `VersionRelease` events emitted by package registries

use smol_str::SmolStr;

use crate::abi;
use crate::error::{ChainError, Result};
use crate::types::{H256, Log};

/// Signature of the event a registry emits for every published release.
pub const VERSION_RELEASE_SIGNATURE: &str = "VersionRelease(string,string,string)";

/// Topic hash of [`VERSION_RELEASE_SIGNATURE`].
pub fn version_release_topic() -> H256 {
    H256(abi::event_topic(VERSION_RELEASE_SIGNATURE))
}

/// A decoded release announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRelease {
    /// Published package name
    pub package_name: SmolStr,
    /// Published version
    pub version: SmolStr,
    /// Manifest URI as written on chain
    pub manifest_uri: String,
    /// Block the event was emitted in
    pub block_number: u64,
    /// Position within the block
    pub log_index: u64,
}

impl VersionRelease {
    /// Decode a log. Fails if it is not a `VersionRelease` event.
    pub fn from_log(log: &Log) -> Result<Self> {
        if log.topics.first() != Some(&version_release_topic()) {
            return Err(ChainError::decode("log is not a VersionRelease event"));
        }
        let mut fields = abi::decode_strings(&log.data, 3)?.into_iter();
        let (Some(package_name), Some(version), Some(manifest_uri)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(ChainError::decode("VersionRelease needs three fields"));
        };
        Ok(Self {
            package_name: package_name.into(),
            version: version.into(),
            manifest_uri,
            block_number: log.block_number,
            log_index: log.log_index,
        })
    }
}
