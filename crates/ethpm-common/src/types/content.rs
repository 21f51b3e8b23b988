use std::fmt;
use std::str::FromStr;

use cid::Cid;
use multihash::Multihash;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::digest::{self, DAG_PB_CODEC, RAW_CODEC, SHA2_256};

/// Errors produced while parsing or computing content addresses
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ContentAddressError {
    /// Not a CID at all
    #[error("invalid content address {input:?}: {source}")]
    #[diagnostic(code(ethpm::content::invalid))]
    Invalid {
        /// The rejected input
        input: String,
        /// Underlying CID parse failure
        #[source]
        source: cid::Error,
    },

    /// A well-formed CID using a hash or codec we cannot verify
    #[error("unsupported content address {input:?}: {reason}")]
    #[diagnostic(
        code(ethpm::content::unsupported),
        help("only sha2-256 addresses with the dag-pb or raw codec are supported")
    )]
    Unsupported {
        /// The rejected input
        input: String,
        /// What was unsupported
        reason: String,
    },

    /// Building the multihash or CID failed
    #[error("failed to build content address: {0}")]
    #[diagnostic(code(ethpm::content::build))]
    Build(String),
}

/// Address of immutable bytes in the content network.
///
/// Equality implies byte-identical content. Addresses produced by
/// [`ContentAddress::compute`] are CIDv0 (`Qm…`) over a single-block UnixFS
/// file node, matching what a content node returns for small files.
/// CIDv1 raw-codec addresses are accepted for parsing and verification.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress(Cid);

impl ContentAddress {
    /// Parse and check a CID string.
    pub fn parse(s: &str) -> Result<Self, ContentAddressError> {
        let cid = Cid::try_from(s).map_err(|source| ContentAddressError::Invalid {
            input: s.to_owned(),
            source,
        })?;
        Self::from_cid(cid).map_err(|reason| ContentAddressError::Unsupported {
            input: s.to_owned(),
            reason,
        })
    }

    fn from_cid(cid: Cid) -> Result<Self, String> {
        if cid.hash().code() != SHA2_256 {
            return Err(format!("hash function 0x{:x}", cid.hash().code()));
        }
        if cid.hash().size() != 32 {
            return Err(format!("digest length {}", cid.hash().size()));
        }
        match cid.codec() {
            DAG_PB_CODEC | RAW_CODEC => Ok(Self(cid)),
            other => Err(format!("codec 0x{other:x}")),
        }
    }

    /// Compute the CIDv0 address of `data`.
    pub fn compute(data: &[u8]) -> Result<Self, ContentAddressError> {
        let node = digest::unixfs_file_node(data);
        let hash = digest::sha256(&node);
        let mh = Multihash::<64>::wrap(SHA2_256, &hash)
            .map_err(|e| ContentAddressError::Build(e.to_string()))?;
        let cid = Cid::new_v0(mh).map_err(|e| ContentAddressError::Build(e.to_string()))?;
        Ok(Self(cid))
    }

    /// Whether `data` hashes to this address.
    pub fn verify(&self, data: &[u8]) -> bool {
        let expected = self.0.hash().digest();
        let actual = match self.0.codec() {
            RAW_CODEC => digest::sha256(data),
            _ => digest::sha256(&digest::unixfs_file_node(data)),
        };
        expected == actual.as_slice()
    }

    /// The underlying CID.
    pub fn cid(&self) -> &Cid {
        &self.0
    }
}

impl FromStr for ContentAddress {
    type Err = ContentAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.0)
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

/// Git object id of a blob (SHA-1, 20 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitBlobHash([u8; 20]);

impl GitBlobHash {
    /// Parse a 40-digit hex object id.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 40 {
            return None;
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(s, &mut out).ok()?;
        Some(Self(out))
    }

    /// Hash of `data` stored as a git blob.
    pub fn compute(data: &[u8]) -> Self {
        Self(digest::git_blob_sha1(data))
    }

    /// Whether `data` hashes to this object id.
    pub fn verify(&self, data: &[u8]) -> bool {
        digest::git_blob_sha1(data) == self.0
    }
}

impl fmt::Display for GitBlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for GitBlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitBlobHash({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_matches_content_network() {
        // `echo 'hello world' | ipfs add -q`
        let addr = ContentAddress::compute(b"hello world\n").unwrap();
        assert_eq!(
            addr.to_string(),
            "QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o"
        );
        assert!(addr.verify(b"hello world\n"));
        assert!(!addr.verify(b"hello world"));
    }

    #[test]
    fn parse_round_trips_v0() {
        let s = "QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o";
        let addr = ContentAddress::parse(s).unwrap();
        assert_eq!(addr.to_string(), s);
        assert_eq!(addr, ContentAddress::compute(b"hello world\n").unwrap());
    }

    #[test]
    fn raw_v1_verifies_plain_digest() {
        let mh = Multihash::<64>::wrap(SHA2_256, &digest::sha256(b"abc")).unwrap();
        let cid = Cid::new_v1(RAW_CODEC, mh);
        let addr = ContentAddress::parse(&cid.to_string()).unwrap();
        assert!(addr.verify(b"abc"));
        assert!(!addr.verify(b"abd"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ContentAddress::parse("not-a-cid"),
            Err(ContentAddressError::Invalid { .. })
        ));
        let mh = Multihash::<64>::wrap(SHA2_256, &digest::sha256(b"x")).unwrap();
        let cbor = Cid::new_v1(0x71, mh);
        assert!(matches!(
            ContentAddress::parse(&cbor.to_string()),
            Err(ContentAddressError::Unsupported { .. })
        ));
    }

    #[test]
    fn git_blob_hash_parse_and_verify() {
        let h = GitBlobHash::parse("3b18e512dba79e4c8300dd08aeb37f8e728b8dad").unwrap();
        assert!(h.verify(b"hello world\n"));
        assert_eq!(h, GitBlobHash::compute(b"hello world\n"));
        assert!(GitBlobHash::parse("3b18").is_none());
    }
}
