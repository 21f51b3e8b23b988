use std::fmt;

use bytes::Bytes;
use ethpm_common::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

/// A 32-byte word: block hashes, transaction hashes, log topics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct H256(pub [u8; 32]);

impl H256 {
    /// Parse `0x`-prefixed hex.
    pub fn parse(s: &str) -> Option<Self> {
        let hex_part = s.strip_prefix("0x")?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut out).ok()?;
        Some(Self(out))
    }

    /// `0x1234..cdef`
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}..{}", &full[..4], &full[60..])
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({self})")
    }
}

impl From<[u8; 32]> for H256 {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| D::Error::custom(format!("invalid 32-byte hex: {s}")))
    }
}

/// Parse a JSON-RPC quantity (`0x`-prefixed, no leading zeros required).
pub fn parse_quantity(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x")?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Render a JSON-RPC quantity.
pub fn quantity(n: u64) -> String {
    format!("0x{n:x}")
}

/// A log entry emitted by a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics; the first is the event signature hash
    pub topics: Vec<H256>,
    /// Non-indexed event data
    pub data: Bytes,
    /// Block the log was included in
    pub block_number: u64,
    /// Position of the log within the block
    pub log_index: u64,
    /// Transaction that emitted the log
    pub transaction_hash: Option<H256>,
}

/// Which logs to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    /// Only logs emitted by this contract, if set
    pub address: Option<Address>,
    /// First topic (event signature hash), if set
    pub topic0: Option<H256>,
    /// First block, inclusive
    pub from_block: u64,
    /// Last block, inclusive
    pub to_block: u64,
}

impl LogFilter {
    /// `eth_getLogs` filter object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("fromBlock".into(), quantity(self.from_block).into());
        obj.insert("toBlock".into(), quantity(self.to_block).into());
        if let Some(address) = &self.address {
            obj.insert("address".into(), address.to_lower_hex().into());
        }
        if let Some(topic) = &self.topic0 {
            obj.insert("topics".into(), serde_json::json!([topic.to_string()]));
        }
        serde_json::Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x0"), Some(0));
        assert_eq!(parse_quantity("0x69"), Some(105));
        assert_eq!(parse_quantity("69"), None);
        assert_eq!(parse_quantity("0x"), None);
        assert_eq!(quantity(105), "0x69");
    }

    #[test]
    fn short_hash() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x12;
        bytes[1] = 0x34;
        bytes[30] = 0xcd;
        bytes[31] = 0xef;
        assert_eq!(H256(bytes).short(), "0x1234..cdef");
    }
}
