//! Just enough of the contract ABI to call a registry and read its events:
//! 4-byte selectors, `string` and `bytes32` arguments, and `string` tuples
//! in return data and event data.

use ethpm_common::digest::keccak256;

use crate::error::ChainError;

/// A call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Dynamic UTF-8 string
    String(&'a str),
    /// Fixed 32-byte word
    Bytes32([u8; 32]),
}

/// First four bytes of the keccak hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic hash identifying an event signature.
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

fn word_u64(n: u64) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[24..].copy_from_slice(&n.to_be_bytes());
    w
}

fn padded_len(n: usize) -> usize {
    n.div_ceil(32) * 32
}

/// Encode calldata: selector followed by head/tail encoded arguments.
pub fn encode_call(signature: &str, args: &[Token<'_>]) -> Vec<u8> {
    let head_len = 32 * args.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for arg in args {
        match arg {
            Token::Bytes32(w) => head.extend_from_slice(w),
            Token::String(s) => {
                head.extend_from_slice(&word_u64((head_len + tail.len()) as u64));
                tail.extend_from_slice(&word_u64(s.len() as u64));
                tail.extend_from_slice(s.as_bytes());
                tail.resize(tail.len() + padded_len(s.len()) - s.len(), 0);
            }
        }
    }
    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

fn read_word(data: &[u8], offset: usize) -> Result<&[u8], ChainError> {
    data.get(offset..offset + 32)
        .ok_or_else(|| ChainError::decode(format!("word at {offset} out of bounds")))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize, ChainError> {
    let word = read_word(data, offset)?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(ChainError::decode(format!("integer at {offset} too large")));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(be))
        .map_err(|_| ChainError::decode(format!("integer at {offset} too large")))
}

/// Decode a single `bytes32` return value.
pub fn decode_bytes32(data: &[u8]) -> Result<[u8; 32], ChainError> {
    let mut out = [0u8; 32];
    out.copy_from_slice(read_word(data, 0)?);
    Ok(out)
}

/// Decode a tuple of `n` strings, e.g. the return of
/// `getReleaseData(bytes32)` or the data of a `VersionRelease` event.
pub fn decode_strings(data: &[u8], n: usize) -> Result<Vec<String>, ChainError> {
    (0..n)
        .map(|i| {
            let offset = read_usize(data, 32 * i)?;
            let len = read_usize(data, offset)?;
            let start = offset + 32;
            let bytes = data
                .get(start..start + len)
                .ok_or_else(|| ChainError::decode(format!("string {i} out of bounds")))?;
            String::from_utf8(bytes.to_vec())
                .map_err(|_| ChainError::decode(format!("string {i} is not UTF-8")))
        })
        .collect()
}
