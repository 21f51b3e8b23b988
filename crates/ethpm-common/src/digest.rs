//! Hash functions used across ethPM: keccak for chain data, SHA-256 for
//! content addresses and SHA-1 for git blobs.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

/// Multihash code for SHA2-256
pub const SHA2_256: u64 = 0x12;

/// Multicodec for raw binary blocks
pub const RAW_CODEC: u64 = 0x55;

/// Multicodec for dag-pb (UnixFS) blocks
pub const DAG_PB_CODEC: u64 = 0x70;

/// Keccak-256 (the pre-standard SHA-3 variant used by Ethereum).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

/// Plain SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Git object id of `data` stored as a blob: `sha1("blob <len>\0" || data)`.
pub fn git_blob_sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", data.len()).as_bytes());
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode `data` as a single-block UnixFS file node (dag-pb protobuf).
///
/// This is the byte layout a content node hashes when a small file is
/// added with default settings, so hashing it with SHA-256 yields the same
/// CIDv0 the network hands out.
pub fn unixfs_file_node(data: &[u8]) -> Vec<u8> {
    // UnixFS Data { Type = File (2), Data = data, filesize = len }
    let mut unixfs = Vec::with_capacity(data.len() + 24);
    unixfs.extend_from_slice(&[0x08, 0x02]);
    if !data.is_empty() {
        unixfs.push(0x12);
        put_uvarint(&mut unixfs, data.len() as u64);
        unixfs.extend_from_slice(data);
    }
    unixfs.push(0x18);
    put_uvarint(&mut unixfs, data.len() as u64);

    // PBNode { Data = unixfs }, no links
    let mut node = Vec::with_capacity(unixfs.len() + 12);
    node.push(0x0a);
    put_uvarint(&mut node, unixfs.len() as u64);
    node.extend_from_slice(&unixfs);
    node
}

fn put_uvarint(buf: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        buf.push((n as u8) | 0x80);
        n >>= 7;
    }
    buf.push(n as u8);
}
