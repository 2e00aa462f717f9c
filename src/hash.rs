//! Primitive digest and canonical-encoding helpers (spec §4.1).
//!
//! Every other component builds on `digest` and `canonical_json`: the chunk
//! store addresses content by `digest`, the Merkle builder hashes
//! `digest`-produced leaves, and the WAL/audit log both embed
//! `canonical_json` payloads so that independent implementations of this
//! format agree bit-for-bit.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::Result;

/// SHA-256 of `bytes`, rendered as 64 lowercase hex characters.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of the concatenation of two hex-encoded digests.
///
/// Concatenation happens on the hex *strings*, not their decoded bytes, per
/// the Merkle pairing and chain-hash formulas.
pub fn digest_concat(parts: &[&str]) -> String {
    digest(parts.concat().as_bytes())
}

/// 64 zero characters, the genesis/sentinel digest used throughout the
/// on-disk formats (`prev_root`, `prev_chain_hash`, audit log `prev_hash`).
pub const ZERO_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Serialize `value` to its canonical encoding: keys sorted lexicographically
/// at every level, no inserted whitespace, UTF-8.
///
/// This relies on `serde_json::Value`'s map being a `BTreeMap` (the
/// `preserve_order` feature must stay disabled) so that any `Serialize`
/// impl, however it populates its fields, round-trips through a
/// lexicographically-sorted representation. Callers that canonicalize a
/// manifest are still responsible for sorting the `files` array by `path`
/// before calling this — sorting object keys does not reorder array
/// elements.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let as_value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&as_value)?)
}
