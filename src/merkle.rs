//! Merkle tree construction over a manifest's file entries (spec §4.2).

use crate::hash::{digest, digest_concat};
use crate::manifest::FileEntry;

/// Leaf hash for a single file entry: `H(path || "|" || join(chunks, ","))`.
pub fn leaf_hash(entry: &FileEntry) -> String {
    let joined = entry.chunks.join(",");
    digest(format!("{}|{}", entry.path, joined).as_bytes())
}

/// Reduce a manifest's file entries to a single Merkle root.
///
/// The empty manifest yields `H(empty)` (the SHA-256 of zero bytes). A level
/// with odd cardinality duplicates its last element before pairing, exactly
/// as `build_level` does at every subsequent level; this needs no special
/// casing beyond starting from the full-or-empty leaf set.
pub fn merkle_root(entries: &[FileEntry]) -> String {
    if entries.is_empty() {
        return digest(b"");
    }
    let mut level: Vec<String> = entries.iter().map(leaf_hash).collect();
    while level.len() > 1 {
        level = build_level(&level);
    }
    level.into_iter().next().expect("non-empty level")
}

fn build_level(level: &[String]) -> Vec<String> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    let mut i = 0;
    while i < level.len() {
        let left = &level[i];
        let right = if i + 1 < level.len() {
            &level[i + 1]
        } else {
            left
        };
        next.push(digest_concat(&[left, right]));
        i += 2;
    }
    next
}
