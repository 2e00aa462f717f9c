//! The manifest data model (spec §3) and its canonical on-disk encoding
//! (spec §4.1).
//!
//! `Manifest` and `FileEntry` are plain data; the logic that builds a
//! manifest by walking a source tree lives in [`crate::snapshot`], and the
//! logic that persists it atomically also lives there, since both the
//! manifest file and the snapshot record must land in the WAL together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::{canonical_json, digest};
use crate::merkle;
use crate::{Error, Result};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// A single file's inventory within a manifest: its path and the ordered
/// chunk hashes that reconstruct it by concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Source-relative path, forward-slash separated.
    pub path: String,
    /// Ordered chunk hashes.
    pub chunks: Vec<String>,
    /// Sum of the referenced chunks' lengths.
    pub size: u64,
}

/// The per-snapshot inventory of files, in its canonical (pre-hash) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub snapshot_id: String,
    pub source_path: String,
    pub created_at: DateTime<Utc>,
    pub label: Option<String>,
    pub files: Vec<FileEntry>,
}

impl Manifest {
    /// Construct a manifest, sorting `files` by path as required for
    /// canonical encoding (spec §3, §4.1).
    pub fn new(
        snapshot_id: String,
        source_path: String,
        created_at: DateTime<Utc>,
        label: Option<String>,
        mut files: Vec<FileEntry>,
    ) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            version: MANIFEST_VERSION,
            snapshot_id,
            source_path,
            created_at,
            label,
            files,
        }
    }

    /// The canonical JSON encoding: sorted keys, no whitespace, `files`
    /// pre-sorted by path.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(self)
    }

    /// `H(canonical_bytes)`.
    pub fn manifest_hash(&self) -> Result<String> {
        Ok(digest(&self.canonical_bytes()?))
    }

    /// The Merkle root over this manifest's file entries (spec §4.2).
    pub fn merkle_root(&self) -> String {
        merkle::merkle_root(&self.files)
    }

    /// Parse a manifest from its canonical on-disk bytes, failing with
    /// `ManifestCorrupt` rather than the raw serde error — callers in the
    /// verification path need the taxonomy distinction, not the parser
    /// internals.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::ManifestCorrupt {
            reason: e.to_string(),
        })
    }
}
