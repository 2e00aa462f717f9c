//! Snapshot manager: creation, verification, anti-rollback, and restore
//! (spec §4.4, §4.4b, §4.4c, §4.4d).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use crate::chunk::{ChunkStore, CHUNK_SIZE};
use crate::hash::{canonical_json, digest, digest_concat, ZERO_HASH};
use crate::manifest::{FileEntry, Manifest};
use crate::wal::Wal;
use crate::{Error, Result};

/// Persisted metadata per snapshot (spec §3's Snapshot Record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub label: Option<String>,
    pub merkle_root: String,
    pub prev_root: String,
    pub prev_chain_hash: String,
    pub chain_hash: String,
    pub manifest_hash: String,
    pub total_files: usize,
    pub total_chunks: usize,
    pub sequence: u64,
}

/// `metadata.json`'s shape (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreMetadata {
    snapshots: BTreeMap<String, SnapshotRecord>,
    latest_snapshot: Option<String>,
    latest_snapshot_root: Option<String>,
    prev_root_chain: Vec<String>,
}

/// Outcome of [`SnapshotManager::verify`] (spec §4.4b): a structured result,
/// never a raised error, so that callers can report "ok" or a specific
/// reason without treating verification failure as a plumbing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    ManifestCorrupt(String),
    ChunkMissing(String),
    RollbackDetected(String),
}

/// Drives the chunk store and manifest/Merkle/chain-hash machinery to
/// create, verify, and restore snapshots against one store root.
pub struct SnapshotManager {
    store_root: PathBuf,
    chunks: ChunkStore,
    wal: Wal,
}

impl SnapshotManager {
    pub fn open<P: AsRef<Path>>(store_root: P, wal: Wal) -> Result<Self> {
        let store_root = store_root.as_ref().to_path_buf();
        fs::create_dir_all(store_root.join("snapshots"))?;
        let chunks = ChunkStore::new(&store_root)?;
        Ok(Self {
            store_root,
            chunks,
            wal,
        })
    }

    fn metadata_path(&self) -> PathBuf {
        self.store_root.join("metadata.json")
    }

    fn manifest_path(&self, snapshot_id: &str) -> PathBuf {
        self.store_root
            .join("snapshots")
            .join(format!("{snapshot_id}.manifest"))
    }

    fn load_metadata(&self) -> Result<StoreMetadata> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(StoreMetadata::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save_metadata(&self, metadata: &StoreMetadata) -> Result<()> {
        let bytes = canonical_json(metadata)?;
        let path = self.metadata_path();
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Create a new snapshot of `source_path` (spec §4.4, steps 1-12).
    #[instrument(skip(self), fields(source = %source_path.as_ref().display()))]
    pub fn create_snapshot(
        &self,
        source_path: &Path,
        label: Option<String>,
    ) -> Result<SnapshotRecord> {
        let snapshot_id = generate_snapshot_id();
        self.wal.begin(&snapshot_id)?;

        match self.create_snapshot_inner(source_path, label, &snapshot_id) {
            Ok(record) => match self.wal.commit(&snapshot_id) {
                Ok(()) => {
                    info!(snapshot_id = %record.id, "snapshot created");
                    Ok(record)
                }
                Err(e) => {
                    warn!(snapshot_id = %snapshot_id, error = %e, "WAL commit failed, aborting");
                    self.cleanup_partial(&snapshot_id)?;
                    self.wal.abort(&snapshot_id)?;
                    Err(e)
                }
            },
            Err(e) => {
                warn!(snapshot_id = %snapshot_id, error = %e, "snapshot creation failed, aborting");
                self.cleanup_partial(&snapshot_id)?;
                self.wal.abort(&snapshot_id)?;
                Err(e)
            }
        }
    }

    fn create_snapshot_inner(
        &self,
        source_path: &Path,
        label: Option<String>,
        snapshot_id: &str,
    ) -> Result<SnapshotRecord> {
        let files = self.chunk_source_tree(source_path)?;
        let manifest = Manifest::new(
            snapshot_id.to_string(),
            source_path.display().to_string(),
            Utc::now(),
            label,
            files,
        );
        let manifest_bytes = manifest.canonical_bytes()?;
        let manifest_hash = digest(&manifest_bytes);
        let merkle_root = manifest.merkle_root();

        let metadata = self.load_metadata()?;
        let (prev_root, prev_chain_hash, sequence) = match &metadata.latest_snapshot {
            None => (ZERO_HASH.to_string(), ZERO_HASH.to_string(), 0u64),
            Some(latest_id) => {
                let latest = metadata.snapshots.get(latest_id).ok_or_else(|| {
                    Error::ManifestCorrupt {
                        reason: format!("latest_snapshot '{latest_id}' missing from index"),
                    }
                })?;
                (
                    latest.merkle_root.clone(),
                    latest.chain_hash.clone(),
                    latest.sequence + 1,
                )
            }
        };
        let chain_hash = digest_concat(&[&prev_chain_hash, &merkle_root, &prev_root]);

        let record = SnapshotRecord {
            id: snapshot_id.to_string(),
            created_at: manifest.created_at,
            label: manifest.label.clone(),
            merkle_root: merkle_root.clone(),
            prev_root,
            prev_chain_hash,
            chain_hash,
            manifest_hash,
            total_files: manifest.files.len(),
            total_chunks: manifest
                .files
                .iter()
                .map(|f| f.chunks.len())
                .sum(),
            sequence,
        };
        let record_bytes = canonical_json(&record)?;

        self.wal.write_manifest(snapshot_id, &manifest_bytes)?;
        self.wal.write_metadata(snapshot_id, &record_bytes)?;

        let manifest_path = self.manifest_path(snapshot_id);
        let tmp_manifest = manifest_path.with_extension("manifest.tmp");
        {
            let mut tmp = File::create(&tmp_manifest)?;
            tmp.write_all(&manifest_bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_manifest, &manifest_path)?;

        let mut metadata = metadata;
        metadata.snapshots.insert(record.id.clone(), record.clone());
        metadata.latest_snapshot = Some(record.id.clone());
        metadata.latest_snapshot_root = Some(record.merkle_root.clone());
        metadata.prev_root_chain.push(record.merkle_root.clone());
        self.save_metadata(&metadata)?;

        Ok(record)
    }

    /// Undo the index/manifest effects of a snapshot that never reached a
    /// WAL commit. If the removed snapshot was `latest_snapshot`, the
    /// pointer is recomputed from the remaining snapshots by `created_at`
    /// (the most recent survivor becomes latest) rather than nulled — an
    /// earlier, already-committed snapshot must stay reachable as the chain
    /// head, or the next `backup` would start a fresh genesis and sever the
    /// hash chain (spec I1/§4.4c).
    fn cleanup_partial(&self, snapshot_id: &str) -> Result<()> {
        let manifest_path = self.manifest_path(snapshot_id);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }
        let mut metadata = self.load_metadata()?;
        if metadata.snapshots.remove(snapshot_id).is_some() {
            if metadata.latest_snapshot.as_deref() == Some(snapshot_id) {
                let next_latest = metadata
                    .snapshots
                    .values()
                    .max_by_key(|s| s.created_at)
                    .map(|s| (s.id.clone(), s.merkle_root.clone()));
                match next_latest {
                    Some((id, root)) => {
                        metadata.latest_snapshot = Some(id);
                        metadata.latest_snapshot_root = Some(root);
                    }
                    None => {
                        metadata.latest_snapshot = None;
                        metadata.latest_snapshot_root = None;
                    }
                }
            }
            self.save_metadata(&metadata)?;
        }
        Ok(())
    }

    /// Walk `source_path`, chunking each regular file in [`CHUNK_SIZE`]
    /// windows. Symlinks and special files are skipped (spec §4.4 step 3,
    /// §9).
    fn chunk_source_tree(&self, source_path: &Path) -> Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(source_path).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            let file_type = entry.file_type();
            if !file_type.is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(source_path)
                .unwrap_or(entry.path());
            let path_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let (chunks, size) = self.chunk_file(entry.path())?;
            files.push(FileEntry {
                path: path_str,
                chunks,
                size,
            });
        }
        Ok(files)
    }

    fn chunk_file(&self, path: &Path) -> Result<(Vec<String>, u64)> {
        let mut file = File::open(path)?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut chunks = Vec::new();
        let mut total_size = 0u64;
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            let hash = self.chunks.put(&buffer[..read])?;
            total_size += read as u64;
            chunks.push(hash);
        }
        Ok((chunks, total_size))
    }

    /// Recover from an unclean shutdown (spec §4.5 R1-R4). Must run once at
    /// process start before any mutating command.
    #[instrument(skip(self))]
    pub fn recover(&self) -> Result<()> {
        let incomplete = self.wal.recover()?;
        if incomplete.is_empty() {
            return Ok(());
        }
        for tx in &incomplete {
            self.cleanup_partial(&tx.snapshot_id)?;
            warn!(snapshot_id = %tx.snapshot_id, "rolled back incomplete snapshot");
        }
        let ids: Vec<String> = incomplete.into_iter().map(|tx| tx.snapshot_id).collect();
        self.wal.compact(&ids)?;
        Ok(())
    }

    /// List all snapshot records, newest first by `created_at`.
    pub fn list(&self) -> Result<Vec<SnapshotRecord>> {
        let metadata = self.load_metadata()?;
        let mut records: Vec<SnapshotRecord> = metadata.snapshots.into_values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn get_record(&self, snapshot_id: &str) -> Result<SnapshotRecord> {
        let metadata = self.load_metadata()?;
        metadata
            .snapshots
            .get(snapshot_id)
            .cloned()
            .ok_or_else(|| Error::SnapshotNotFound {
                id: snapshot_id.to_string(),
            })
    }

    /// Verify a snapshot's integrity and chain position (spec §4.4b). Never
    /// mutates state and never returns an error for a content-integrity
    /// failure — only for out-of-band conditions (`SnapshotNotFound`, I/O).
    #[instrument(skip(self))]
    pub fn verify(&self, snapshot_id: &str) -> Result<VerifyOutcome> {
        let record = self.get_record(snapshot_id)?; // V1

        let manifest_path = self.manifest_path(snapshot_id);
        let manifest_bytes = match fs::read(&manifest_path) {
            Ok(bytes) => bytes,
            Err(_) => {
                return Ok(VerifyOutcome::ManifestCorrupt(
                    "manifest file missing".to_string(),
                ))
            }
        };
        let manifest = match Manifest::from_canonical_bytes(&manifest_bytes) {
            Ok(m) => m,
            Err(_) => {
                return Ok(VerifyOutcome::ManifestCorrupt(
                    "manifest is not valid canonical JSON".to_string(),
                ))
            }
        };

        let recomputed_manifest_hash = digest(&manifest_bytes); // V3
        if recomputed_manifest_hash != record.manifest_hash {
            return Ok(VerifyOutcome::ManifestCorrupt(
                "manifest_hash mismatch".to_string(),
            ));
        }

        let recomputed_root = manifest.merkle_root(); // V4
        if recomputed_root != record.merkle_root {
            return Ok(VerifyOutcome::ManifestCorrupt(
                "merkle_root mismatch".to_string(),
            ));
        }

        for entry in &manifest.files {
            // V5
            for hash in &entry.chunks {
                if !self.chunks.exists(hash) {
                    return Ok(VerifyOutcome::ChunkMissing(hash.clone()));
                }
            }
        }

        self.check_rollback(&record) // V6
    }

    /// Anti-rollback check (spec §4.4c).
    fn check_rollback(&self, record: &SnapshotRecord) -> Result<VerifyOutcome> {
        let expected_chain_hash =
            digest_concat(&[&record.prev_chain_hash, &record.merkle_root, &record.prev_root]);
        if expected_chain_hash != record.chain_hash {
            return Ok(VerifyOutcome::RollbackDetected(
                "chain_hash does not match prev_chain_hash/merkle_root/prev_root".to_string(),
            ));
        }

        if record.sequence == 0 {
            if record.prev_root != ZERO_HASH || record.prev_chain_hash != ZERO_HASH {
                return Ok(VerifyOutcome::RollbackDetected(
                    "genesis snapshot has non-zero prev_root or prev_chain_hash".to_string(),
                ));
            }
            return Ok(VerifyOutcome::Ok);
        }

        let metadata = self.load_metadata()?;
        let predecessor = metadata
            .snapshots
            .values()
            .find(|s| s.merkle_root == record.prev_root);
        let predecessor = match predecessor {
            Some(p) => p,
            None => {
                return Ok(VerifyOutcome::RollbackDetected(format!(
                    "no known snapshot with merkle_root == {}",
                    record.prev_root
                )))
            }
        };
        if predecessor.chain_hash != record.prev_chain_hash {
            return Ok(VerifyOutcome::RollbackDetected(
                "predecessor chain_hash does not match prev_chain_hash".to_string(),
            ));
        }
        if predecessor.sequence + 1 != record.sequence {
            return Ok(VerifyOutcome::RollbackDetected(
                "predecessor sequence is not contiguous".to_string(),
            ));
        }
        Ok(VerifyOutcome::Ok)
    }

    /// Restore a snapshot's files into `target`. Refuses a non-empty target
    /// unless `force` is set, and refuses to proceed unless verification
    /// passes first (spec §4.4d, §6).
    #[instrument(skip(self))]
    pub fn restore(&self, snapshot_id: &str, target: &Path, force: bool) -> Result<()> {
        if !force && target_is_nonempty(target) {
            return Err(Error::RestoreTargetNotEmpty {
                path: target.display().to_string(),
            });
        }

        match self.verify(snapshot_id)? {
            VerifyOutcome::Ok => {}
            VerifyOutcome::ManifestCorrupt(reason) => {
                return Err(Error::ManifestCorrupt { reason })
            }
            VerifyOutcome::ChunkMissing(hash) => return Err(Error::ChunkMissing { hash }),
            VerifyOutcome::RollbackDetected(reason) => {
                return Err(Error::RollbackDetected { reason })
            }
        }

        let manifest_bytes = fs::read(self.manifest_path(snapshot_id))?;
        let manifest = Manifest::from_canonical_bytes(&manifest_bytes)?;

        for entry in &manifest.files {
            let dest = target.join(&entry.path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest)?;
            for hash in &entry.chunks {
                let bytes = self.chunks.get(hash)?;
                if digest(&bytes) != *hash {
                    return Err(Error::ChunkMissing {
                        hash: hash.clone(),
                    });
                }
                out.write_all(&bytes)?;
            }
        }
        info!(snapshot_id, target = %target.display(), "snapshot restored");
        Ok(())
    }
}

fn target_is_nonempty(target: &Path) -> bool {
    fs::read_dir(target)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// `snap_<unix_seconds>_<H(nanos)[0:8]>` (spec §4.4 step 1).
fn generate_snapshot_id() -> String {
    let now = std::time::SystemTime::now();
    let since_epoch = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let seconds = since_epoch.as_secs();
    let nanos = since_epoch.as_nanos();
    let suffix = &digest(nanos.to_string().as_bytes())[..8];
    format!("snap_{seconds}_{suffix}")
}
