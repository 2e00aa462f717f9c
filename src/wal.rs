//! Write-ahead log and crash-recovery driver (spec §4.5).
//!
//! The WAL never redoes forward — a committed snapshot's manifest and index
//! entry are already durable on disk by the time the commit record lands
//! (spec §4.4 steps 9–11). Its only job is marking a snapshot "in flight" so
//! that a crash between `BEGIN` and `COMMIT` can be undone.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{info, warn};

use crate::{Error, Result};

/// One incomplete transaction discovered during recovery, carrying enough
/// of its payload for the caller to undo the partial snapshot.
#[derive(Debug, Clone)]
pub struct IncompleteTransaction {
    pub snapshot_id: String,
    pub manifest: Option<Vec<u8>>,
    pub metadata: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct OpenTx {
    manifest: Option<Vec<u8>>,
    metadata: Option<Vec<u8>>,
}

/// Append-only write-ahead log backed by a single text file.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
}

impl Wal {
    /// Open (creating if absent) the WAL file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            File::create(&path)?;
        }
        Ok(Self { path })
    }

    fn append_line(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        Ok(())
    }

    /// `BEGIN:<sid>`.
    pub fn begin(&self, snapshot_id: &str) -> Result<()> {
        self.append_line(&format!("BEGIN:{snapshot_id}"))
    }

    /// `MANIFEST:<sid>:<b64(canonical manifest bytes)>`.
    pub fn write_manifest(&self, snapshot_id: &str, canonical_manifest: &[u8]) -> Result<()> {
        let encoded = BASE64.encode(canonical_manifest);
        self.append_line(&format!("MANIFEST:{snapshot_id}:{encoded}"))
    }

    /// `METADATA:<sid>:<b64(canonical record bytes)>`.
    pub fn write_metadata(&self, snapshot_id: &str, canonical_record: &[u8]) -> Result<()> {
        let encoded = BASE64.encode(canonical_record);
        self.append_line(&format!("METADATA:{snapshot_id}:{encoded}"))
    }

    /// `COMMIT:<sid>`.
    pub fn commit(&self, snapshot_id: &str) -> Result<()> {
        self.append_line(&format!("COMMIT:{snapshot_id}"))
    }

    /// `ABORT:<sid>`.
    pub fn abort(&self, snapshot_id: &str) -> Result<()> {
        self.append_line(&format!("ABORT:{snapshot_id}"))
    }

    /// Scan the WAL from the beginning and return every transaction that was
    /// never closed by a matching `COMMIT`/`ABORT` (spec §4.5 R1–R3a/b).
    ///
    /// Does not itself touch the snapshot index, manifest files, or chunks;
    /// the caller performs the undo (R3a/b/c) and then calls
    /// [`Wal::compact`] to elide the incomplete transactions' records
    /// (R3d).
    pub fn recover(&self) -> Result<Vec<IncompleteTransaction>> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut open_txs: HashMap<String, OpenTx> = HashMap::new();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ':');
            let kind = parts.next().unwrap_or("");
            let rest = parts.next().unwrap_or("");
            match kind {
                "BEGIN" => {
                    open_txs.insert(rest.to_string(), OpenTx::default());
                }
                "MANIFEST" => {
                    if let Some((sid, payload)) = rest.split_once(':') {
                        if let Some(tx) = open_txs.get_mut(sid) {
                            tx.manifest = BASE64.decode(payload).ok();
                        }
                    }
                }
                "METADATA" => {
                    if let Some((sid, payload)) = rest.split_once(':') {
                        if let Some(tx) = open_txs.get_mut(sid) {
                            tx.metadata = BASE64.decode(payload).ok();
                        }
                    }
                }
                "COMMIT" | "ABORT" => {
                    open_txs.remove(rest);
                }
                other => {
                    return Err(Error::WalCorrupt {
                        reason: format!("unrecognized WAL record kind: {other}"),
                    });
                }
            }
        }

        let incomplete: Vec<IncompleteTransaction> = open_txs
            .into_iter()
            .map(|(snapshot_id, tx)| IncompleteTransaction {
                snapshot_id,
                manifest: tx.manifest,
                metadata: tx.metadata,
            })
            .collect();

        if !incomplete.is_empty() {
            warn!(count = incomplete.len(), "found incomplete WAL transactions");
        } else {
            info!("WAL recovery found no incomplete transactions");
        }
        Ok(incomplete)
    }

    /// Rewrite the WAL, eliding every record belonging to `snapshot_ids`
    /// (spec §4.5 R3d). Performed via tmp-file + rename for atomicity.
    pub fn compact(&self, snapshot_ids: &[String]) -> Result<()> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let tmp_path = self.path.with_extension("wal.compact.tmp");
        let mut tmp = File::create(&tmp_path)?;

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let sid = line
                .splitn(2, ':')
                .nth(1)
                .and_then(|rest| rest.splitn(2, ':').next())
                .unwrap_or("");
            if snapshot_ids.iter().any(|s| s == sid) {
                continue;
            }
            tmp.write_all(line.as_bytes())?;
            tmp.write_all(b"\n")?;
        }
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn wal_at(dir: &TempDir) -> Wal {
        Wal::open(dir.path().join("journal.wal")).unwrap()
    }

    #[test]
    fn committed_transaction_is_not_incomplete() {
        let dir = TempDir::new().unwrap();
        let wal = wal_at(&dir);
        wal.begin("snap_1").unwrap();
        wal.write_manifest("snap_1", b"{}").unwrap();
        wal.write_metadata("snap_1", b"{}").unwrap();
        wal.commit("snap_1").unwrap();
        assert!(wal.recover().unwrap().is_empty());
    }

    #[test]
    fn transaction_without_commit_is_incomplete() {
        let dir = TempDir::new().unwrap();
        let wal = wal_at(&dir);
        wal.begin("snap_crash").unwrap();
        wal.write_manifest("snap_crash", b"{\"a\":1}").unwrap();
        let incomplete = wal.recover().unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].snapshot_id, "snap_crash");
        assert_eq!(incomplete[0].manifest.as_deref(), Some(&b"{\"a\":1}"[..]));
    }

    #[test]
    fn aborted_transaction_is_not_incomplete() {
        let dir = TempDir::new().unwrap();
        let wal = wal_at(&dir);
        wal.begin("snap_2").unwrap();
        wal.abort("snap_2").unwrap();
        assert!(wal.recover().unwrap().is_empty());
    }

    #[test]
    fn compact_elides_only_named_transactions() {
        let dir = TempDir::new().unwrap();
        let wal = wal_at(&dir);
        wal.begin("snap_1").unwrap();
        wal.commit("snap_1").unwrap();
        wal.begin("snap_crash").unwrap();
        wal.write_manifest("snap_crash", b"{}").unwrap();

        wal.compact(&["snap_crash".to_string()]).unwrap();

        let contents = fs::read_to_string(dir.path().join("journal.wal")).unwrap();
        assert!(contents.contains("snap_1"));
        assert!(!contents.contains("snap_crash"));
    }
}
