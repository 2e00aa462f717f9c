//! Content-addressed chunk store (spec §4.3).

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::hash::digest;
use crate::{Error, Result};

/// Fixed chunk window size: 1 MiB.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// A content-addressed store of immutable byte chunks under `<root>/chunks`.
///
/// Chunks are fanned out one level by the first two hex nibbles of their
/// hash (`chunks/<ab>/<hash>`) to keep any single directory from growing
/// unbounded, the same layout the teacher's chunk store used.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    chunks_path: PathBuf,
}

impl ChunkStore {
    /// Open (and create if absent) the chunk store rooted at `store_root`.
    pub fn new<P: AsRef<Path>>(store_root: P) -> Result<Self> {
        let chunks_path = store_root.as_ref().join("chunks");
        fs::create_dir_all(&chunks_path)?;
        Ok(Self { chunks_path })
    }

    fn chunk_path(&self, hash: &str) -> PathBuf {
        let (prefix, rest) = hash.split_at(2);
        self.chunks_path.join(prefix).join(rest)
    }

    /// Write `bytes` to the store, returning `H(bytes)`. A no-op (besides
    /// the hash computation) if the chunk is already present — deduplication
    /// falls directly out of content addressing.
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = digest(bytes);
        let path = self.chunk_path(&hash);
        if path.exists() {
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        debug!(hash = %hash, size = bytes.len(), "wrote chunk");
        Ok(hash)
    }

    /// Read back the chunk addressed by `hash`.
    pub fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.chunk_path(hash);
        let mut file = File::open(&path).map_err(|_| Error::ChunkMissing {
            hash: hash.to_string(),
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// True iff the chunk file is present *and* its bytes rehash to `hash`.
    pub fn exists(&self, hash: &str) -> bool {
        let path = self.chunk_path(hash);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        let mut bytes = Vec::new();
        if file.read_to_end(&mut bytes).is_err() {
            return false;
        }
        digest(&bytes) == hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path()).unwrap();
        let data = b"hello chunk";
        let hash = store.put(data).unwrap();
        assert_eq!(hash, digest(data));
        assert_eq!(store.get(&hash).unwrap(), data);
    }

    #[test]
    fn second_put_of_same_bytes_creates_no_new_file() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path()).unwrap();
        let data = b"dedup me";
        let hash1 = store.put(data).unwrap();
        let path = store.chunk_path(&hash1);
        let mtime1 = fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let hash2 = store.put(data).unwrap();
        let mtime2 = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(mtime1, mtime2);
    }

    #[test]
    fn exists_is_false_for_content_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path()).unwrap();
        let hash = store.put(b"original").unwrap();
        assert!(store.exists(&hash));
        fs::write(store.chunk_path(&hash), b"tampered").unwrap();
        assert!(!store.exists(&hash));
    }

    #[test]
    fn get_missing_chunk_fails() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path()).unwrap();
        let err = store.get(&digest(b"never stored")).unwrap_err();
        assert!(matches!(err, Error::ChunkMissing { .. }));
    }

    #[test]
    fn fans_out_by_first_two_hex_nibbles() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path()).unwrap();
        let hash = store.put(b"fanout").unwrap();
        let expected = dir
            .path()
            .join("chunks")
            .join(&hash[..2])
            .join(&hash[2..]);
        assert!(expected.exists());
    }
}
