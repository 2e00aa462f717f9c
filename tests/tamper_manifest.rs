//! Manifest-tamper detection (spec §8 P6), grounded on the original
//! prototype's `tests/test_tamper_manifest.py`.

use chainvault::snapshot::{SnapshotManager, VerifyOutcome};
use chainvault::wal::Wal;
use tempfile::TempDir;

fn open_manager(store_dir: &std::path::Path) -> SnapshotManager {
    let wal = Wal::open(store_dir.join("journal.wal")).unwrap();
    SnapshotManager::open(store_dir, wal).unwrap()
}

fn manifest_path(store_dir: &std::path::Path, snapshot_id: &str) -> std::path::PathBuf {
    store_dir
        .join("snapshots")
        .join(format!("{snapshot_id}.manifest"))
}

#[test]
fn editing_a_path_field_fails_verify_with_manifest_corrupt() {
    let store_dir = TempDir::new().unwrap();
    let source_dir = TempDir::new().unwrap();
    let manager = open_manager(store_dir.path());

    std::fs::write(source_dir.path().join("a.txt"), b"original").unwrap();
    let record = manager.create_snapshot(source_dir.path(), None).unwrap();

    let path = manifest_path(store_dir.path(), &record.id);
    let text = std::fs::read_to_string(&path).unwrap();
    let tampered = text.replacen("a.txt", "z.txt", 1);
    std::fs::write(&path, tampered).unwrap();

    match manager.verify(&record.id).unwrap() {
        VerifyOutcome::ManifestCorrupt(reason) => assert!(reason.contains("manifest_hash")),
        other => panic!("expected ManifestCorrupt, got {other:?}"),
    }
}

#[test]
fn truncating_the_manifest_file_fails_verify_with_manifest_corrupt() {
    let store_dir = TempDir::new().unwrap();
    let source_dir = TempDir::new().unwrap();
    let manager = open_manager(store_dir.path());

    std::fs::write(source_dir.path().join("a.txt"), b"content").unwrap();
    let record = manager.create_snapshot(source_dir.path(), None).unwrap();

    let path = manifest_path(store_dir.path(), &record.id);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() / 2);
    std::fs::write(&path, bytes).unwrap();

    match manager.verify(&record.id).unwrap() {
        VerifyOutcome::ManifestCorrupt(_) => {}
        other => panic!("expected ManifestCorrupt, got {other:?}"),
    }
}

#[test]
fn missing_manifest_file_fails_verify_with_manifest_corrupt() {
    let store_dir = TempDir::new().unwrap();
    let source_dir = TempDir::new().unwrap();
    let manager = open_manager(store_dir.path());

    std::fs::write(source_dir.path().join("a.txt"), b"content").unwrap();
    let record = manager.create_snapshot(source_dir.path(), None).unwrap();

    std::fs::remove_file(manifest_path(store_dir.path(), &record.id)).unwrap();

    match manager.verify(&record.id).unwrap() {
        VerifyOutcome::ManifestCorrupt(reason) => assert!(reason.contains("missing")),
        other => panic!("expected ManifestCorrupt, got {other:?}"),
    }
}
