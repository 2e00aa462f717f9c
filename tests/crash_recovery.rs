//! Crash-recovery scenarios (spec §8 P9, S6), grounded on the original
//! prototype's `tests/test_crash_recovery.py`: a transaction left open in
//! the WAL must not leave a visible snapshot after the next startup.

use chainvault::snapshot::SnapshotManager;
use chainvault::wal::Wal;
use tempfile::TempDir;

fn open_manager(store_dir: &std::path::Path) -> SnapshotManager {
    let wal = Wal::open(store_dir.join("journal.wal")).unwrap();
    SnapshotManager::open(store_dir, wal).unwrap()
}

#[test]
fn process_killed_after_begin_leaves_no_snapshot_after_recovery() {
    let store_dir = TempDir::new().unwrap();
    let manager = open_manager(store_dir.path());

    // Simulate a crash between WAL BEGIN and COMMIT: the transaction is
    // opened and its manifest payload written, but never committed.
    let wal = Wal::open(store_dir.path().join("journal.wal")).unwrap();
    wal.begin("snap_9999999999_deadbeef").unwrap();
    wal.write_manifest("snap_9999999999_deadbeef", b"{}").unwrap();

    manager.recover().unwrap();

    assert!(manager.list().unwrap().is_empty());
}

#[test]
fn manifest_file_written_before_index_is_removed_on_recovery() {
    let store_dir = TempDir::new().unwrap();
    let manager = open_manager(store_dir.path());

    let manifest_path = store_dir
        .path()
        .join("snapshots")
        .join("snap_1_aaaaaaaa.manifest");
    std::fs::write(&manifest_path, b"{}").unwrap();

    let wal = Wal::open(store_dir.path().join("journal.wal")).unwrap();
    wal.begin("snap_1_aaaaaaaa").unwrap();
    wal.write_manifest("snap_1_aaaaaaaa", b"{}").unwrap();

    manager.recover().unwrap();

    assert!(!manifest_path.exists());
    assert!(manager.list().unwrap().is_empty());
}

#[test]
fn recovery_is_idempotent_across_repeated_startups() {
    let store_dir = TempDir::new().unwrap();
    let manager = open_manager(store_dir.path());

    let wal = Wal::open(store_dir.path().join("journal.wal")).unwrap();
    wal.begin("snap_crash").unwrap();

    manager.recover().unwrap();
    // A second recovery pass over an already-compacted WAL must be a no-op.
    manager.recover().unwrap();

    assert!(manager.list().unwrap().is_empty());
}

#[test]
fn committed_snapshot_survives_a_subsequent_recovery_pass() {
    let store_dir = TempDir::new().unwrap();
    let source_dir = TempDir::new().unwrap();
    std::fs::write(source_dir.path().join("a.txt"), b"durable").unwrap();
    let manager = open_manager(store_dir.path());

    let record = manager.create_snapshot(source_dir.path(), None).unwrap();
    manager.recover().unwrap();

    let listed = manager.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);
}
