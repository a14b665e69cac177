//! Integration tests for the local save/load/backup/restore lifecycle.

use durastore::{
    Destination, Document, LoadSource, SaveStatus, SnapshotId, StateManager, StoreConfig,
    StoreError,
};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn manager_in(dir: &TempDir) -> StateManager {
    StateManager::new(StoreConfig::new(dir.path())).unwrap()
}

fn doc(value: serde_json::Value) -> Document {
    Document::from_value(value).unwrap()
}

#[test]
fn test_save_load_round_trip_with_backfill() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    let report = manager
        .save(doc(json!({"players": [{"id": "1", "name": "Alice"}]})))
        .unwrap();
    assert!(report.is_full());

    let loaded = manager.load().unwrap();
    assert_eq!(loaded.source, LoadSource::Primary);
    assert!(!loaded.recovered_from_default());
    assert_eq!(
        loaded.document.get("players"),
        Some(&json!([{"id": "1", "name": "Alice"}]))
    );
    // Missing top-level collections come back as empty defaults
    assert_eq!(loaded.document.get("trainings"), Some(&json!({})));
    assert_eq!(loaded.document.get("games"), Some(&json!([])));
}

#[test]
fn test_save_assigns_missing_player_ids() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    manager
        .save(doc(json!({"players": [{"name": "NoId"}]})))
        .unwrap();

    let loaded = manager.load().unwrap();
    let players = loaded.document.get("players").unwrap().as_array().unwrap();
    assert!(players[0]["id"].is_string());
}

#[test]
fn test_snapshot_before_every_overwrite() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    // The first save has no previous primary to snapshot
    let first = manager.save(doc(json!({"players": [{"id": "0"}]}))).unwrap();
    assert!(first.local_snapshot.is_none());
    assert!(manager.local_snapshots().unwrap().is_empty());

    for i in 1..=4 {
        let report = manager
            .save(doc(json!({"players": [{"id": i.to_string()}]})))
            .unwrap();
        assert!(report.local_snapshot.is_some());
    }

    let snapshots = manager.local_snapshots().unwrap();
    assert_eq!(snapshots.len(), 4);

    // Newest first; the newest snapshot holds the state before the last save
    let newest = manager.local_snapshots().unwrap().remove(0);
    let restored = manager.restore_local(&newest).unwrap();
    assert_eq!(restored.get("players"), Some(&json!([{"id": "3"}])));
}

#[test]
fn test_local_retention_limit() {
    let dir = TempDir::new().unwrap();
    let manager = StateManager::new(StoreConfig::new(dir.path()).local_keep(3)).unwrap();

    for i in 0..7 {
        manager
            .save(doc(json!({"players": [{"id": i.to_string()}]})))
            .unwrap();
    }
    assert_eq!(manager.local_snapshots().unwrap().len(), 3);
}

#[test]
fn test_disaster_recovery_from_corrupt_primary() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    manager.save(doc(json!({"players": [{"id": "v1"}]}))).unwrap();
    manager.save(doc(json!({"players": [{"id": "v2"}]}))).unwrap();

    // Truncate the primary mid-document
    let primary = manager.primary_path().to_path_buf();
    fs::write(&primary, b"{\"players\": [{\"id\":").unwrap();

    let loaded = manager.load().unwrap();
    assert!(matches!(loaded.source, LoadSource::LocalSnapshot(_)));
    // The newest snapshot holds the state before the second save
    assert_eq!(loaded.document.get("players"), Some(&json!([{"id": "v1"}])));

    // The primary was repaired to match the recovered document
    let repaired = Document::from_slice(&fs::read(&primary).unwrap()).unwrap();
    assert_eq!(repaired.get("players"), Some(&json!([{"id": "v1"}])));
    assert_eq!(manager.load().unwrap().source, LoadSource::Primary);
}

#[test]
fn test_recovery_from_single_named_snapshot() {
    let dir = TempDir::new().unwrap();
    let snapshots_dir = dir.path().join("backups");
    fs::create_dir_all(&snapshots_dir).unwrap();
    fs::write(
        snapshots_dir.join("backup_20240101_120000.json"),
        serde_json::to_vec_pretty(&json!({"players": [{"id": "1"}]})).unwrap(),
    )
    .unwrap();

    let manager = manager_in(&dir);
    assert!(!manager.primary_path().exists());

    let loaded = manager.load().unwrap();
    assert_eq!(
        loaded.source,
        LoadSource::LocalSnapshot("backup_20240101_120000.json".to_string())
    );
    assert_eq!(loaded.document.get("players"), Some(&json!([{"id": "1"}])));
    assert!(manager.primary_path().exists());
}

#[test]
fn test_empty_shell_primary_falls_back_to_snapshot() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    manager.save(doc(json!({"players": [{"id": "1"}]}))).unwrap();
    // Overwriting with an empty shell snapshots the populated state first
    manager.save(doc(json!({"players": []}))).unwrap();

    let loaded = manager.load().unwrap();
    assert!(matches!(loaded.source, LoadSource::LocalSnapshot(_)));
    assert_eq!(loaded.document.get("players"), Some(&json!([{"id": "1"}])));
}

#[test]
fn test_default_shape_when_nothing_exists() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    let loaded = manager.load().unwrap();
    assert_eq!(loaded.source, LoadSource::DefaultShape);
    assert!(loaded.recovered_from_default());
    assert_eq!(loaded.document.get("players"), Some(&json!([])));
    assert_eq!(loaded.document.get("trainings"), Some(&json!({})));
    // Inventing data never touches the disk
    assert!(!manager.primary_path().exists());
}

#[test]
fn test_restore_local_with_safety_snapshot() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    manager.save(doc(json!({"players": [{"id": "old"}]}))).unwrap();
    manager.save(doc(json!({"players": [{"id": "new"}]}))).unwrap();

    let target = manager.local_snapshots().unwrap().remove(0);
    let restored = manager.restore_local(&target).unwrap();
    assert_eq!(restored.get("players"), Some(&json!([{"id": "old"}])));

    let loaded = manager.load().unwrap();
    assert_eq!(loaded.source, LoadSource::Primary);
    assert_eq!(loaded.document.get("players"), Some(&json!([{"id": "old"}])));

    // The source snapshot survives and the pre-restore primary was
    // snapshotted as a safety net
    let snapshots = manager.local_snapshots().unwrap();
    assert!(snapshots.contains(&target));
    assert_eq!(snapshots.len(), 2);
}

#[test]
fn test_restore_missing_snapshot_is_not_found() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    manager.save(doc(json!({"players": [{"id": "1"}]}))).unwrap();
    let result = manager.restore_local(&SnapshotId::new("backup_19990101_000000.json"));
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[test]
fn test_save_both_without_remote_is_partial() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    let report = manager
        .save_to(doc(json!({"players": []})), Destination::Both)
        .unwrap();
    match report.status {
        SaveStatus::Partial { failed, .. } => assert_eq!(failed, Destination::Remote),
        SaveStatus::Full => panic!("expected partial success"),
    }

    // Local persistence still works
    assert!(manager.primary_path().exists());
}

#[test]
fn test_save_remote_only_without_remote_fails() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    let result = manager.save_to(doc(json!({"players": []})), Destination::Remote);
    assert!(matches!(result, Err(StoreError::RemoteUnavailable(_))));
}

#[test]
fn test_backup_leaves_primary_untouched() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);

    manager.save(doc(json!({"players": [{"id": "1"}]}))).unwrap();
    let before = fs::read(manager.primary_path()).unwrap();

    let report = manager.backup().unwrap();
    assert!(report.is_full());
    assert!(report.local_snapshot.is_some());

    assert_eq!(fs::read(manager.primary_path()).unwrap(), before);
    assert_eq!(manager.local_snapshots().unwrap().len(), 1);
}

#[test]
fn test_backup_without_primary_is_not_found() {
    let dir = TempDir::new().unwrap();
    let manager = manager_in(&dir);
    assert!(matches!(manager.backup(), Err(StoreError::NotFound(_))));
}

#[test]
fn test_prune_applies_retention() {
    let dir = TempDir::new().unwrap();
    let manager = StateManager::new(StoreConfig::new(dir.path()).local_keep(2)).unwrap();

    manager.save(doc(json!({"players": [{"id": "1"}]}))).unwrap();
    for _ in 0..4 {
        manager.backup().unwrap();
    }

    let report = manager.prune().unwrap();
    assert_eq!(report.remote_removed, 0);
    assert!(manager.local_snapshots().unwrap().len() <= 2);
}

#[test]
fn test_remote_destination_requires_remote_config() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(dir.path()).destination(Destination::Both);
    assert!(matches!(
        StateManager::new(config),
        Err(StoreError::Config(_))
    ));
}
