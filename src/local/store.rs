//! Local disk backend: one primary JSON file plus a snapshots directory.

use crate::core::naming::{
    backup_file_name, disambiguated_file_name, is_backup_file_name, BACKUP_SUFFIX,
};
use crate::core::{Document, Result, SnapshotId, StoreError};
use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub struct LocalStore {
    primary_path: PathBuf,
    snapshots_dir: PathBuf,
}

impl LocalStore {
    pub fn new(primary_path: impl Into<PathBuf>, snapshots_dir: impl Into<PathBuf>) -> Self {
        Self {
            primary_path: primary_path.into(),
            snapshots_dir: snapshots_dir.into(),
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary_path
    }

    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    pub fn primary_exists(&self) -> bool {
        self.primary_path.exists()
    }

    /// Reads the primary document. `NotFound` when the file is absent,
    /// `Corrupt` when present but empty or unparseable.
    pub fn read(&self) -> Result<Document> {
        read_document(&self.primary_path)
    }

    /// Serializes to a temporary file in the same directory, then atomically
    /// renames over the primary path. A half-written primary is never
    /// visible.
    pub fn write(&self, doc: &Document) -> Result<()> {
        let parent = self
            .primary_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)
            .map_err(|e| StoreError::LocalIo(format!("failed to create data directory: {}", e)))?;

        let mut temp = NamedTempFile::new_in(&parent)
            .map_err(|e| StoreError::LocalIo(format!("failed to create temp file: {}", e)))?;
        temp.write_all(&doc.to_pretty_bytes()?)
            .map_err(|e| StoreError::LocalIo(format!("failed to write document: {}", e)))?;
        temp.flush()
            .map_err(|e| StoreError::LocalIo(format!("failed to flush document: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::LocalIo(format!("failed to sync document: {}", e)))?;
        temp.persist(&self.primary_path)
            .map_err(|e| StoreError::LocalIo(format!("failed to replace primary: {}", e)))?;
        Ok(())
    }

    /// Writes `doc` as a new timestamped snapshot. Existing snapshots are
    /// never overwritten; a same-second collision gets a numeric suffix.
    pub fn snapshot(&self, doc: &Document) -> Result<SnapshotId> {
        fs::create_dir_all(&self.snapshots_dir).map_err(|e| {
            StoreError::LocalIo(format!("failed to create snapshots directory: {}", e))
        })?;

        let name = self.next_snapshot_name(&backup_file_name(Local::now()));
        let path = self.snapshots_dir.join(&name);

        let mut temp = NamedTempFile::new_in(&self.snapshots_dir)
            .map_err(|e| StoreError::LocalIo(format!("failed to create temp file: {}", e)))?;
        temp.write_all(&doc.to_pretty_bytes()?)
            .map_err(|e| StoreError::LocalIo(format!("failed to write snapshot: {}", e)))?;
        temp.flush()
            .map_err(|e| StoreError::LocalIo(format!("failed to flush snapshot: {}", e)))?;
        temp.persist_noclobber(&path)
            .map_err(|e| StoreError::LocalIo(format!("failed to place snapshot: {}", e)))?;

        Ok(SnapshotId::new(name))
    }

    /// Resolves a same-second collision by suffixing one past the highest
    /// existing sibling, so names stay in creation order even after a
    /// pruned base name frees up.
    fn next_snapshot_name(&self, base: &str) -> String {
        let stem = base.strip_suffix(BACKUP_SUFFIX).unwrap_or(base);
        let sibling_prefix = format!("{}_", stem);

        let mut base_taken = false;
        let mut max_suffix: Option<u32> = None;
        if let Ok(entries) = fs::read_dir(&self.snapshots_dir) {
            for entry in entries.flatten() {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if name == base {
                    base_taken = true;
                } else if let Some(suffix) = name
                    .strip_prefix(&sibling_prefix)
                    .and_then(|rest| rest.strip_suffix(BACKUP_SUFFIX))
                    .and_then(|digits| digits.parse::<u32>().ok())
                {
                    max_suffix = Some(max_suffix.map_or(suffix, |m| m.max(suffix)));
                }
            }
        }

        match (base_taken, max_suffix) {
            (false, None) => base.to_string(),
            (_, Some(n)) => disambiguated_file_name(base, n + 1),
            (true, None) => disambiguated_file_name(base, 1),
        }
    }

    /// All snapshots, newest first. A missing directory means no snapshots.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        if !self.snapshots_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.snapshots_dir).map_err(|e| {
            StoreError::LocalIo(format!("failed to read snapshots directory: {}", e))
        })?;

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                StoreError::LocalIo(format!("failed to read snapshots directory: {}", e))
            })?;
            if let Some(name) = entry.file_name().to_str() {
                if is_backup_file_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_by(|a, b| b.cmp(a));
        Ok(names.into_iter().map(SnapshotId::new).collect())
    }

    pub fn read_snapshot(&self, id: &SnapshotId) -> Result<Document> {
        read_document(&self.snapshots_dir.join(id.name()))
    }

    pub fn snapshot_path(&self, id: &SnapshotId) -> PathBuf {
        self.snapshots_dir.join(id.name())
    }

    /// Deletes all but the `keep` newest snapshots. Returns how many were
    /// removed. Idempotent; a vanished file during removal is not an error.
    pub fn prune_snapshots(&self, keep: usize) -> Result<usize> {
        let snapshots = self.list_snapshots()?;
        let mut removed = 0;
        for id in snapshots.iter().skip(keep) {
            match fs::remove_file(self.snapshots_dir.join(id.name())) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StoreError::LocalIo(format!(
                        "failed to remove snapshot {}: {}",
                        id, e
                    )))
                }
            }
        }
        Ok(removed)
    }
}

fn read_document(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.display().to_string()));
    }
    let bytes = fs::read(path)
        .map_err(|e| StoreError::LocalIo(format!("failed to read {}: {}", path.display(), e)))?;
    Document::from_slice(&bytes)
        .map_err(|e| annotate_with_path(e, path))
}

fn annotate_with_path(err: StoreError, path: &Path) -> StoreError {
    match err {
        StoreError::Corrupt(reason) => {
            StoreError::Corrupt(format!("{}: {}", path.display(), reason))
        }
        other => other,
    }
}
