//! The durable state orchestrator.
//!
//! Callers never touch [`LocalStore`] or [`RemoteStore`] directly; they
//! load, save, back up and restore through a [`StateManager`], which owns
//! snapshot cadence, destination fan-out, retention pruning and the
//! disaster-recovery chain.

use crate::config::{Destination, StoreConfig};
use crate::core::naming::backup_file_name;
use crate::core::{Document, Result, SnapshotId, StoreError};
use crate::local::LocalStore;
use crate::remote::{CredentialBroker, HttpTransport, RemoteObjectRef, RemoteStore};
use chrono::Local;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    /// Every requested destination succeeded.
    Full,
    /// The local write succeeded but the remote side failed; callers may
    /// keep operating on local-only persistence.
    Partial { failed: Destination, reason: String },
}

#[derive(Debug, Clone)]
pub struct SaveReport {
    pub destination: Destination,
    pub status: SaveStatus,
    /// Pre-overwrite snapshot of the previous primary, when one existed
    pub local_snapshot: Option<SnapshotId>,
    /// Name of the uploaded remote object, when the remote was reached
    pub remote_object: Option<String>,
}

impl SaveReport {
    fn full(destination: Destination) -> Self {
        Self {
            destination,
            status: SaveStatus::Full,
            local_snapshot: None,
            remote_object: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.status == SaveStatus::Full
    }
}

/// Where `load` found the returned document.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadSource {
    Primary,
    LocalSnapshot(String),
    RemoteSnapshot(String),
    /// Nothing usable anywhere: the document was invented from the
    /// configured shape. The only path that fabricates data; callers
    /// should warn the operator instead of proceeding silently.
    DefaultShape,
}

#[derive(Debug)]
pub struct LoadReport {
    pub document: Document,
    pub source: LoadSource,
}

#[derive(Debug, Clone, Copy)]
pub struct PruneReport {
    pub local_removed: usize,
    pub remote_removed: usize,
}

impl LoadReport {
    pub fn recovered_from_default(&self) -> bool {
        self.source == LoadSource::DefaultShape
    }
}

// ============================================================================
// State Manager
// ============================================================================

pub struct StateManager {
    config: StoreConfig,
    local: LocalStore,
    remote: Option<RemoteStore>,
    /// Serializes saves against each other and against recovering loads.
    /// Plain loads share the read half.
    lock: RwLock<()>,
}

impl StateManager {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let remote = match &config.remote {
            Some(rc) if rc.enabled() => {
                let mut rc = rc.clone();
                rc.token_cache = Some(rc.resolved_token_cache(&config.data_dir));
                let broker = Arc::new(CredentialBroker::new(&rc)?);
                let transport = HttpTransport::new(&rc.base_url, &rc.prefix, rc.timeout)
                    .map_err(|e| StoreError::RemoteUnavailable(e.to_string()))?;
                Some(RemoteStore::new(broker, Box::new(transport)))
            }
            _ => None,
        };
        if config.destination.includes_remote() && remote.is_none() {
            return Err(StoreError::Config(format!(
                "destination '{}' requires a configured remote",
                config.destination
            )));
        }
        Ok(Self::assemble(config, remote))
    }

    /// Builds the manager around an externally constructed remote store.
    /// Used with custom transports.
    pub fn with_remote_store(config: StoreConfig, remote: RemoteStore) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, Some(remote)))
    }

    fn assemble(config: StoreConfig, remote: Option<RemoteStore>) -> Self {
        let local = LocalStore::new(config.primary_path(), config.snapshots_path());
        Self {
            config,
            local,
            remote,
            lock: RwLock::new(()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn primary_path(&self) -> &Path {
        self.local.primary_path()
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    // ------------------------------------------------------------------
    // save
    // ------------------------------------------------------------------

    pub fn save(&self, doc: Document) -> Result<SaveReport> {
        self.save_to(doc, self.config.destination)
    }

    /// All-or-nothing per destination: the local side either fully succeeds
    /// or the whole save fails; a remote failure alongside a local success
    /// degrades to a partial result.
    pub fn save_to(&self, mut doc: Document, destination: Destination) -> Result<SaveReport> {
        let _guard = self.lock.write()?;

        doc.backfill(&self.config.shape);
        let assigned = doc.assign_missing_ids(&self.config.id_collections);
        if assigned > 0 {
            debug!(assigned, "assigned ids to collection entries");
        }

        let mut report = SaveReport::full(destination);

        if destination.includes_local() {
            report.local_snapshot = self.snapshot_current_primary()?;
            self.local.write(&doc)?;
            if let Err(e) = self.local.prune_snapshots(self.config.local_keep) {
                warn!("local snapshot pruning failed: {}", e);
            }
        }

        if destination.includes_remote() {
            match self.push_remote(&doc) {
                Ok(name) => report.remote_object = Some(name),
                Err(e) if destination == Destination::Remote => return Err(e),
                Err(e) => {
                    warn!("remote backup failed, continuing on local persistence: {}", e);
                    report.status = SaveStatus::Partial {
                        failed: Destination::Remote,
                        reason: e.to_string(),
                    };
                }
            }
        }

        Ok(report)
    }

    /// Snapshot whatever primary is currently readable. Absence is normal
    /// (first save); corruption is logged and skipped so a save can still
    /// repair a damaged primary.
    fn snapshot_current_primary(&self) -> Result<Option<SnapshotId>> {
        match self.local.read() {
            Ok(current) => Ok(Some(self.local.snapshot(&current)?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(StoreError::Corrupt(reason)) => {
                warn!("primary unreadable, skipping pre-save snapshot: {}", reason);
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// Every remote save is a dated snapshot; the remote "current" is
    /// simply the newest object by name.
    fn push_remote(&self, doc: &Document) -> Result<String> {
        let remote = self.require_remote()?;
        let bytes = doc.to_pretty_bytes()?;
        let name = backup_file_name(Local::now());
        remote.upload(&name, &bytes)?;
        info!(name = %name, "uploaded remote snapshot");
        match self.prune_remote(remote) {
            Ok(removed) if removed > 0 => debug!(removed, "pruned remote snapshots"),
            Ok(_) => {}
            Err(e) => warn!("remote snapshot pruning failed: {}", e),
        }
        Ok(name)
    }

    fn prune_remote(&self, remote: &RemoteStore) -> Result<usize> {
        let objects = remote.list()?;
        let mut removed = 0;
        for object in objects.iter().skip(self.config.remote_keep) {
            remote.delete(&object.name)?;
            removed += 1;
        }
        Ok(removed)
    }

    fn require_remote(&self) -> Result<&RemoteStore> {
        self.remote.as_ref().ok_or_else(|| {
            StoreError::RemoteUnavailable("remote backup is not configured".to_string())
        })
    }

    // ------------------------------------------------------------------
    // load
    // ------------------------------------------------------------------

    /// Returns the primary document when it is usable, otherwise walks the
    /// recovery chain: newest local snapshot, newest remote object, and as
    /// a last resort a fresh default-shaped document.
    pub fn load(&self) -> Result<LoadReport> {
        {
            let _guard = self.lock.read()?;
            match self.local.read() {
                Ok(doc) if !doc.is_empty_shell(&self.config.shape) => {
                    return Ok(self.finish_load(doc, LoadSource::Primary));
                }
                Ok(_) => debug!("primary document is an empty shell, attempting recovery"),
                Err(StoreError::NotFound(_)) => debug!("no primary document, attempting recovery"),
                // Corrupt content and disk errors are both recoverable on
                // the load path; only saves treat local I/O as fatal
                Err(e) => warn!("primary document unreadable, attempting recovery: {}", e),
            }
        }
        let _guard = self.lock.write()?;
        self.recover_locked()
    }

    fn finish_load(&self, mut doc: Document, source: LoadSource) -> LoadReport {
        doc.backfill(&self.config.shape);
        // Ids are assigned in memory only; they reach disk with the
        // caller's next save.
        doc.assign_missing_ids(&self.config.id_collections);
        LoadReport { document: doc, source }
    }

    fn recover_locked(&self) -> Result<LoadReport> {
        // The primary may have been repaired while this caller waited for
        // the write half of the lock.
        if let Ok(doc) = self.local.read() {
            if !doc.is_empty_shell(&self.config.shape) {
                return Ok(self.finish_load(doc, LoadSource::Primary));
            }
        }

        for id in self.local.list_snapshots()? {
            match self.local.read_snapshot(&id) {
                Ok(doc) => {
                    info!(snapshot = %id, "recovering state from local snapshot");
                    self.repair_primary(&doc);
                    return Ok(self.finish_load(doc, LoadSource::LocalSnapshot(id.name().to_string())));
                }
                Err(e) => warn!(snapshot = %id, "skipping unreadable snapshot: {}", e),
            }
        }

        if let Some(remote) = self.remote.as_ref() {
            match self.recover_from_remote(remote) {
                Ok(Some((doc, name))) => {
                    info!(object = %name, "recovering state from remote snapshot");
                    self.repair_primary(&doc);
                    return Ok(self.finish_load(doc, LoadSource::RemoteSnapshot(name)));
                }
                Ok(None) => debug!("no usable remote snapshots"),
                Err(e) => warn!("remote recovery unavailable: {}", e),
            }
        }

        info!("no usable primary or snapshots; starting from the default document shape");
        Ok(LoadReport {
            document: Document::default_shaped(&self.config.shape),
            source: LoadSource::DefaultShape,
        })
    }

    fn recover_from_remote(&self, remote: &RemoteStore) -> Result<Option<(Document, String)>> {
        for object in remote.list()? {
            match remote
                .download(&object.name)
                .and_then(|bytes| Document::from_slice(&bytes))
            {
                Ok(doc) => return Ok(Some((doc, object.name))),
                Err(e) => warn!(object = %object.name, "skipping unusable remote snapshot: {}", e),
            }
        }
        Ok(None)
    }

    /// Writing the recovered document back makes subsequent loads fast.
    /// Failure leaves this load's result intact, so it only warns.
    fn repair_primary(&self, doc: &Document) {
        if let Err(e) = self.local.write(doc) {
            warn!("failed to repair primary from snapshot: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // backup & restore
    // ------------------------------------------------------------------

    pub fn backup(&self) -> Result<SaveReport> {
        self.backup_to(self.config.destination)
    }

    /// Snapshots the current primary to the requested destinations without
    /// touching the primary itself.
    pub fn backup_to(&self, destination: Destination) -> Result<SaveReport> {
        let _guard = self.lock.write()?;

        let current = match self.local.read() {
            Ok(doc) => doc,
            Err(StoreError::NotFound(_)) => {
                return Err(StoreError::NotFound(
                    "no primary document to back up".to_string(),
                ))
            }
            Err(other) => return Err(other),
        };

        let mut report = SaveReport::full(destination);

        if destination.includes_local() {
            report.local_snapshot = Some(self.local.snapshot(&current)?);
            if let Err(e) = self.local.prune_snapshots(self.config.local_keep) {
                warn!("local snapshot pruning failed: {}", e);
            }
        }

        if destination.includes_remote() {
            match self.push_remote(&current) {
                Ok(name) => report.remote_object = Some(name),
                Err(e) if destination == Destination::Remote => return Err(e),
                Err(e) => {
                    warn!("remote backup failed: {}", e);
                    report.status = SaveStatus::Partial {
                        failed: Destination::Remote,
                        reason: e.to_string(),
                    };
                }
            }
        }

        Ok(report)
    }

    /// Promotes a local snapshot to primary. The current primary is
    /// snapshotted first as a safety net; the source snapshot is never
    /// deleted.
    pub fn restore_local(&self, id: &SnapshotId) -> Result<Document> {
        let _guard = self.lock.write()?;
        self.snapshot_current_primary()?;
        let doc = self.local.read_snapshot(id)?;
        info!(snapshot = %id, "restoring primary from local snapshot");
        self.promote(doc)
    }

    /// Promotes a remote snapshot to primary, same safety-net semantics as
    /// [`Self::restore_local`].
    pub fn restore_remote(&self, name: &str) -> Result<Document> {
        let _guard = self.lock.write()?;
        let remote = self.require_remote()?;
        self.snapshot_current_primary()?;
        let bytes = remote.download(name)?;
        let doc = Document::from_slice(&bytes)?;
        info!(object = %name, "restoring primary from remote snapshot");
        self.promote(doc)
    }

    fn promote(&self, mut doc: Document) -> Result<Document> {
        doc.backfill(&self.config.shape);
        doc.assign_missing_ids(&self.config.id_collections);
        self.local.write(&doc)?;
        if let Err(e) = self.local.prune_snapshots(self.config.local_keep) {
            warn!("local snapshot pruning failed: {}", e);
        }
        Ok(doc)
    }

    /// Applies the retention limits immediately. Remote pruning failures
    /// degrade to a warning, as everywhere else.
    pub fn prune(&self) -> Result<PruneReport> {
        let _guard = self.lock.write()?;
        let local_removed = self.local.prune_snapshots(self.config.local_keep)?;
        let remote_removed = match self.remote.as_ref() {
            Some(remote) => match self.prune_remote(remote) {
                Ok(removed) => removed,
                Err(e) => {
                    warn!("remote snapshot pruning failed: {}", e);
                    0
                }
            },
            None => 0,
        };
        Ok(PruneReport {
            local_removed,
            remote_removed,
        })
    }

    // ------------------------------------------------------------------
    // introspection
    // ------------------------------------------------------------------

    /// Local snapshots, newest first.
    pub fn local_snapshots(&self) -> Result<Vec<SnapshotId>> {
        let _guard = self.lock.read()?;
        self.local.list_snapshots()
    }

    /// Remote snapshots, newest first.
    pub fn remote_snapshots(&self) -> Result<Vec<RemoteObjectRef>> {
        self.require_remote()?.list()
    }
}
