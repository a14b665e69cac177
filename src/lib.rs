// ============================================================================
// Durastore Library
// ============================================================================

//! Durable state management for a single-document JSON application state.
//!
//! One primary file on local disk, timestamped snapshots before every
//! overwrite, optional remote blob backups with OAuth2 refresh-token
//! renewal, and a disaster-recovery chain that rebuilds the primary from
//! the newest usable snapshot, local or remote.
//!
//! # Examples
//!
//! ```no_run
//! use durastore::{Document, StateManager, StoreConfig};
//! use serde_json::json;
//!
//! # fn main() -> durastore::Result<()> {
//! let manager = StateManager::new(StoreConfig::new("data"))?;
//!
//! let mut state = manager.load()?.document;
//! state.insert("players", json!([{"name": "Alice"}]));
//! let report = manager.save(state)?;
//! assert!(report.is_full());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod local;
pub mod manager;
pub mod remote;

// Re-export the public surface for convenience
pub use crate::config::{AuthConfig, Destination, RemoteConfig, StoreConfig};
pub use crate::core::{CollectionKind, Document, DocumentShape, Result, SnapshotId, StoreError};
pub use crate::local::LocalStore;
pub use crate::manager::{LoadReport, LoadSource, PruneReport, SaveReport, SaveStatus, StateManager};
pub use crate::remote::{
    Credential, CredentialBroker, HttpTransport, RemoteObjectRef, RemoteStore, RemoteTransport,
    Session, TransportError, TransportResult,
};
