//! Snapshot naming shared by the local and remote stores.
//!
//! Names are `backup_<YYYYMMDD_HHMMSS>.json`, so sorting by name
//! descending equals sorting by creation time descending.

use chrono::{DateTime, Local};
use std::fmt;

pub const BACKUP_PREFIX: &str = "backup_";
pub const BACKUP_SUFFIX: &str = ".json";

/// Identifier of one snapshot: its file/object name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn backup_file_name(at: DateTime<Local>) -> String {
    format!("{}{}{}", BACKUP_PREFIX, at.format("%Y%m%d_%H%M%S"), BACKUP_SUFFIX)
}

/// Collision suffix: `backup_X.json` becomes `backup_X_<n>.json`.
/// The suffixed name sorts after the plain one, preserving creation order.
pub fn disambiguated_file_name(base: &str, n: u32) -> String {
    match base.strip_suffix(BACKUP_SUFFIX) {
        Some(stem) => format!("{}_{}{}", stem, n, BACKUP_SUFFIX),
        None => format!("{}_{}", base, n),
    }
}

pub fn is_backup_file_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX)
}
