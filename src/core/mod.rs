pub mod document;
pub mod error;
pub mod naming;

pub use document::{CollectionKind, Document, DocumentShape};
pub use error::{Result, StoreError};
pub use naming::SnapshotId;
