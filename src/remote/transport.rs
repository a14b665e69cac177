//! Transport seam for the remote blob namespace.
//!
//! [`RemoteTransport`] is the pluggable backend boundary: the production
//! [`HttpTransport`] talks to a blob storage HTTP API, tests substitute
//! in-memory implementations. Transport errors stay their own type so the
//! store above can tell an authentication rejection (retry after refresh)
//! from everything else.

use crate::remote::auth::Session;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("transport failure: {0}")]
    Failed(String),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Metadata for one remotely stored snapshot, as returned by listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteObjectRef {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// One remote namespace of named blobs.
pub trait RemoteTransport: Send + Sync {
    /// Overwrite-by-name; uploading the same name twice is not an error.
    fn upload(&self, session: &Session, name: &str, bytes: &[u8]) -> TransportResult<()>;

    fn download(&self, session: &Session, name: &str) -> TransportResult<Vec<u8>>;

    /// All objects in the namespace, newest first.
    fn list(&self, session: &Session) -> TransportResult<Vec<RemoteObjectRef>>;

    fn delete(&self, session: &Session, name: &str) -> TransportResult<()>;
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// Blob storage over HTTP: `PUT`/`GET`/`DELETE` on `<base><prefix>/<name>`,
/// `GET <base><prefix>` for a JSON listing. Bearer authentication from the
/// session token; every request bounded by the configured timeout.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    prefix: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, prefix: &str, timeout: Duration) -> TransportResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Failed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix: prefix.to_string(),
        })
    }

    fn namespace_url(&self) -> String {
        format!("{}{}", self.base_url, self.prefix)
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self.namespace_url(), name)
    }
}

fn classify_status(status: StatusCode, what: &str) -> TransportError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransportError::AuthRejected(format!("{}: {}", what, status))
        }
        StatusCode::NOT_FOUND => TransportError::NotFound(what.to_string()),
        other => TransportError::Failed(format!("{}: {}", what, other)),
    }
}

fn send_error(what: &str, err: reqwest::Error) -> TransportError {
    // Timeouts land here and are treated like any other transport failure
    TransportError::Failed(format!("{}: {}", what, err))
}

impl RemoteTransport for HttpTransport {
    fn upload(&self, session: &Session, name: &str, bytes: &[u8]) -> TransportResult<()> {
        debug!(name, size = bytes.len(), "uploading blob");
        let response = self
            .client
            .put(self.object_url(name))
            .bearer_auth(session.token())
            .body(bytes.to_vec())
            .send()
            .map_err(|e| send_error(name, e))?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(classify_status(response.status(), name))
    }

    fn download(&self, session: &Session, name: &str) -> TransportResult<Vec<u8>> {
        debug!(name, "downloading blob");
        let response = self
            .client
            .get(self.object_url(name))
            .bearer_auth(session.token())
            .send()
            .map_err(|e| send_error(name, e))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), name));
        }
        let bytes = response.bytes().map_err(|e| send_error(name, e))?;
        Ok(bytes.to_vec())
    }

    fn list(&self, session: &Session) -> TransportResult<Vec<RemoteObjectRef>> {
        let url = self.namespace_url();
        let response = self
            .client
            .get(&url)
            .bearer_auth(session.token())
            .send()
            .map_err(|e| send_error(&url, e))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), &url));
        }
        let mut objects: Vec<RemoteObjectRef> =
            response.json().map_err(|e| send_error(&url, e))?;
        objects.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(objects)
    }

    fn delete(&self, session: &Session, name: &str) -> TransportResult<()> {
        debug!(name, "deleting blob");
        let response = self
            .client
            .delete(self.object_url(name))
            .bearer_auth(session.token())
            .send()
            .map_err(|e| send_error(name, e))?;
        // Deleting a name that is already gone counts as success
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(classify_status(response.status(), name))
    }
}
