//! Remote snapshot store with uniform credential-refresh retry.
//!
//! Every operation funnels through [`RemoteStore::with_session`]: obtain a
//! session from the broker, run the call, and on an authentication
//! rejection report it, take a fresh session and retry exactly once. A
//! second failure of any kind surfaces as `RemoteUnavailable`.

use crate::core::{Result, StoreError};
use crate::remote::auth::{CredentialBroker, Session};
use crate::remote::transport::{RemoteObjectRef, RemoteTransport, TransportError, TransportResult};
use std::sync::Arc;
use tracing::debug;

pub struct RemoteStore {
    broker: Arc<CredentialBroker>,
    transport: Box<dyn RemoteTransport>,
}

impl RemoteStore {
    pub fn new(broker: Arc<CredentialBroker>, transport: Box<dyn RemoteTransport>) -> Self {
        Self { broker, transport }
    }

    pub fn upload(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.with_session(|session| self.transport.upload(session, name, bytes))
    }

    /// `NotFound` when no such object exists remotely.
    pub fn download(&self, name: &str) -> Result<Vec<u8>> {
        self.with_session(|session| self.transport.download(session, name))
    }

    /// All objects in the backup namespace, newest first regardless of
    /// transport ordering.
    pub fn list(&self) -> Result<Vec<RemoteObjectRef>> {
        let mut objects = self.with_session(|session| self.transport.list(session))?;
        objects.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(objects)
    }

    /// Idempotent: deleting a name that does not exist is success.
    pub fn delete(&self, name: &str) -> Result<()> {
        match self.with_session(|session| self.transport.delete(session, name)) {
            Err(StoreError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    /// The one retry policy applied to every remote call: an auth
    /// rejection invalidates the session and the call is retried once with
    /// a fresh one.
    fn with_session<T>(&self, op: impl Fn(&Session) -> TransportResult<T>) -> Result<T> {
        let session = self.broker.get_session().map_err(as_remote_unavailable)?;
        match op(&session) {
            Ok(value) => Ok(value),
            Err(TransportError::AuthRejected(reason)) => {
                debug!("remote call rejected ({}), refreshing credential and retrying", reason);
                self.broker.report_rejected(&session)?;
                let session = self.broker.get_session().map_err(as_remote_unavailable)?;
                op(&session).map_err(surface_transport_error)
            }
            Err(other) => Err(surface_transport_error(other)),
        }
    }
}

fn surface_transport_error(err: TransportError) -> StoreError {
    match err {
        TransportError::NotFound(name) => StoreError::NotFound(name),
        other => StoreError::RemoteUnavailable(other.to_string()),
    }
}

/// A broker that cannot produce a credential means the remote is simply
/// unavailable for this attempt.
fn as_remote_unavailable(err: StoreError) -> StoreError {
    match err {
        StoreError::CredentialUnavailable(reason) => StoreError::RemoteUnavailable(reason),
        other => other,
    }
}
