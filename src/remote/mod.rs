pub mod auth;
pub mod store;
pub mod transport;

pub use auth::{Credential, CredentialBroker, Session};
pub use store::RemoteStore;
pub use transport::{HttpTransport, RemoteObjectRef, RemoteTransport, TransportError, TransportResult};
