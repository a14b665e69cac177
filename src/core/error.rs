use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt document: {0}")]
    Corrupt(String),

    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Local I/O error: {0}")]
    LocalIo(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LocalIo(format!("lock poisoned: {}", err))
    }
}
