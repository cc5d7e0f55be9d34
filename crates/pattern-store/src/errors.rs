//! Error types for the pattern store

use thiserror::Error;

/// Store error enumeration
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// Underlying database failure; the operation either fully applied or
    /// not at all
    #[error("pattern store I/O failure: {0}")]
    Io(String),
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
