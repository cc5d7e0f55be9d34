//! Error types for tree parsing

use thiserror::Error;

/// Tree construction error enumeration
#[derive(Debug, Error, Clone)]
pub enum TreeError {
    /// The dump could not be parsed as a tree at all
    #[error("malformed ui dump: {0}")]
    MalformedInput(String),
}
