//! Engine-level error taxonomy
//!
//! Component errors pass through unchanged; nothing here is globally
//! fatal, and a failing operation leaves the engine usable.

use thiserror::Error;

use uipilot_locator::ResolveError;
use uipilot_pattern_store::StoreError;
use uipilot_ui_tree::TreeError;

use crate::ports::DeviceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("failed to encode view: {0}")]
    Encode(#[from] serde_json::Error),

    /// A bounded wait expired; carries the last failure seen while polling.
    #[error("timed out after {waited_ms}ms: {last}")]
    TimeoutExceeded { waited_ms: u64, last: String },

    /// Pattern management was invoked with learning switched off.
    #[error("learning is disabled")]
    LearningDisabled,
}
