//! Error types for the selector system

use thiserror::Error;

use crate::types::MatchCandidate;

/// Resolution error enumeration
#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    /// Selector carries no criteria; rejected before traversal
    #[error("selector has no criteria")]
    InvalidSelector,

    /// No node satisfied every criterion
    #[error("no element matched selector: {0}")]
    NotFound(String),

    /// Two or more top-ranked candidates stayed tied after the confidence
    /// tie-break; the caller gets them all to disambiguate
    #[error("ambiguous selector {selector}: {} candidates tied", candidates.len())]
    Ambiguous {
        selector: String,
        candidates: Vec<MatchCandidate>,
    },
}
