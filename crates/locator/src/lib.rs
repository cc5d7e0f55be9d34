//! Selector model, canonical signatures and scoring resolver
//!
//! A selector is a closed set of criteria (text, resource id, content
//! description, class name, ordinal index) evaluated conjunctively against
//! a parsed tree. Candidates are ranked by lexicographic tier scoring;
//! learned pattern confidence breaks ties between structurally equal
//! candidates, never a structural difference.

pub mod errors;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use resolver::*;
pub use types::*;
