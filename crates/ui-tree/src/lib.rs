//! UI hierarchy model, dump parser and projection engine
//!
//! This crate turns a raw uiautomator-style XML dump into an arena-backed
//! node tree and derives reduced, token-efficient views from it:
//! - interactive-only projection (clickable nodes, ancestors collapsed)
//! - depth-limited projection
//! - system-surface exclusion by package denylist
//! - bounds-only projection for minimal payloads
//!
//! Trees are built fresh per snapshot and never shared across calls; all
//! transformations here are pure.

pub mod errors;
pub mod filter;
pub mod model;
pub mod parser;

pub use errors::*;
pub use filter::*;
pub use model::*;
pub use parser::*;
