//! Persistent selector pattern store and reliability scorer
//!
//! Patterns map an (app, canonical selector signature) pair to the
//! observed success and failure history of that selector. Confidence is a
//! smoothed success ratio, always recomputable from the counts, and is fed
//! back into the resolver as a tie-break between equally scored
//! candidates. Backing storage is SQLite behind a serialized async
//! connection.

pub mod errors;
pub mod model;
pub mod scorer;
pub mod schema;
pub mod store;

pub use errors::*;
pub use model::*;
pub use scorer::{confidence, Smoothing};
pub use store::PatternStore;
