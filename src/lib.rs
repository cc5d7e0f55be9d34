//! Adaptive UI element resolution engine
//!
//! Parses raw device UI dumps into an arena tree, resolves descriptive
//! selectors against it with deterministic lexicographic scoring, projects
//! the tree into token-efficient views and learns which selectors reliably
//! land on the intended element per app. The device transport is a seam
//! ([`ports::DevicePort`]); everything behind it is pure of device I/O.

pub mod config;
pub mod engine;
pub mod errors;
pub mod ports;

pub use config::EngineConfig;
pub use engine::{ElementInfo, ResolvedElement, UiEngine, ViewOptions};
pub use errors::EngineError;
pub use ports::{DeviceError, DevicePort};

pub use uipilot_locator as locator;
pub use uipilot_pattern_store as pattern_store;
pub use uipilot_ui_tree as ui_tree;
