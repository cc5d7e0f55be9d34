//! Engine configuration
//!
//! Read once at startup; the engine never re-reads the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uipilot_pattern_store::Smoothing;

/// User-controllable engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Master switch for the pattern store. When off, no database is
    /// opened and resolution runs with neutral tie-breaks only.
    pub learning_enabled: bool,
    /// Persist a pattern for every successfully resolved element.
    pub auto_learn: bool,
    /// Location of the pattern database.
    pub store_path: PathBuf,
    /// Packages excluded from views unless explicitly included.
    pub system_denylist: Vec<String>,
    /// Confidence smoothing constants.
    pub smoothing: Smoothing,
    /// Sleep between polls in wait loops.
    pub poll_interval: Duration,
    /// Wait budget applied when the caller does not supply one.
    pub default_wait_timeout: Duration,
    /// Upper bound on patterns loaded per app for tie-break lookups.
    pub max_listed_patterns: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            learning_enabled: true,
            auto_learn: true,
            store_path: default_store_path(),
            system_denylist: vec!["com.android.systemui".to_string()],
            smoothing: Smoothing::default(),
            poll_interval: Duration::from_millis(500),
            default_wait_timeout: Duration::from_secs(10),
            max_listed_patterns: 1000,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `UIPILOT_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("UIPILOT_LEARNING_ENABLED") {
            config.learning_enabled = parse_flag(&val);
        }
        if let Ok(val) = env::var("UIPILOT_AUTO_LEARN") {
            config.auto_learn = parse_flag(&val);
        }
        if let Ok(val) = env::var("UIPILOT_DB_PATH") {
            config.store_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("UIPILOT_SYSTEM_DENYLIST") {
            config.system_denylist = val
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(val) = env::var("UIPILOT_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.poll_interval = Duration::from_millis(ms);
            }
        }
        if let Ok(val) = env::var("UIPILOT_WAIT_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.default_wait_timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(val) = env::var("UIPILOT_MAX_PATTERNS") {
            if let Ok(n) = val.parse() {
                config.max_listed_patterns = n;
            }
        }

        config
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(val.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("uipilot")
        .join("patterns.db")
}
