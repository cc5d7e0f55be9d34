//! Persistent pattern data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one attempted interaction with a resolved element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Input for saving a pattern. Counts and timestamps are owned by the
/// store; callers only name the selector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewPattern {
    pub app_package: String,
    /// Canonical selector signature, unique per app.
    pub signature: String,
    /// Human-readable canonical selector string.
    pub selector: String,
}

/// A persisted pattern: the learned reliability record for one selector
/// within one app. Confidence always equals the smoothed ratio of the
/// stored counts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pattern {
    pub app_package: String,
    pub signature: String,
    pub selector: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Pattern {
    pub fn total_outcomes(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

/// Aggregate over the interaction log for one app within a window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityStats {
    pub interactions: u64,
    pub successes: u64,
    pub failures: u64,
    /// Raw (unsmoothed) success ratio over the window; 0 when empty.
    pub success_rate: f64,
    pub avg_latency_ms: Option<f64>,
}
