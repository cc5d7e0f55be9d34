//! Reliability scoring
//!
//! Confidence is a Bayesian-smoothed success ratio, recomputable at any
//! time from the stored counts alone. With the default Laplace smoothing
//! (alpha = beta = 1) a pattern with no history starts at a neutral 0.5.
//! Recency is not weighted beyond what smoothing provides.

use serde::{Deserialize, Serialize};

/// Smoothing constants for the confidence formula. Both must be positive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Smoothing {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

/// Smoothed success ratio: (s + alpha) / (s + f + alpha + beta).
/// Always in [0, 1] for non-negative counts and positive constants.
pub fn confidence(successes: u64, failures: u64, smoothing: Smoothing) -> f64 {
    let s = successes as f64;
    let f = failures as f64;
    (s + smoothing.alpha) / (s + f + smoothing.alpha + smoothing.beta)
}
