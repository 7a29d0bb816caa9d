//! Reconciliation module - Multi-source price reconciliation
//!
//! Takes the run's raw readings per market, applies fallback ordering,
//! cross-source agreement checks and staleness rules, and emits one
//! reconciled price per market with a confidence score.

mod engine;

pub use engine::{MarketLimits, ReconcileParams, Reconciler, SourceProfile};

use thiserror::Error;

/// Why a raw reading was excluded from the candidate set.
///
/// Rejections are absorbed inside the engine (surfaced as log lines and
/// lower confidence, never as run failures).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("source reported a failed fetch")]
    SourceUnavailable,
    #[error("value {value} outside sanity range {min}..{max}")]
    ImplausibleValue { value: f64, min: f64, max: f64 },
    #[error("value {value} more than an order of magnitude from prior {prior}")]
    FarFromPrior { value: f64, prior: f64 },
    #[error("reading is {age_secs}s old, tolerance is {max_secs}s")]
    Stale { age_secs: i64, max_secs: i64 },
    #[error("no profile configured for source")]
    UnknownSource,
}
