//! Error types surfaced at the crate boundary.
//!
//! Mirrors the split between configuration-time failures and fit/predict-time
//! failures: recoverable events (empty batch, non-improving round, no legal
//! split) are logged and resolved inside `BoostingEngine`, never raised as
//! errors here.

use thiserror::Error;

/// A single invalid configuration field.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid config field `{field}`: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Fatal failures that abort `fit`.
#[derive(Debug, Error)]
pub enum FitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("X has {actual} columns, expected {expected}")]
    ShapeError { expected: usize, actual: usize },
    #[error("X and y have mismatched row counts: {x_rows} vs {y_rows}")]
    RowMismatch { x_rows: usize, y_rows: usize },
    #[error(
        "fit was cancelled after {trees_completed} trees; partial ensemble returned to caller"
    )]
    Cancelled { trees_completed: usize },
}

/// Failures that can occur at prediction time.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("X has {actual} columns, expected {expected}")]
    ShapeError { expected: usize, actual: usize },
    #[error("predict_proba called on a {task} ensemble, which has no class probabilities")]
    TaskMismatch { task: &'static str },
}

// Note: Do not implement a blanket From<FitError> to Box<dyn Error> because the
// standard library already provides a conflicting implementation for all StdError
// types. Leave conversions explicit where needed.
