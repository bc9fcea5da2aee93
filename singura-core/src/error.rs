//! Error types for the core crate.

use thiserror::Error;

/// Top-level core error.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("normalization error: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("invalid threshold set: {0}")]
    InvalidThresholds(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the event normalizer. A failing record is dropped and
/// counted; normalization of the batch continues.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record is missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("record field '{field}' is ill-typed: {message}")]
    IllTyped { field: &'static str, message: String },
    #[error("unrecognized timestamp format: {0}")]
    BadTimestamp(String),
}
