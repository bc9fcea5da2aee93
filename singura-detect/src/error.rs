//! Error types for the detection crate.

use thiserror::Error;

/// Top-level detection error.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("threshold load failed for organization '{organization_id}': {message}")]
    ThresholdLoad {
        organization_id: String,
        message: String,
    },
    #[error("detection pass cancelled")]
    Cancelled,
    #[error("internal invariant violation in pass {pass_id}: {message}")]
    InvariantViolation { pass_id: String, message: String },
    #[error("detector '{detector}' failed: {message}")]
    DetectorFailed { detector: String, message: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the threshold loader seam. Non-fatal: the store retries once
/// and then falls back to defaults.
#[derive(Debug, Error)]
pub enum ThresholdLoadError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("stored threshold set is invalid: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DetectError::Cancelled;
        assert_eq!(err.to_string(), "detection pass cancelled");

        let err = DetectError::ThresholdLoad {
            organization_id: "org-1".into(),
            message: "timeout".into(),
        };
        assert!(err.to_string().contains("org-1"));
    }
}
