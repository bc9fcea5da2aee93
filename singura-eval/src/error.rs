//! Error types for the evaluation crate.

use thiserror::Error;

/// Top-level evaluation error.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("feedback for '{automation_id}' is not actionable: {reason}")]
    NotActionable {
        automation_id: String,
        reason: String,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EvalError::InvalidInput("threshold 1.5 outside [0, 1]".into());
        assert!(err.to_string().contains("invalid input"));

        let err = EvalError::NotActionable {
            automation_id: "a-1".into(),
            reason: "no reviewers".into(),
        };
        assert!(err.to_string().contains("a-1"));
    }
}
