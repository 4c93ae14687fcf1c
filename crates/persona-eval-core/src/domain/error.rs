//! Error taxonomy for the persona evaluation engine.
//!
//! Cold starts and empty samples are not errors: they are reported as
//! `overall_score: None` and `Some(9.0)` respectively.

use persona_state::StorageError;

/// Persona evaluation errors.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Unknown agent id (or other named entity).
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed window string, unsupported dimension flag, bad config value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Rule file failed to parse or violated the schema.
    #[error("validation failed for {origin}: {message}")]
    Validation { origin: String, message: String },

    /// Judge call rejected, or its response could not be parsed.
    #[error("judge failure: {0}")]
    Judge(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The correction pipeline refused to send a message.
    #[error("message blocked: {0}")]
    MessageBlocked(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvalError {
    pub fn validation(origin: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::Validation {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

/// Result type for persona evaluation operations.
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_error_display() {
        let err = EvalError::NotFound("agent toby".to_string());
        assert!(err.to_string().contains("not found"));

        let err = EvalError::InvalidConfig("Invalid window format: 7x".to_string());
        assert!(err.to_string().contains("Invalid window format: 7x"));

        let err = EvalError::validation("rules/adherence/_default.yaml", "missing propositions");
        let msg = err.to_string();
        assert!(msg.contains("_default.yaml"));
        assert!(msg.contains("missing propositions"));
    }

    #[test]
    fn test_storage_error_converts() {
        let err: EvalError = StorageError::Backend("connection reset".to_string()).into();
        assert!(matches!(err, EvalError::Storage(_)));
        assert!(err.to_string().contains("connection reset"));
    }
}
