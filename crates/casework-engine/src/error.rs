//! Error types for the casework workflow engine.
//!
//! Step handlers, stores and collaborators all report failures through
//! [`EngineError`]. The engine decides which kinds are terminal for an
//! execution and which are softened into skipped step results.

use thiserror::Error;
use uuid::Uuid;

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Record not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the execution's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A step handler failed; the execution becomes `failed`
    #[error("Step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    /// An external dependency (AI, notification channel) is down or disabled
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// NATS messaging error
    #[error("NATS error: {0}")]
    Nats(String),

    /// External service returned an error
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Build an `InvalidState` error for an execution.
    pub fn invalid_state(execution_id: Uuid, status: impl std::fmt::Display, op: &str) -> Self {
        EngineError::InvalidState(format!(
            "cannot {} execution {} in status '{}'",
            op, execution_id, status
        ))
    }

    /// Whether this error should be treated as a soft, skippable outcome.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::CollaboratorUnavailable(_))
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<envy::Error> for EngineError {
    fn from(err: envy::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<minijinja::Error> for EngineError {
    fn from(err: minijinja::Error) -> Self {
        EngineError::Template(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = EngineError::NotFound("case 42".to_string());
        assert_eq!(err.to_string(), "Resource not found: case 42");
    }

    #[test]
    fn test_invalid_state_message() {
        let id = Uuid::nil();
        let err = EngineError::invalid_state(id, "completed", "resume");
        assert_eq!(
            err.to_string(),
            format!("Invalid state: cannot resume execution {} in status 'completed'", id)
        );
    }

    #[test]
    fn test_step_execution_error() {
        let err = EngineError::StepExecution {
            step: "classify".to_string(),
            message: "model timeout".to_string(),
        };
        assert_eq!(err.to_string(), "Step 'classify' failed: model timeout");
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_unavailable_is_soft() {
        let err = EngineError::CollaboratorUnavailable("ai disabled".to_string());
        assert!(err.is_unavailable());
    }
}
