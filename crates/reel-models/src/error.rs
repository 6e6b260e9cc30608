//! Model error types.

use thiserror::Error;

use crate::job::JobState;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating or transitioning model values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// A generation request failed validation; never reaches the queue.
    #[error("Invalid generation request: {0}")]
    Submission(String),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Cannot move job from {from} to {to}")]
    InvalidTransition { from: JobState, to: &'static str },
}

impl ModelError {
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }
}

impl From<validator::ValidationErrors> for ModelError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Submission(errors.to_string())
    }
}
