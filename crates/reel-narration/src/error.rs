//! Narration error types.

use reel_models::ProviderKind;
use thiserror::Error;

pub type NarrationResult<T> = Result<T, NarrationError>;

#[derive(Debug, Error)]
pub enum NarrationError {
    #[error("Narration provider {0} is not configured")]
    NotConfigured(ProviderKind),

    #[error("Provider unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0} not found in PATH")]
    BinaryNotFound(String),

    #[error("Synthesis process failed: {message}")]
    ProcessFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Synthesis cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NarrationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            NarrationError::ServiceUnavailable(_) | NarrationError::Timeout(_) => true,
            NarrationError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
