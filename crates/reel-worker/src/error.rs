//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Failure of one orchestrator stage.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Story resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Composition failed: {0}")]
    CompositionFailed(String),

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::ResolutionFailed(msg.into())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::SynthesisFailed(msg.into())
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::CompositionFailed(msg.into())
    }

    /// Stage label for logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            GenerationError::ResolutionFailed(_) => "resolution",
            GenerationError::SynthesisFailed(_) => "synthesis",
            GenerationError::CompositionFailed(_) => "composition",
            GenerationError::Cancelled => "cancelled",
        }
    }
}

impl From<reel_narration::NarrationError> for GenerationError {
    fn from(e: reel_narration::NarrationError) -> Self {
        match e {
            reel_narration::NarrationError::Cancelled => GenerationError::Cancelled,
            other => GenerationError::synthesis(other.to_string()),
        }
    }
}

impl From<reel_media::MediaError> for GenerationError {
    fn from(e: reel_media::MediaError) -> Self {
        match e {
            reel_media::MediaError::Cancelled => GenerationError::Cancelled,
            other => GenerationError::composition(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Generation timed out after {0} ms")]
    TimeoutExceeded(u64),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(#[source] reel_storage::StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Status store error: {0}")]
    Store(#[from] reel_queue::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Failure reason stored on the job and shown to clients.
    ///
    /// Names the failure category and its description without internal
    /// type or stage names.
    pub fn client_message(&self) -> String {
        match self {
            WorkerError::TimeoutExceeded(ms) if ms % 1000 == 0 => {
                format!("Video generation timed out after {} seconds", ms / 1000)
            }
            WorkerError::TimeoutExceeded(ms) => format!("Video generation timed out after {} ms", ms),
            WorkerError::Generation(GenerationError::ResolutionFailed(msg)) => {
                format!("Could not load the story: {}", msg)
            }
            WorkerError::Generation(GenerationError::SynthesisFailed(msg)) => {
                format!("Narration could not be generated: {}", msg)
            }
            WorkerError::Generation(GenerationError::CompositionFailed(msg)) => {
                format!("Video could not be rendered: {}", msg)
            }
            WorkerError::Generation(GenerationError::Cancelled) => "Video generation was cancelled".to_string(),
            WorkerError::DeliveryFailed(_) => "The finished video could not be stored".to_string(),
            _ => "Internal error while generating the video".to_string(),
        }
    }

    /// Label used for the failure metric.
    pub fn reason_label(&self) -> &'static str {
        match self {
            WorkerError::TimeoutExceeded(_) => "timeout",
            WorkerError::Generation(e) => e.stage(),
            WorkerError::DeliveryFailed(_) => "delivery",
            _ => "internal",
        }
    }
}
