//! Provider contract.

use std::path::PathBuf;

use async_trait::async_trait;
use reel_models::{ProviderKind, VoiceParams, WordTiming};
use tokio_util::sync::CancellationToken;

use crate::error::NarrationResult;

/// Text to speak and where to put the result.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: VoiceParams,
    /// Job-private directory for the audio file and any provider scratch files
    pub output_dir: PathBuf,
    /// Passed to providers that support request correlation
    pub correlation_id: String,
}

/// Synthesized narration.
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub audio_path: PathBuf,
    pub words: Vec<WordTiming>,
    /// Seconds
    pub duration: f64,
}

#[async_trait]
pub trait NarrationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Synthesize `request.text`, stopping promptly when `cancel` fires.
    async fn synthesize(&self, request: &SpeechRequest, cancel: &CancellationToken) -> NarrationResult<Narration>;
}
