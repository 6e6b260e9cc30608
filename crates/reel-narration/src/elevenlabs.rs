//! ElevenLabs text-to-speech with character timestamps.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reel_models::{ProviderKind, WordTiming};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{NarrationError, NarrationResult};
use crate::provider::{Narration, NarrationProvider, SpeechRequest};
use crate::voices::elevenlabs_voice;

/// Configuration for the ElevenLabs provider.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.elevenlabs.io".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }

    /// Create config from environment variables.
    ///
    /// Returns `None` when `ELEVENLABS_API_KEY` is not set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ELEVENLABS_API_KEY").ok().filter(|k| !k.is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("ELEVENLABS_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model_id) = std::env::var("ELEVENLABS_MODEL_ID") {
            config.model_id = model_id;
        }
        config.timeout = Duration::from_secs(
            std::env::var("ELEVENLABS_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
        );
        Some(config)
    }
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.75,
            similarity_boost: 0.85,
            style: 0.35,
            use_speaker_boost: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    audio_base64: String,
    alignment: Option<CharacterAlignment>,
}

#[derive(Debug, Deserialize)]
struct CharacterAlignment {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

/// ElevenLabs narration provider.
pub struct ElevenLabsProvider {
    http: Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsProvider {
    pub fn new(config: ElevenLabsConfig) -> NarrationResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(NarrationError::Network)?;

        Ok(Self { http, config })
    }

    async fn request_speech(&self, voice_id: &str, text: &str) -> NarrationResult<TtsResponse> {
        let url = format!(
            "{}/v1/text-to-speech/{}/with-timestamps",
            self.config.base_url.trim_end_matches('/'),
            voice_id
        );
        debug!("Requesting ElevenLabs speech from {}", url);

        let body = TtsRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings::default(),
        };

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let detail = response.text().await.unwrap_or_default();
            return Err(NarrationError::ServiceUnavailable(format!("ElevenLabs returned {}: {}", status, detail)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NarrationError::RequestFailed(format!("ElevenLabs returned {}: {}", status, detail)));
        }

        Ok(response.json().await?)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> NarrationResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = NarrationResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "ElevenLabs request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl NarrationProvider for ElevenLabsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ElevenLabs
    }

    async fn synthesize(&self, request: &SpeechRequest, cancel: &CancellationToken) -> NarrationResult<Narration> {
        let voice_id = elevenlabs_voice(&request.voice);

        let response = tokio::select! {
            response = self.with_retry(|| self.request_speech(&voice_id, &request.text)) => response?,
            _ = cancel.cancelled() => return Err(NarrationError::Cancelled),
        };

        let audio = base64::engine::general_purpose::STANDARD
            .decode(response.audio_base64.as_bytes())
            .map_err(|e| NarrationError::InvalidResponse(format!("audio is not valid base64: {}", e)))?;
        if audio.is_empty() {
            return Err(NarrationError::InvalidResponse("empty audio".to_string()));
        }

        let audio_path = request.output_dir.join("narration.mp3");
        tokio::fs::write(&audio_path, &audio).await?;

        let words = response
            .alignment
            .map(|a| characters_to_words(&a.characters, &a.character_start_times_seconds, &a.character_end_times_seconds))
            .unwrap_or_default();

        let duration = match reel_media::get_duration(&audio_path).await {
            Ok(duration) => duration,
            Err(e) => {
                debug!("Could not probe narration, using alignment end: {}", e);
                words.last().map(|w| w.end).unwrap_or(0.0)
            }
        };

        info!(
            correlation_id = %request.correlation_id,
            "ElevenLabs narration: {} bytes, {} words, {:.1}s",
            audio.len(),
            words.len(),
            duration
        );

        Ok(Narration {
            audio_path,
            words,
            duration,
        })
    }
}

/// Collapse per-character timings into whitespace-separated words.
pub(crate) fn characters_to_words(chars: &[String], starts: &[f64], ends: &[f64]) -> Vec<WordTiming> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut start = 0.0;
    let mut end = 0.0;

    let count = chars.len().min(starts.len()).min(ends.len());
    for i in 0..count {
        let ch = &chars[i];
        if ch.trim().is_empty() {
            if !current.is_empty() {
                words.push(WordTiming::new(std::mem::take(&mut current), start, end));
            }
            continue;
        }
        if current.is_empty() {
            start = starts[i];
        }
        current.push_str(ch);
        end = ends[i];
    }
    if !current.is_empty() {
        words.push(WordTiming::new(current, start, end));
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<String> {
        s.chars().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_characters_to_words() {
        let text = "Hi  you\nok";
        let starts: Vec<f64> = (0..text.len()).map(|i| i as f64 * 0.1).collect();
        let ends: Vec<f64> = starts.iter().map(|s| s + 0.1).collect();

        let words = characters_to_words(&chars(text), &starts, &ends);
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].word, "Hi");
        assert!((words[0].end - 0.2).abs() < 1e-9);
        assert_eq!(words[1].word, "you");
        assert!((words[1].start - 0.4).abs() < 1e-9);
        assert_eq!(words[2].word, "ok");
    }

    #[test]
    fn test_mismatched_lengths_are_truncated() {
        let words = characters_to_words(&chars("abc"), &[0.0, 0.1], &[0.1, 0.2, 0.3]);
        assert_eq!(words, vec![WordTiming::new("ab", 0.0, 0.2)]);
    }

    #[test]
    fn test_voice_settings_defaults() {
        let settings = serde_json::to_value(VoiceSettings::default()).unwrap();
        assert_eq!(settings["similarity_boost"].as_f64().map(|v| (v * 100.0).round()), Some(85.0));
        assert_eq!(settings["use_speaker_boost"], true);
    }
}
