//! Edge neural voices through the `edge-tts` CLI.
//!
//! The CLI writes an MP3 plus a subtitle file (WebVTT or SRT depending on
//! version). Subtitle cues are split into words with times distributed by
//! character length, which is close enough for caption grouping.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reel_models::{ProviderKind, WordTiming};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{NarrationError, NarrationResult};
use crate::provider::{Narration, NarrationProvider, SpeechRequest};
use crate::voices::edge_voice;

/// Configuration for the Edge provider.
#[derive(Debug, Clone)]
pub struct EdgeTtsConfig {
    /// Executable name or path
    pub binary: String,
    pub timeout: Duration,
}

impl Default for EdgeTtsConfig {
    fn default() -> Self {
        Self {
            binary: "edge-tts".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl EdgeTtsConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(binary) = std::env::var("EDGE_TTS_BIN") {
            if !binary.trim().is_empty() {
                config.binary = binary;
            }
        }
        if let Some(secs) = std::env::var("EDGE_TTS_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// Edge narration provider.
#[derive(Debug, Clone, Default)]
pub struct EdgeTtsProvider {
    config: EdgeTtsConfig,
}

impl EdgeTtsProvider {
    pub fn new(config: EdgeTtsConfig) -> Self {
        Self { config }
    }

    fn resolve_binary(&self) -> NarrationResult<PathBuf> {
        which::which(&self.config.binary).map_err(|_| NarrationError::BinaryNotFound(self.config.binary.clone()))
    }

    async fn run(&self, args: &[String], cancel: &CancellationToken) -> NarrationResult<()> {
        let binary = self.resolve_binary()?;
        debug!("Running {} {}", binary.display(), args.join(" "));

        let child = Command::new(&binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the output future kills the child.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => {
                info!("edge-tts cancelled, killing process");
                return Err(NarrationError::Cancelled);
            }
            _ = tokio::time::sleep(self.config.timeout) => {
                warn!("edge-tts timed out after {:?}", self.config.timeout);
                return Err(NarrationError::Timeout(self.config.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(NarrationError::ProcessFailed {
                message: format!("edge-tts exited with {}", output.status),
                stderr: Some(stderr).filter(|s| !s.is_empty()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NarrationProvider for EdgeTtsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Edge
    }

    async fn synthesize(&self, request: &SpeechRequest, cancel: &CancellationToken) -> NarrationResult<Narration> {
        let text_path = request.output_dir.join("narration.txt");
        let audio_path = request.output_dir.join("narration.mp3");
        let subtitle_path = request.output_dir.join("narration.vtt");
        tokio::fs::write(&text_path, &request.text).await?;

        let voice = edge_voice(&request.voice);
        let mut args = vec!["--voice".to_string(), voice.clone()];
        if let Some(rate) = request.voice.rate {
            args.push(format!("--rate={}", format_rate(rate)));
        }
        args.extend([
            "--file".to_string(),
            path_arg(&text_path),
            "--write-media".to_string(),
            path_arg(&audio_path),
            "--write-subtitles".to_string(),
            path_arg(&subtitle_path),
        ]);

        self.run(&args, cancel).await?;

        if !audio_path.exists() {
            return Err(NarrationError::InvalidResponse("edge-tts produced no audio".to_string()));
        }

        let words = match tokio::fs::read_to_string(&subtitle_path).await {
            Ok(subtitles) => parse_subtitle_words(&subtitles),
            Err(e) => {
                warn!("edge-tts subtitles unreadable: {}", e);
                Vec::new()
            }
        };

        let duration = match reel_media::get_duration(&audio_path).await {
            Ok(duration) => duration,
            Err(e) => {
                debug!("Could not probe narration, using last cue end: {}", e);
                words.last().map(|w| w.end).unwrap_or(0.0)
            }
        };

        info!(
            correlation_id = %request.correlation_id,
            voice = %voice,
            "Edge narration: {} words, {:.1}s",
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

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Rate multiplier to edge-tts percent syntax, e.g. `1.25` to `+25%`.
pub(crate) fn format_rate(rate: f32) -> String {
    let percent = ((rate - 1.0) * 100.0).round() as i32;
    if percent >= 0 {
        format!("+{}%", percent)
    } else {
        format!("{}%", percent)
    }
}

/// Parse WebVTT or SRT cues into word timings.
pub(crate) fn parse_subtitle_words(subtitles: &str) -> Vec<WordTiming> {
    let mut words = Vec::new();
    let mut lines = subtitles.lines().peekable();

    while let Some(line) = lines.next() {
        let Some((start, end)) = parse_cue_times(line) else {
            continue;
        };

        let mut text = Vec::new();
        while let Some(next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            text.push(next.trim());
            lines.next();
        }

        distribute(&text.join(" "), start, end, &mut words);
    }

    words
}

fn parse_cue_times(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// `HH:MM:SS.mmm`, `MM:SS.mmm` or SRT's `HH:MM:SS,mmm`.
fn parse_timestamp(value: &str) -> Option<f64> {
    let normalized = value.replace(',', ".");
    let mut seconds = 0.0;
    for part in normalized.split(':') {
        seconds = seconds * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(seconds)
}

fn distribute(text: &str, start: f64, end: f64, out: &mut Vec<WordTiming>) {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let total_chars: usize = tokens.iter().map(|t| t.chars().count()).sum();
    if tokens.is_empty() || total_chars == 0 {
        return;
    }

    let span = (end - start).max(0.0);
    let mut cursor = start;
    for token in tokens {
        let share = span * token.chars().count() as f64 / total_chars as f64;
        out.push(WordTiming::new(token, cursor, cursor + share));
        cursor += share;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(1.0), "+0%");
        assert_eq!(format_rate(1.25), "+25%");
        assert_eq!(format_rate(0.8), "-20%");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:00:01.500"), Some(1.5));
        assert_eq!(parse_timestamp("01:02.250"), Some(62.25));
        assert!((parse_timestamp("00:01:00,100").unwrap() - 60.1).abs() < 1e-9);
        assert_eq!(parse_timestamp("junk"), None);
    }

    #[test]
    fn test_parse_vtt_word_cues() {
        let vtt = "WEBVTT\n\n00:00:00.100 --> 00:00:00.500\nHello\n\n00:00:00.600 --> 00:00:01.000\nworld\n";
        let words = parse_subtitle_words(vtt);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "Hello");
        assert!((words[1].start - 0.6).abs() < 1e-9);
        assert!((words[1].end - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_srt_sentence_cue_splits_by_length() {
        let srt = "1\n00:00:00,000 --> 00:00:01,000\nab\nabcdef ab\n\n";
        let words = parse_subtitle_words(srt);
        assert_eq!(words.len(), 3);
        assert_eq!(words[1].word, "abcdef");
        assert!((words[0].end - 0.2).abs() < 1e-9);
        assert!((words[1].end - 0.8).abs() < 1e-9);
        assert!((words[2].end - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let provider = EdgeTtsProvider::new(EdgeTtsConfig {
            binary: "definitely-not-edge-tts".to_string(),
            timeout: Duration::from_secs(1),
        });
        let request = SpeechRequest {
            text: "hi".to_string(),
            voice: reel_models::VoiceParams::new("adam"),
            output_dir: dir.path().to_path_buf(),
            correlation_id: "t".to_string(),
        };
        let result = provider.synthesize(&request, &CancellationToken::new()).await;
        assert!(matches!(result, Err(NarrationError::BinaryNotFound(_))));
    }
}
