//! Content generation orchestrator.
//!
//! Story resolution, beat segmentation, narration with alignment and
//! composition, in that order. The orchestrator writes only inside the job's
//! work directory and never touches the status store; it reports stage
//! changes through a [`StageReporter`] and the worker turns those into
//! progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reel_media::{BackgroundClip, BackgroundLibrary, CompositionRequest, FfmpegRenderer, Renderer, TitleCard};
use reel_models::{AlignmentResult, BeatSpan, GenerationOptions, JobId, StoryBeats, WordTiming};
use reel_narration::{NarrationRegistry, SpeechRequest};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::error::{GenerationError, GenerationResult};
use crate::story::{DefaultStoryResolver, StoryResolver};

/// Orchestrator stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Synthesizing,
    Composing,
}

impl Stage {
    /// Progress reported when the stage starts.
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Resolving => 10,
            Stage::Synthesizing => 35,
            Stage::Composing => 60,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolving => "resolving",
            Stage::Synthesizing => "synthesizing",
            Stage::Composing => "composing",
        }
    }
}

/// Sink for stage events. Sending never blocks and never fails the job.
#[derive(Debug, Clone, Default)]
pub struct StageReporter {
    tx: Option<mpsc::UnboundedSender<Stage>>,
}

impl StageReporter {
    pub fn new(tx: mpsc::UnboundedSender<Stage>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Reporter that drops every event.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn report(&self, stage: Stage) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(stage);
        }
    }
}

/// Persisted timing map, written next to the narration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimingMap<'a> {
    duration: f64,
    words: &'a [WordTiming],
    beats: &'a [BeatSpan],
}

/// Turns generation options into a rendered local file.
pub struct ContentOrchestrator {
    stories: Arc<dyn StoryResolver>,
    narration: NarrationRegistry,
    backgrounds: BackgroundLibrary,
    renderer: Arc<dyn Renderer>,
}

impl ContentOrchestrator {
    pub fn new(
        stories: Arc<dyn StoryResolver>,
        narration: NarrationRegistry,
        backgrounds: BackgroundLibrary,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            stories,
            narration,
            backgrounds,
            renderer,
        }
    }

    /// Production wiring: HTTP story service, providers from the environment,
    /// FFmpeg renderer bounded by the job deadline.
    pub fn from_config(config: &WorkerConfig) -> GenerationResult<Self> {
        let stories = DefaultStoryResolver::new(config.story_service_url.clone())?;
        let renderer = FfmpegRenderer {
            timeout: Some(config.job_timeout),
            ..FfmpegRenderer::default()
        };
        Ok(Self::new(
            Arc::new(stories),
            NarrationRegistry::from_env(),
            BackgroundLibrary::new(&config.assets_dir),
            Arc::new(renderer),
        ))
    }

    /// Produce the video for `options` inside `work_dir`.
    ///
    /// `work_dir` must exist and belong to this job alone. Returns the path
    /// of the rendered file.
    pub async fn generate(
        &self,
        job_id: &JobId,
        options: &GenerationOptions,
        work_dir: &Path,
        reporter: &StageReporter,
        cancel: &CancellationToken,
    ) -> GenerationResult<PathBuf> {
        reporter.report(Stage::Resolving);
        let story = self.stories.resolve(&options.story, cancel).await?;

        let beats = StoryBeats::segment(&story.text).for_narration(options.cliffhanger);
        if beats.is_empty() {
            return Err(GenerationError::resolution("story has no narratable text"));
        }
        debug!(
            job_id = %job_id,
            "Segmented story into {} beats (explicit: {})",
            beats.len(),
            beats.is_explicit()
        );

        reporter.report(Stage::Synthesizing);
        let (narration_path, alignment, spans) = self
            .synthesize(job_id, options, &beats, story.title.as_deref(), work_dir, cancel)
            .await?;

        reporter.report(Stage::Composing);
        let background = self
            .backgrounds
            .select(options.background.category, job_id.as_str())
            .await?;

        let request = CompositionRequest {
            job_id: job_id.clone(),
            beat_spans: spans,
            alignment,
            narration: narration_path,
            background: BackgroundClip {
                path: background,
                speed_multiplier: options.background.speed_multiplier,
            },
            captions: options.captions.clone(),
            overlay: options.overlay.clone(),
            title: story.title.map(|title| TitleCard {
                title,
                subreddit: story.subreddit,
            }),
            playback_speed: options.playback_speed,
            work_dir: work_dir.to_path_buf(),
            output: work_dir.join("output.mp4"),
        };

        let output = self.renderer.render(&request, cancel).await?;
        info!(job_id = %job_id, "Generated {}", output.display());
        Ok(output)
    }

    async fn synthesize(
        &self,
        job_id: &JobId,
        options: &GenerationOptions,
        beats: &StoryBeats,
        title: Option<&str>,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> GenerationResult<(PathBuf, AlignmentResult, Vec<BeatSpan>)> {
        let provider = self.narration.for_voice(&options.voice)?;
        let request = SpeechRequest {
            text: beats.narration_text(title),
            voice: options.voice.params().clone(),
            output_dir: work_dir.to_path_buf(),
            correlation_id: job_id.to_string(),
        };

        let narration = provider.synthesize(&request, cancel).await?;
        if narration.duration <= 0.0 {
            return Err(GenerationError::synthesis("provider returned empty audio"));
        }

        let leading_words = title.map(reel_models::beats::word_count).unwrap_or(0);
        let mut alignment = AlignmentResult::new(narration.duration, narration.words);
        let spans = alignment.beat_spans(&beats.word_counts(), leading_words);

        let timing_path = work_dir.join("alignment.json");
        let timing = TimingMap {
            duration: alignment.duration,
            words: &alignment.words,
            beats: &spans,
        };
        let json = serde_json::to_vec_pretty(&timing)
            .map_err(|e| GenerationError::synthesis(format!("failed to encode timing map: {}", e)))?;
        tokio::fs::write(&timing_path, json)
            .await
            .map_err(|e| GenerationError::synthesis(format!("failed to write timing map: {}", e)))?;
        alignment.timing_map = Some(timing_path);

        info!(
            job_id = %job_id,
            provider = %provider.kind(),
            "Narration ready: {:.1}s, {} words, {} beats",
            alignment.duration,
            alignment.words.len(),
            spans.len()
        );
        Ok((narration.audio_path, alignment, spans))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progress_is_increasing() {
        let stages = [Stage::Resolving, Stage::Synthesizing, Stage::Composing];
        assert!(stages.windows(2).all(|w| w[0].progress() < w[1].progress()));
        assert!(stages.iter().all(|s| s.progress() > 5 && s.progress() < 95));
    }

    #[tokio::test]
    async fn test_reporter_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = StageReporter::new(tx);
        reporter.report(Stage::Resolving);
        drop(reporter);
        assert_eq!(rx.recv().await, Some(Stage::Resolving));
        assert_eq!(rx.recv().await, None);

        StageReporter::noop().report(Stage::Composing);
    }
}
