//! Video composition.
//!
//! [`Renderer`] is the contract the worker's orchestrator renders through:
//! beats + alignment + background + style in, output file path out.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reel_models::{AlignmentResult, BeatSpan, CaptionStyle, JobId, UiOverlay};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::captions::{build_ass, group_words_by_beat, sanitize, CaptionEvent, PLAY_RES_X, PLAY_RES_Y};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

const OUTPUT_FPS: u32 = 30;
/// Title card length when the narration has no separate title segment.
const DEFAULT_TITLE_SECS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundClip {
    pub path: PathBuf,
    pub speed_multiplier: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleCard {
    pub title: String,
    pub subreddit: Option<String>,
}

/// Everything needed to render one video.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub job_id: JobId,
    /// Timed story beats; captions never straddle two of them.
    pub beat_spans: Vec<BeatSpan>,
    pub alignment: AlignmentResult,
    pub narration: PathBuf,
    pub background: BackgroundClip,
    pub captions: CaptionStyle,
    pub overlay: UiOverlay,
    pub title: Option<TitleCard>,
    pub playback_speed: f32,
    /// Job-private scratch directory
    pub work_dir: PathBuf,
    pub output: PathBuf,
}

impl CompositionRequest {
    /// Rendered length after playback speed is applied.
    pub fn output_duration(&self) -> f64 {
        self.alignment.duration / f64::from(self.playback_speed.max(0.1))
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render the request and return the path of the finished file.
    async fn render(&self, request: &CompositionRequest, cancel: &CancellationToken) -> MediaResult<PathBuf>;
}

/// Renders with the FFmpeg CLI and burned-in ASS captions.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    pub preset: String,
    pub crf: u8,
    pub timeout: Option<Duration>,
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self {
            preset: "veryfast".to_string(),
            crf: 23,
            timeout: None,
        }
    }
}

impl FfmpegRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caption events, with the title card first when the overlay asks for one.
    pub fn caption_events(request: &CompositionRequest) -> Vec<CaptionEvent> {
        let speed = f64::from(request.playback_speed);
        let mut events = Vec::new();

        let wants_card = request.overlay.show_reddit_ui || request.overlay.show_banner;
        if let (true, Some(card)) = (wants_card, request.title.as_ref()) {
            let narrated_title_end = request.beat_spans.first().map(|s| s.start).unwrap_or(0.0);
            let end = if narrated_title_end > 0.0 {
                narrated_title_end / speed
            } else {
                DEFAULT_TITLE_SECS.min(request.output_duration())
            };

            let mut text = sanitize(&card.title);
            if request.overlay.show_subreddit {
                if let Some(sub) = card.subreddit.as_deref().map(sanitize).filter(|s| !s.is_empty()) {
                    text = format!("r/{}\\N{}", sub, text);
                }
            }

            events.push(CaptionEvent {
                start: 0.0,
                end,
                text,
                style: "Title",
            });
        }

        events.extend(group_words_by_beat(
            &request.alignment.words,
            &request.beat_spans,
            request.captions.words_per_caption,
            speed,
        ));
        events
    }

    /// Build the FFmpeg invocation for a request whose captions are at `ass_path`.
    pub fn build_command(&self, request: &CompositionRequest, ass_path: &Path) -> FfmpegCommand {
        let video_chain = format!(
            "[0:v]setpts=PTS/{bg:.3},scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},fps={fps},ass='{ass}'[v]",
            bg = request.background.speed_multiplier,
            w = PLAY_RES_X,
            h = PLAY_RES_Y,
            fps = OUTPUT_FPS,
            ass = escape_filter_path(ass_path),
        );
        let audio_chain = format!("[1:a]atempo={:.3}[a]", request.playback_speed);

        FfmpegCommand::new(&request.output)
            .input_with_args(&request.background.path, ["-stream_loop", "-1"])
            .input(&request.narration)
            .filter_complex(format!("{};{}", video_chain, audio_chain))
            .map("[v]")
            .map("[a]")
            .video_codec("libx264")
            .preset(self.preset.clone())
            .crf(self.crf)
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec("aac")
            .audio_bitrate("192k")
            .output_args(["-movflags", "+faststart"])
            .duration(request.output_duration())
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, request: &CompositionRequest, cancel: &CancellationToken) -> MediaResult<PathBuf> {
        if !request.background.path.exists() {
            return Err(MediaError::FileNotFound(request.background.path.clone()));
        }
        if !request.narration.exists() {
            return Err(MediaError::FileNotFound(request.narration.clone()));
        }

        let ass_path = request.work_dir.join("captions.ass");
        let events = Self::caption_events(request);
        tokio::fs::write(&ass_path, build_ass(&request.captions, &events)).await?;
        debug!(job_id = %request.job_id, "Wrote {} caption events", events.len());

        let mut runner = FfmpegRunner::new().with_cancel(cancel.clone());
        if let Some(timeout) = self.timeout {
            runner = runner.with_timeout(timeout);
        }

        let started = Instant::now();
        runner.run(&self.build_command(request, &ass_path)).await?;
        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!("reel_render_duration_seconds").record(elapsed);

        if !request.output.exists() {
            return Err(MediaError::InvalidMedia(format!(
                "renderer produced no output at {}",
                request.output.display()
            )));
        }

        info!(
            job_id = %request.job_id,
            "Rendered {} in {:.1}s",
            request.output.display(),
            elapsed
        );
        Ok(request.output.clone())
    }
}

/// Quote a path for use inside an FFmpeg filter argument.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::WordTiming;

    fn request() -> CompositionRequest {
        CompositionRequest {
            job_id: JobId::from_string("job-1"),
            beat_spans: vec![
                BeatSpan { index: 0, start: 1.0, end: 2.0 },
                BeatSpan { index: 1, start: 2.0, end: 4.0 },
            ],
            alignment: AlignmentResult::new(
                4.0,
                vec![
                    WordTiming::new("Title", 0.0, 0.8),
                    WordTiming::new("A.", 1.0, 1.5),
                    WordTiming::new("B.", 2.0, 3.5),
                ],
            ),
            narration: PathBuf::from("/work/job-1/narration.mp3"),
            background: BackgroundClip {
                path: PathBuf::from("/assets/backgrounds/minecraft/a.mp4"),
                speed_multiplier: 1.5,
            },
            captions: CaptionStyle::default(),
            overlay: UiOverlay::default(),
            title: Some(TitleCard {
                title: "Title".into(),
                subreddit: Some("tifu".into()),
            }),
            playback_speed: 2.0,
            work_dir: PathBuf::from("/work/job-1"),
            output: PathBuf::from("/work/job-1/output.mp4"),
        }
    }

    #[test]
    fn test_caption_events_with_title_card() {
        let events = FfmpegRenderer::caption_events(&request());
        assert_eq!(events[0].style, "Title");
        assert_eq!(events[0].text, "r/tifu\\NTitle");
        assert!((events[0].end - 0.5).abs() < 1e-9);
        assert!(events[1..].iter().all(|e| e.style == "Caption"));
    }

    #[test]
    fn test_caption_events_follow_beats() {
        let events = FfmpegRenderer::caption_events(&request());
        let captions: Vec<&str> = events
            .iter()
            .filter(|e| e.style == "Caption")
            .map(|e| e.text.as_str())
            .collect();
        // Two words per caption, but the title and each beat stay separate.
        assert_eq!(captions, ["TITLE", "A.", "B."]);
    }

    #[test]
    fn test_caption_events_without_overlay() {
        let mut req = request();
        req.overlay = UiOverlay {
            show_subreddit: false,
            show_reddit_ui: false,
            show_banner: false,
        };
        let events = FfmpegRenderer::caption_events(&req);
        assert!(events.iter().all(|e| e.style == "Caption"));
    }

    #[test]
    fn test_build_command() {
        let req = request();
        let args = FfmpegRenderer::new()
            .build_command(&req, Path::new("/work/job-1/captions.ass"))
            .build_args();

        let filter_pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        let filter = &args[filter_pos + 1];
        assert!(filter.starts_with("[0:v]setpts=PTS/1.500,scale=1080:1920"));
        assert!(filter.contains("ass='/work/job-1/captions.ass'[v]"));
        assert!(filter.ends_with("[1:a]atempo=2.000[a]"));
        assert!(args.contains(&"2.000".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/work/job-1/output.mp4"));
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(escape_filter_path(Path::new("C:\\tmp\\it's.ass")), "C\\:/tmp/it\\'s.ass");
    }

    #[tokio::test]
    async fn test_render_missing_inputs() {
        let result = FfmpegRenderer::new()
            .render(&request(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
