//! FFmpeg CLI wrapper and video composition.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Process running with timeout and cooperative cancellation
//! - FFprobe media inspection
//! - ASS caption generation from narration word timings
//! - Background footage selection
//! - The [`Renderer`] contract and its FFmpeg implementation

pub mod background;
pub mod captions;
pub mod command;
pub mod compose;
pub mod error;
pub mod probe;

pub use background::BackgroundLibrary;
pub use captions::{build_ass, CaptionEvent};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use compose::{BackgroundClip, CompositionRequest, FfmpegRenderer, Renderer, TitleCard};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_media, MediaInfo};
