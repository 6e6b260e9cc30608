//! Shared data models for the reelforge backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle state machine and the status wire format
//! - Generation options (story source, narration voice, background, captions)
//! - Story beats and narration alignment

pub mod alignment;
pub mod beats;
pub mod error;
pub mod job;
pub mod options;
pub mod status;

pub use alignment::{AlignmentResult, BeatSpan, WordTiming};
pub use beats::{StoryBeats, BREAK_MARKER};
pub use error::{ModelError, ModelResult};
pub use job::{JobId, JobRecord, JobState, Transition, TransitionOutcome};
pub use options::{
    BackgroundCategory, BackgroundSpec, CaptionPosition, CaptionStyle, GenerationOptions,
    ProviderKind, StorySource, UiOverlay, VoiceGender, VoiceParams, VoiceSelection,
};
pub use status::{StatusResponse, WireStatus};
