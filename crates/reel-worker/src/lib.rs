//! Video generation worker.
//!
//! This crate provides:
//! - Job executor with bounded concurrency and a per-job deadline
//! - Content orchestration (story, narration, composition)
//! - Artifact delivery and terminal status writes
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod story;

pub use config::WorkerConfig;
pub use error::{GenerationError, GenerationResult, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::{init_tracing, JobLogger};
pub use orchestrator::{ContentOrchestrator, Stage, StageReporter};
pub use story::{DefaultStoryResolver, ResolvedStory, StoryResolver};
