//! Narration synthesis.
//!
//! This crate provides:
//! - The [`NarrationProvider`] contract: text in, audio file plus word timings out
//! - ElevenLabs (HTTP, character alignment) and Edge (edge-tts CLI) providers
//! - A voice catalog mapping friendly names to provider voices
//! - A registry selecting the provider named by the generation options

pub mod edge;
pub mod elevenlabs;
pub mod error;
pub mod provider;
pub mod registry;
pub mod voices;

pub use edge::{EdgeTtsConfig, EdgeTtsProvider};
pub use elevenlabs::{ElevenLabsConfig, ElevenLabsProvider};
pub use error::{NarrationError, NarrationResult};
pub use provider::{Narration, NarrationProvider, SpeechRequest};
pub use registry::NarrationRegistry;
