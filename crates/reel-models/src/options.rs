//! Generation options accepted at submission time.
//!
//! Options are validated once, when a job is submitted, and are treated as
//! immutable afterwards. Provider and story variants are tagged enums so the
//! worker matches on them exhaustively instead of probing optional fields.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use validator::Validate;

use crate::beats::BREAK_MARKER;
use crate::error::{ModelError, ModelResult};

/// Upper bound on embedded story size, in characters.
pub const MAX_STORY_CHARS: usize = 20_000;

/// Everything a worker needs to produce one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub story: StorySource,

    pub voice: VoiceSelection,

    #[validate(nested)]
    pub background: BackgroundSpec,

    #[serde(default)]
    #[validate(nested)]
    pub captions: CaptionStyle,

    #[serde(default)]
    pub overlay: UiOverlay,

    /// Narration playback speed applied at composition
    #[serde(default = "default_speed")]
    #[validate(range(min = 0.5, max = 2.0))]
    pub playback_speed: f32,

    /// Narrate only up to the first break marker
    #[serde(default)]
    pub cliffhanger: bool,
}

fn default_speed() -> f32 {
    1.0
}

impl GenerationOptions {
    /// Build options with default styling for an embedded story.
    pub fn embedded(text: impl Into<String>, voice: VoiceSelection, background: BackgroundSpec) -> Self {
        Self {
            story: StorySource::Embedded {
                title: None,
                text: text.into(),
                subreddit: None,
            },
            voice,
            background,
            captions: CaptionStyle::default(),
            overlay: UiOverlay::default(),
            playback_speed: default_speed(),
            cliffhanger: false,
        }
    }

    /// Validate the whole request.
    ///
    /// Derived range checks run first, then the checks that depend on
    /// variant contents.
    pub fn check(&self) -> ModelResult<()> {
        Validate::validate(self)?;
        self.story.check()?;
        self.voice.params().check()?;
        self.captions.check_colors()?;

        if self.cliffhanger {
            if let StorySource::Embedded { text, .. } = &self.story {
                if !text.contains(BREAK_MARKER) {
                    return Err(ModelError::submission(format!(
                        "cliffhanger stories must contain a {} marker",
                        BREAK_MARKER
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Where the story text comes from.
///
/// Accepts either a bare string (embedded text) or a tagged object:
/// `{"kind": "embedded", "text": ...}` / `{"kind": "fetch", "subreddit": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorySource {
    Embedded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subreddit: Option<String>,
    },
    Fetch {
        subreddit: String,
    },
}

impl StorySource {
    fn check(&self) -> ModelResult<()> {
        match self {
            StorySource::Embedded { text, title, .. } => {
                if text.trim().is_empty() {
                    return Err(ModelError::submission("story text must not be empty"));
                }
                if text.chars().count() > MAX_STORY_CHARS {
                    return Err(ModelError::submission(format!(
                        "story text exceeds {} characters",
                        MAX_STORY_CHARS
                    )));
                }
                if title.as_deref().is_some_and(|t| t.chars().count() > 300) {
                    return Err(ModelError::submission("story title exceeds 300 characters"));
                }
            }
            StorySource::Fetch { subreddit } => {
                let valid = !subreddit.is_empty()
                    && subreddit.len() <= 64
                    && subreddit.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return Err(ModelError::submission(format!("invalid subreddit: {:?}", subreddit)));
                }
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for StorySource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(tag = "kind", rename_all = "snake_case")]
        enum Tagged {
            Embedded {
                #[serde(default)]
                title: Option<String>,
                text: String,
                #[serde(default)]
                subreddit: Option<String>,
            },
            Fetch {
                subreddit: String,
            },
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Tagged(Tagged),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => StorySource::Embedded {
                title: None,
                text,
                subreddit: None,
            },
            Repr::Tagged(Tagged::Embedded { title, text, subreddit }) => {
                StorySource::Embedded { title, text, subreddit }
            }
            Repr::Tagged(Tagged::Fetch { subreddit }) => StorySource::Fetch { subreddit },
        })
    }
}

/// Narration provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Edge,
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Edge => "edge",
            ProviderKind::ElevenLabs => "elevenlabs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "edge" => Some(ProviderKind::Edge),
            "elevenlabs" => Some(ProviderKind::ElevenLabs),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Narrator voice, tagged by provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum VoiceSelection {
    Edge(VoiceParams),
    #[serde(rename = "elevenlabs")]
    ElevenLabs(VoiceParams),
}

impl VoiceSelection {
    pub fn edge(voice_id: impl Into<String>) -> Self {
        Self::Edge(VoiceParams::new(voice_id))
    }

    pub fn eleven_labs(voice_id: impl Into<String>) -> Self {
        Self::ElevenLabs(VoiceParams::new(voice_id))
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            VoiceSelection::Edge(_) => ProviderKind::Edge,
            VoiceSelection::ElevenLabs(_) => ProviderKind::ElevenLabs,
        }
    }

    pub fn params(&self) -> &VoiceParams {
        match self {
            VoiceSelection::Edge(params) | VoiceSelection::ElevenLabs(params) => params,
        }
    }
}

/// Provider-independent voice parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceParams {
    /// Catalog name (e.g. "adam") or a raw provider voice id
    pub voice_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<VoiceGender>,
    /// Speaking rate multiplier, 1.0 = normal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
}

impl VoiceParams {
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            gender: None,
            rate: None,
        }
    }

    fn check(&self) -> ModelResult<()> {
        if self.voice_id.trim().is_empty() {
            return Err(ModelError::submission("voice.voiceId must not be empty"));
        }
        if let Some(rate) = self.rate {
            if !(0.5..=2.0).contains(&rate) {
                return Err(ModelError::submission("voice.rate must be between 0.5 and 2.0"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
}

/// Background footage category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundCategory {
    Minecraft,
    Subway,
    Cooking,
    Workers,
    /// Any of the concrete categories
    Random,
}

impl BackgroundCategory {
    pub const CONCRETE: [BackgroundCategory; 4] = [
        BackgroundCategory::Minecraft,
        BackgroundCategory::Subway,
        BackgroundCategory::Cooking,
        BackgroundCategory::Workers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundCategory::Minecraft => "minecraft",
            BackgroundCategory::Subway => "subway",
            BackgroundCategory::Cooking => "cooking",
            BackgroundCategory::Workers => "workers",
            BackgroundCategory::Random => "random",
        }
    }
}

impl fmt::Display for BackgroundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundSpec {
    pub category: BackgroundCategory,
    #[serde(default = "default_speed")]
    #[validate(range(min = 0.25, max = 4.0))]
    pub speed_multiplier: f32,
}

impl BackgroundSpec {
    pub fn new(category: BackgroundCategory, speed_multiplier: f32) -> Self {
        Self {
            category,
            speed_multiplier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

/// Caption overlay styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptionStyle {
    #[validate(length(min = 1, max = 64))]
    pub font: String,
    #[validate(range(min = 12, max = 200))]
    pub size: u32,
    /// `#RRGGBB`
    pub color: String,
    pub outline_color: String,
    #[validate(range(max = 20))]
    pub outline_width: u32,
    pub shadow_color: String,
    #[validate(range(max = 20))]
    pub shadow_offset: u32,
    pub position: CaptionPosition,
    #[validate(range(min = 1, max = 6))]
    pub words_per_caption: u8,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            size: 84,
            color: "#FFFFFF".to_string(),
            outline_color: "#000000".to_string(),
            outline_width: 4,
            shadow_color: "#000000".to_string(),
            shadow_offset: 2,
            position: CaptionPosition::Center,
            words_per_caption: 2,
        }
    }
}

impl CaptionStyle {
    fn check_colors(&self) -> ModelResult<()> {
        for (field, value) in [
            ("color", &self.color),
            ("outlineColor", &self.outline_color),
            ("shadowColor", &self.shadow_color),
        ] {
            if parse_hex_color(value).is_none() {
                return Err(ModelError::submission(format!(
                    "captions.{} must be a #RRGGBB color, got {:?}",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

/// Parse `#RRGGBB` into its components.
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Optional title-card decorations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UiOverlay {
    pub show_subreddit: bool,
    pub show_reddit_ui: bool,
    pub show_banner: bool,
}

impl Default for UiOverlay {
    fn default() -> Self {
        Self {
            show_subreddit: true,
            show_reddit_ui: true,
            show_banner: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_short_form_request() {
        let options: GenerationOptions = serde_json::from_value(json!({
            "story": "A. [BREAK] B.",
            "voice": { "provider": "edge", "voiceId": "adam" },
            "background": { "category": "minecraft", "speedMultiplier": 1 }
        }))
        .unwrap();

        assert!(matches!(options.story, StorySource::Embedded { ref text, .. } if text == "A. [BREAK] B."));
        assert_eq!(options.voice.provider(), ProviderKind::Edge);
        assert_eq!(options.voice.params().voice_id, "adam");
        assert_eq!(options.background.category, BackgroundCategory::Minecraft);
        assert_eq!(options.captions, CaptionStyle::default());
        tokio_test::assert_ok!(options.check());
    }

    #[test]
    fn test_deserialize_tagged_story_and_elevenlabs_voice() {
        let options: GenerationOptions = serde_json::from_value(json!({
            "story": { "kind": "fetch", "subreddit": "AmItheAsshole" },
            "voice": { "provider": "elevenlabs", "voiceId": "rachel", "gender": "female" },
            "background": { "category": "random" },
            "cliffhanger": true
        }))
        .unwrap();

        assert_eq!(options.story, StorySource::Fetch { subreddit: "AmItheAsshole".into() });
        assert_eq!(options.voice.provider(), ProviderKind::ElevenLabs);
        assert_eq!(options.background.speed_multiplier, 1.0);
        tokio_test::assert_ok!(options.check());
    }

    #[test]
    fn test_unknown_provider_is_rejected_at_parse_time() {
        let result: Result<GenerationOptions, _> = serde_json::from_value(json!({
            "story": "text",
            "voice": { "provider": "polly", "voiceId": "x" },
            "background": { "category": "minecraft" }
        }));
        tokio_test::assert_err!(result);
    }

    #[test]
    fn test_validation_failures() {
        let base = GenerationOptions::embedded(
            "story",
            VoiceSelection::edge("adam"),
            BackgroundSpec::new(BackgroundCategory::Subway, 1.0),
        );

        let mut empty = base.clone();
        empty.story = StorySource::Embedded { title: None, text: "  ".into(), subreddit: None };
        assert!(matches!(empty.check(), Err(ModelError::Submission(_))));

        let mut fast = base.clone();
        fast.background.speed_multiplier = 10.0;
        tokio_test::assert_err!(fast.check());

        let mut color = base.clone();
        color.captions.color = "white".into();
        tokio_test::assert_err!(color.check());

        let mut cliff = base.clone();
        cliff.cliffhanger = true;
        tokio_test::assert_err!(cliff.check());

        let mut voice = base;
        voice.voice = VoiceSelection::edge("");
        tokio_test::assert_err!(voice.check());
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF8000"), Some((255, 128, 0)));
        assert_eq!(parse_hex_color("FF8000"), None);
        assert_eq!(parse_hex_color("#FF80"), None);
    }
}
