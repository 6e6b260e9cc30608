//! Voice catalog.
//!
//! Friendly names are shared across providers; anything not in the catalog
//! is passed through as a provider-native voice id.

use reel_models::{VoiceGender, VoiceParams};

struct CatalogVoice {
    name: &'static str,
    gender: VoiceGender,
    elevenlabs: &'static str,
    edge: &'static str,
}

const CATALOG: &[CatalogVoice] = &[
    CatalogVoice { name: "brian", gender: VoiceGender::Male, elevenlabs: "nPczCjzI2devNBz1zQrb", edge: "en-US-BrianNeural" },
    CatalogVoice { name: "adam", gender: VoiceGender::Male, elevenlabs: "pNInz6obpgDQGcFmaJgB", edge: "en-US-GuyNeural" },
    CatalogVoice { name: "antoni", gender: VoiceGender::Male, elevenlabs: "ErXwobaYiN019PkySvjV", edge: "en-US-ChristopherNeural" },
    CatalogVoice { name: "sarah", gender: VoiceGender::Female, elevenlabs: "EXAVITQu4vr4xnSDxMaL", edge: "en-US-AriaNeural" },
    CatalogVoice { name: "laura", gender: VoiceGender::Female, elevenlabs: "FGY2WhTYpPnrIDTdsKH5", edge: "en-US-JennyNeural" },
    CatalogVoice { name: "rachel", gender: VoiceGender::Female, elevenlabs: "21m00Tcm4TlvDq8ikWAM", edge: "en-US-MichelleNeural" },
];

fn lookup(voice_id: &str) -> Option<&'static CatalogVoice> {
    CATALOG.iter().find(|v| v.name.eq_ignore_ascii_case(voice_id.trim()))
}

/// ElevenLabs voice id for a selection.
pub fn elevenlabs_voice(params: &VoiceParams) -> String {
    lookup(&params.voice_id)
        .map(|v| v.elevenlabs.to_string())
        .unwrap_or_else(|| params.voice_id.trim().to_string())
}

/// Edge neural voice for a selection.
///
/// Unknown names that look like an Edge short name (`xx-XX-NameNeural`) pass
/// through; any other unknown name falls back to a default for the gender.
pub fn edge_voice(params: &VoiceParams) -> String {
    if let Some(voice) = lookup(&params.voice_id) {
        return voice.edge.to_string();
    }
    let raw = params.voice_id.trim();
    if raw.ends_with("Neural") && raw.matches('-').count() >= 2 {
        return raw.to_string();
    }
    match params.gender {
        Some(VoiceGender::Female) => "en-US-JennyNeural".to_string(),
        _ => "en-US-GuyNeural".to_string(),
    }
}

/// Catalog gender for a friendly name.
pub fn catalog_gender(voice_id: &str) -> Option<VoiceGender> {
    lookup(voice_id).map(|v| v.gender)
}
