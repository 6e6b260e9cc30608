//! Provider lookup by [`ProviderKind`].

use std::collections::HashMap;
use std::sync::Arc;

use reel_models::{ProviderKind, VoiceSelection};
use tracing::{info, warn};

use crate::edge::{EdgeTtsConfig, EdgeTtsProvider};
use crate::elevenlabs::{ElevenLabsConfig, ElevenLabsProvider};
use crate::error::{NarrationError, NarrationResult};
use crate::provider::NarrationProvider;

/// Registered narration providers.
#[derive(Clone, Default)]
pub struct NarrationRegistry {
    providers: HashMap<ProviderKind, Arc<dyn NarrationProvider>>,
}

impl NarrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one of the same kind.
    pub fn register(mut self, provider: Arc<dyn NarrationProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> NarrationResult<Arc<dyn NarrationProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(NarrationError::NotConfigured(kind))
    }

    /// Provider for a voice selection.
    pub fn for_voice(&self, voice: &VoiceSelection) -> NarrationResult<Arc<dyn NarrationProvider>> {
        self.get(voice.provider())
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Edge is always registered; ElevenLabs only when an API key is set.
    pub fn from_env() -> Self {
        let mut registry = Self::new().register(Arc::new(EdgeTtsProvider::new(EdgeTtsConfig::from_env())));

        match ElevenLabsConfig::from_env().map(ElevenLabsProvider::new) {
            Some(Ok(provider)) => registry = registry.register(Arc::new(provider)),
            Some(Err(e)) => warn!("ElevenLabs provider disabled: {}", e),
            None => info!("ELEVENLABS_API_KEY not set, ElevenLabs narration disabled"),
        }

        registry
    }
}

impl std::fmt::Debug for NarrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationRegistry").field("providers", &self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_voice() {
        let registry = NarrationRegistry::new().register(Arc::new(EdgeTtsProvider::default()));

        let provider = registry.for_voice(&VoiceSelection::edge("adam")).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Edge);

        let missing = registry.for_voice(&VoiceSelection::eleven_labs("adam"));
        assert!(matches!(missing, Err(NarrationError::NotConfigured(ProviderKind::ElevenLabs))));
    }

    #[test]
    fn test_register_replaces_same_kind() {
        let registry = NarrationRegistry::new()
            .register(Arc::new(EdgeTtsProvider::default()))
            .register(Arc::new(EdgeTtsProvider::default()));
        assert_eq!(registry.kinds(), vec![ProviderKind::Edge]);
    }
}
