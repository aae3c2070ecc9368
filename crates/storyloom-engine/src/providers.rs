use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dryrun::DryrunEndpoint;
use crate::endpoint::{ImageEndpoint, TextEndpoint};
use crate::gemini::{GeminiClient, GeminiConfig};

/// Endpoints keyed by provider name, as named in the model registry.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    images: BTreeMap<String, Arc<dyn ImageEndpoint>>,
    texts: BTreeMap<String, Arc<dyn TextEndpoint>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_image(&mut self, endpoint: Arc<dyn ImageEndpoint>) {
        self.images.insert(endpoint.name().to_string(), endpoint);
    }

    pub fn register_text(&mut self, endpoint: Arc<dyn TextEndpoint>) {
        self.texts.insert(endpoint.name().to_string(), endpoint);
    }

    pub fn image(&self, name: &str) -> Option<Arc<dyn ImageEndpoint>> {
        self.images.get(name).cloned()
    }

    pub fn text(&self, name: &str) -> Option<Arc<dyn TextEndpoint>> {
        self.texts.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.images.keys().chain(self.texts.keys()).cloned().collect();
        names.sort();
        names.dedup();
        names
    }
}

pub fn default_provider_registry(gemini: &GeminiConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    let client = Arc::new(GeminiClient::new(gemini.clone()));
    registry.register_image(client.clone());
    registry.register_text(client);
    let dryrun = Arc::new(DryrunEndpoint::new());
    registry.register_image(dryrun.clone());
    registry.register_text(dryrun);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_gemini_and_dryrun() {
        let registry = default_provider_registry(&GeminiConfig::default());
        assert_eq!(registry.names(), vec!["dryrun".to_string(), "gemini".to_string()]);
        assert!(registry.image("gemini").is_some());
        assert!(registry.text("dryrun").is_some());
        assert!(registry.image("replicate").is_none());
    }

    #[test]
    fn registering_replaces_by_name() {
        let mut registry = ProviderRegistry::new();
        let dryrun = Arc::new(DryrunEndpoint::new());
        registry.register_image(dryrun.clone());
        registry.register_image(dryrun);
        assert_eq!(registry.names(), vec!["dryrun".to_string()]);
        assert!(registry.text("dryrun").is_none());
    }
}
