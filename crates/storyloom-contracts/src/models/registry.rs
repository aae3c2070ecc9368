use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Text,
    Image,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Image => "image",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Known models keyed by name, in preference order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        self.get(name)
            .filter(|model| model.supports(capability))
            .cloned()
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert =
        |name: &str, provider: &str, capabilities: &[Capability], context_window: Option<u64>| {
            map.insert(
                name.to_string(),
                ModelSpec {
                    name: name.to_string(),
                    provider: provider.to_string(),
                    capabilities: capabilities.to_vec(),
                    context_window,
                },
            );
        };

    insert(
        "gemini-2.5-flash",
        "gemini",
        &[Capability::Text],
        Some(1_048_576),
    );
    insert(
        "gemini-2.5-flash-image",
        "gemini",
        &[Capability::Image],
        None,
    );
    insert(
        "gemini-3-pro-image-preview",
        "gemini",
        &[Capability::Image],
        None,
    );
    insert("gemini-2.5-pro", "gemini", &[Capability::Text], Some(1_048_576));
    insert("dryrun-text-1", "dryrun", &[Capability::Text], Some(8192));
    insert("dryrun-image-1", "dryrun", &[Capability::Image], None);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_prefers_gemini_models() {
        let registry = ModelRegistry::new(None);
        let images = registry.by_capability(Capability::Image);
        assert_eq!(images[0].name, "gemini-2.5-flash-image");
        assert!(images.iter().any(|model| model.provider == "dryrun"));

        let texts = registry.by_capability(Capability::Text);
        assert_eq!(texts[0].name, "gemini-2.5-flash");
    }

    #[test]
    fn ensure_rejects_wrong_capability() {
        let registry = ModelRegistry::new(None);
        assert!(registry
            .ensure("gemini-2.5-flash", Capability::Image)
            .is_none());
        assert_eq!(
            registry
                .ensure("dryrun-image-1", Capability::Image)
                .map(|model| model.provider),
            Some("dryrun".to_string())
        );
    }
}
