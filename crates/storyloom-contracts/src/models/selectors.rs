use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Resolves `requested` for `capability`, falling back to the first model
    /// that offers the capability. A fallback reason is set only when a
    /// requested model was replaced.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        if let Some(model) = requested.and_then(|name| self.registry.ensure(name, capability)) {
            return Ok(ModelSelection {
                model,
                requested: requested.map(str::to_string),
                fallback_reason: None,
            });
        }

        let Some(model) = self.registry.by_capability(capability).first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        let fallback_reason = requested.map(|name| {
            format!("Requested model '{name}' unavailable for capability '{capability}'.")
        });
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn text_model(name: &str) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: "dryrun".to_string(),
            capabilities: vec![Capability::Text],
            context_window: None,
        }
    }

    #[test]
    fn falls_back_when_requested_model_unavailable() {
        let selection = ModelSelector::new(None)
            .select(Some("missing"), Capability::Image)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash-image");
        assert_eq!(selection.requested.as_deref(), Some("missing"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'missing' unavailable for capability 'image'.")
        );
    }

    #[test]
    fn blank_request_uses_default_without_fallback_reason() {
        let selection = ModelSelector::new(None)
            .select(Some("  "), Capability::Text)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash");
        assert_eq!(selection.requested, None);
        assert!(selection.fallback_reason.is_none());

        let selection = ModelSelector::new(None).select(None, Capability::Image).unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash-image");
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn exact_match_has_no_fallback_reason() {
        let selection = ModelSelector::new(None)
            .select(Some("dryrun-image-1"), Capability::Image)
            .unwrap();
        assert_eq!(selection.model.provider, "dryrun");
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn errors_when_no_models_for_capability() {
        let mut models = IndexMap::new();
        models.insert("text-only".to_string(), text_model("text-only"));
        let err = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("gemini-2.5-flash-image"), Capability::Image)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'image'.");
    }
}
