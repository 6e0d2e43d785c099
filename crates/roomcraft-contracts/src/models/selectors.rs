use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let (fallback_reason, requested_text) = if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            (
                Some(format!(
                    "Requested model '{requested_value}' unavailable for capability '{}'.",
                    capability.as_str()
                )),
                Some(requested_value.to_string()),
            )
        } else {
            (Some("No model specified; using default.".to_string()), None)
        };

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{}'.",
                capability.as_str()
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    #[test]
    fn model_selector_uses_requested_model() {
        let selection = ModelSelector::default()
            .select(Some("dryrun-text-1"), Capability::Text)
            .unwrap();
        assert_eq!(selection.model.provider, "dryrun");
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn model_selector_falls_back_for_wrong_capability() {
        let selection = ModelSelector::default()
            .select(Some("gemini-2.5-flash"), Capability::Edit)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash-image-preview");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'gemini-2.5-flash' unavailable for capability 'edit'.")
        );
        assert_eq!(selection.requested.as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn model_selector_falls_back_when_unspecified() {
        let selection = ModelSelector::default()
            .select(Some("  "), Capability::Text)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
    }

    #[test]
    fn model_selector_raises_when_no_models_for_capability() {
        let mut models = IndexMap::new();
        models.insert(
            "text-only".to_string(),
            ModelSpec {
                name: "text-only".to_string(),
                provider: "dryrun".to_string(),
                capabilities: vec![Capability::Text],
            },
        );
        let err = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("dryrun-image-1"), Capability::Image)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'image'.");
    }
}
