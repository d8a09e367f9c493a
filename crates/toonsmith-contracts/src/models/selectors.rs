use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

/// Resolves a user-supplied model name against a [`ModelRegistry`].
#[derive(Debug, Clone)]
pub struct ModelSelector {
    registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Picks `requested` when it supports `capability`, else the registry
    /// default for the capability together with the reason for the swap.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        if let Some(model) = requested
            .as_deref()
            .and_then(|name| self.registry.ensure(name, capability))
        {
            return Ok(ModelSelection {
                model,
                requested,
                fallback_reason: None,
            });
        }

        let model = self
            .registry
            .by_capability(capability)
            .into_iter()
            .next()
            .ok_or_else(|| format!("No models available for capability '{capability}'."))?;
        let fallback_reason = match requested.as_deref() {
            Some(name) => {
                format!("Requested model '{name}' unavailable for capability '{capability}'.")
            }
            None => "No model specified; using default.".to_string(),
        };
        Ok(ModelSelection {
            model,
            requested,
            fallback_reason: Some(fallback_reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::ModelSelector;
    use crate::models::{ModelRegistry, ModelSpec};

    fn spec(name: &str, capability: &str) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: "gemini".to_string(),
            capabilities: vec![capability.to_string()],
        }
    }

    #[test]
    fn known_model_is_selected_without_fallback() {
        let selection = ModelSelector::new(None)
            .select(Some("models/gemini-3-pro-image-preview"), "image-chat")
            .unwrap();
        assert_eq!(selection.model.name, "gemini-3-pro-image-preview");
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn capability_mismatch_falls_back_with_reason() {
        let selection = ModelSelector::new(None)
            .select(Some("imagen-4.0-generate-001"), "image-chat")
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash-image");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'imagen-4.0-generate-001' unavailable for capability 'image-chat'.")
        );
    }

    #[test]
    fn blank_request_uses_default() {
        let selection = ModelSelector::new(None).select(Some("  "), "text").unwrap();
        assert_eq!(selection.model.name, "gemini-3-flash-preview");
        assert_eq!(selection.requested, None);
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
    }

    #[test]
    fn empty_capability_is_an_error() {
        let mut models = IndexMap::new();
        models.insert("text-only".to_string(), spec("text-only", "text"));
        let err = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("gemini-3-pro-image-preview"), "image-chat")
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'image-chat'.");
    }
}
