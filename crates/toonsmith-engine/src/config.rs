use std::time::Duration;

use log::warn;
use toonsmith_contracts::backends::BackendVariant;
use toonsmith_contracts::models::ModelSelector;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
pub const PORTRAIT_ASPECT_RATIO: &str = "9:16";
pub const PRO_IMAGE_SIZE: &str = "2K";

/// Everything a core operation needs besides the plan and the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub api_base: String,
    pub text_model: String,
    pub fast_image_model: String,
    pub pro_image_model: String,
    pub alternate_image_model: String,
    pub aspect_ratio: String,
    pub pro_image_size: String,
    /// Handed to the HTTP transport; the core itself never times out.
    pub request_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            fast_image_model: BackendVariant::StandardFast.default_model().to_string(),
            pro_image_model: BackendVariant::StandardPro.default_model().to_string(),
            alternate_image_model: BackendVariant::AlternateEngine.default_model().to_string(),
            aspect_ratio: PORTRAIT_ASPECT_RATIO.to_string(),
            pro_image_size: PRO_IMAGE_SIZE.to_string(),
            request_timeout: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let selector = ModelSelector::new(None);
        let model = |key: &str, fallback: &str, capability: &str| {
            resolve_model(&selector, lookup(key), fallback, capability)
        };

        Self {
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            text_model: model("TOONSMITH_TEXT_MODEL", &defaults.text_model, "text"),
            fast_image_model: model(
                "TOONSMITH_FAST_IMAGE_MODEL",
                &defaults.fast_image_model,
                BackendVariant::StandardFast.capability(),
            ),
            pro_image_model: model(
                "TOONSMITH_PRO_IMAGE_MODEL",
                &defaults.pro_image_model,
                BackendVariant::StandardPro.capability(),
            ),
            alternate_image_model: model(
                "TOONSMITH_ALTERNATE_IMAGE_MODEL",
                &defaults.alternate_image_model,
                BackendVariant::AlternateEngine.capability(),
            ),
            aspect_ratio: defaults.aspect_ratio,
            pro_image_size: defaults.pro_image_size,
            request_timeout: lookup("TOONSMITH_REQUEST_TIMEOUT").and_then(|raw| {
                let timeout = raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|seconds| *seconds > 0.0)
                    .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok());
                match timeout {
                    Some(timeout) => Some(timeout),
                    None => {
                        warn!("ignoring TOONSMITH_REQUEST_TIMEOUT={raw:?}; expected seconds > 0");
                        None
                    }
                }
            }),
        }
    }

    pub fn image_model(&self, backend: BackendVariant) -> &str {
        match backend {
            BackendVariant::StandardFast => &self.fast_image_model,
            BackendVariant::StandardPro => &self.pro_image_model,
            BackendVariant::AlternateEngine => &self.alternate_image_model,
        }
    }
}

fn resolve_model(
    selector: &ModelSelector,
    requested: Option<String>,
    fallback: &str,
    capability: &str,
) -> String {
    let Some(requested) = requested else {
        return fallback.to_string();
    };
    match selector.select(Some(&requested), capability) {
        Ok(selection) if selection.fallback_reason.is_none() => selection.model.name,
        Ok(selection) => {
            warn!(
                "{} Using {fallback}.",
                selection.fallback_reason.unwrap_or_default()
            );
            fallback.to_string()
        }
        Err(reason) => {
            warn!("{reason} Using {fallback}.");
            fallback.to_string()
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::EngineConfig;
    use toonsmith_contracts::backends::BackendVariant;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(
            config.image_model(BackendVariant::StandardPro),
            "gemini-3-pro-image-preview"
        );
        assert_eq!(config.aspect_ratio, "9:16");
    }

    #[test]
    fn overrides_are_validated_against_registry() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_BASE", "http://localhost:9000/v1beta/"),
            ("TOONSMITH_TEXT_MODEL", "models/gemini-2.5-pro"),
            ("TOONSMITH_PRO_IMAGE_MODEL", "imagen-4.0-generate-001"),
            ("TOONSMITH_ALTERNATE_IMAGE_MODEL", "imagen-4.0-ultra-generate-001"),
            ("TOONSMITH_REQUEST_TIMEOUT", "45"),
        ]));
        assert_eq!(config.api_base, "http://localhost:9000/v1beta");
        assert_eq!(config.text_model, "gemini-2.5-pro");
        // dedicated-image model cannot serve the chat variant
        assert_eq!(config.pro_image_model, "gemini-3-pro-image-preview");
        assert_eq!(config.alternate_image_model, "imagen-4.0-ultra-generate-001");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn bad_timeout_is_ignored() {
        let config =
            EngineConfig::from_lookup(lookup_from(&[("TOONSMITH_REQUEST_TIMEOUT", "soon")]));
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn unrepresentable_timeout_is_ignored() {
        for raw in ["inf", "NaN", "1e300", "-5", "0"] {
            let config =
                EngineConfig::from_lookup(lookup_from(&[("TOONSMITH_REQUEST_TIMEOUT", raw)]));
            assert_eq!(config.request_timeout, None, "{raw}");
        }
        let config =
            EngineConfig::from_lookup(lookup_from(&[("TOONSMITH_REQUEST_TIMEOUT", "2.5")]));
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));
    }
}
