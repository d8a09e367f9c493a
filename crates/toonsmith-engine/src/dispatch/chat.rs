use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::warn;
use serde_json::{json, Map, Value};
use toonsmith_contracts::backends::BackendVariant;
use toonsmith_contracts::results::GeneratedImage;

use super::ImageBackend;
use crate::config::EngineConfig;
use crate::gemini::{
    candidate_parts, generate_content_endpoint, safety_block_reason, user_text_contents,
};

/// `generateContent` with the prompt as the only message part.
pub(crate) struct ChatImageBackend {
    variant: BackendVariant,
}

impl ChatImageBackend {
    pub(crate) fn new(variant: BackendVariant) -> Self {
        Self { variant }
    }
}

impl ImageBackend for ChatImageBackend {
    fn variant(&self) -> BackendVariant {
        self.variant
    }

    fn endpoint(&self, config: &EngineConfig) -> String {
        generate_content_endpoint(&config.api_base, config.image_model(self.variant))
    }

    fn build_request(&self, config: &EngineConfig, prompt: &str) -> Value {
        let mut image_config = Map::new();
        image_config.insert(
            "aspectRatio".to_string(),
            Value::String(config.aspect_ratio.clone()),
        );
        if self.variant.supports_high_resolution() {
            image_config.insert(
                "imageSize".to_string(),
                Value::String(config.pro_image_size.clone()),
            );
        }

        json!({
            "contents": user_text_contents(prompt),
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": image_config,
            },
        })
    }

    fn extract_image(&self, response_payload: &Value) -> Result<Option<GeneratedImage>> {
        for part in candidate_parts(response_payload) {
            let data = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(|inline| inline.get("data"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64
                .decode(data.as_bytes())
                .context("Gemini image base64 decode failed")?;
            return Ok(Some(GeneratedImage::png(bytes)));
        }
        if let Some(reason) = safety_block_reason(response_payload) {
            warn!("{} returned no image ({reason})", self.variant);
        }
        Ok(None)
    }
}
