use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::warn;
use serde_json::{json, Value};
use toonsmith_contracts::backends::BackendVariant;
use toonsmith_contracts::results::GeneratedImage;

use super::ImageBackend;
use crate::config::EngineConfig;
use crate::gemini::predict_endpoint;

/// Dedicated `:predict` call: prompt, aspect ratio and one sample.
pub(crate) struct ImagenBackend;

impl ImageBackend for ImagenBackend {
    fn variant(&self) -> BackendVariant {
        BackendVariant::AlternateEngine
    }

    fn endpoint(&self, config: &EngineConfig) -> String {
        predict_endpoint(&config.api_base, config.image_model(self.variant()))
    }

    fn build_request(&self, config: &EngineConfig, prompt: &str) -> Value {
        json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": config.aspect_ratio,
            },
        })
    }

    fn extract_image(&self, response_payload: &Value) -> Result<Option<GeneratedImage>> {
        let predictions = response_payload
            .get("predictions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for row in &predictions {
            let encoded = row
                .get("bytesBase64Encoded")
                .or_else(|| row.get("bytes_base64_encoded"))
                .or_else(|| {
                    row.get("image")
                        .or_else(|| row.get("generatedImage"))
                        .and_then(|image| image.get("imageBytes"))
                })
                .and_then(Value::as_str)
                .unwrap_or_default();
            if encoded.is_empty() {
                continue;
            }
            let bytes = BASE64
                .decode(encoded.as_bytes())
                .context("Imagen image base64 decode failed")?;
            return Ok(Some(GeneratedImage::png(bytes)));
        }
        if let Some(reason) = predictions
            .iter()
            .find_map(|row| row.get("raiFilteredReason").and_then(Value::as_str))
        {
            warn!("{} filtered the image: {reason}", self.variant());
        }
        Ok(None)
    }
}
