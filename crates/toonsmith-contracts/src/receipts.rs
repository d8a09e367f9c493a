use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::backends::BackendVariant;
use crate::plan::Plan;
use crate::results::GeneratedImage;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Sidecar JSON written next to every saved image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReceipt {
    pub schema_version: u64,
    pub backend: BackendVariant,
    pub model: String,
    pub prompt: String,
    pub subject: String,
    pub plan_fingerprint: String,
    pub mime_type: String,
    pub byte_len: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// sha256 of the image bytes.
    pub sha256: String,
    pub image_path: String,
    pub created_at: String,
    #[serde(default)]
    pub request: Map<String, Value>,
}

impl ImageReceipt {
    pub fn new(
        backend: BackendVariant,
        model: &str,
        plan: &Plan,
        image: &GeneratedImage,
        image_path: &Path,
    ) -> Self {
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            backend,
            model: model.to_string(),
            prompt: plan.rendered_prompt.clone(),
            subject: plan.subject.clone(),
            plan_fingerprint: plan.source_fingerprint(),
            mime_type: image.mime_type.clone(),
            byte_len: image.bytes.len() as u64,
            width: None,
            height: None,
            sha256: hex::encode(Sha256::digest(&image.bytes)),
            image_path: image_path.to_string_lossy().to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            request: Map::new(),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Attaches the outgoing request body with inline image data stripped.
    pub fn with_request(mut self, request: &Value) -> Self {
        if let Value::Object(map) = sanitize_payload(request) {
            self.request = map;
        }
        self
    }
}

/// Receipt path for an image: `panel.png` -> `panel.receipt.json`.
pub fn receipt_path_for(image_path: &Path) -> std::path::PathBuf {
    let stem = image_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    image_path.with_file_name(format!("{stem}.receipt.json"))
}

pub fn write_receipt(path: &Path, receipt: &ImageReceipt) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(receipt)?)?;
    Ok(())
}

fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "data" | "bytesbase64encoded" | "imagebytes" | "key"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}
