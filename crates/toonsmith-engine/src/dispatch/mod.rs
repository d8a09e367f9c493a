mod chat;
mod imagen;

use anyhow::Result;
use log::{debug, warn};
use serde_json::Value;
use toonsmith_contracts::backends::{BackendVariant, TransportShape};
use toonsmith_contracts::credentials::Credential;
use toonsmith_contracts::results::{
    GeneratedImage, GenerationResult, ImageErrorKind, ImageGenerationError,
};

use crate::config::EngineConfig;
use crate::transport::GenerativeTransport;

use chat::ChatImageBackend;
use imagen::ImagenBackend;

pub trait ImageBackend {
    fn variant(&self) -> BackendVariant;
    fn endpoint(&self, config: &EngineConfig) -> String;
    fn build_request(&self, config: &EngineConfig, prompt: &str) -> Value;
    /// First inline image in the response, `None` when there is none.
    fn extract_image(&self, response_payload: &Value) -> Result<Option<GeneratedImage>>;
}

pub fn backend_for(variant: BackendVariant) -> Box<dyn ImageBackend> {
    match variant.transport() {
        TransportShape::Chat => Box::new(ChatImageBackend::new(variant)),
        TransportShape::Dedicated => Box::new(ImagenBackend),
    }
}

/// Endpoint and body `generate_image` would send for `variant`.
pub fn image_request(
    config: &EngineConfig,
    prompt: &str,
    variant: BackendVariant,
) -> (String, Value) {
    let backend = backend_for(variant);
    (backend.endpoint(config), backend.build_request(config, prompt))
}

/// Maps backend error text to a kind. Markers are checked in order; the
/// first match wins.
pub fn classify_failure(message: &str) -> ImageErrorKind {
    const MARKERS: &[(&[&str], ImageErrorKind)] = &[
        (&["403", "PERMISSION_DENIED"], ImageErrorKind::AccessDenied),
        (&["404", "NOT_FOUND"], ImageErrorKind::ModelUnavailable),
        (&["429", "RESOURCE_EXHAUSTED"], ImageErrorKind::QuotaExceeded),
        (&["SAFETY"], ImageErrorKind::SafetyBlocked),
    ];
    MARKERS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| message.contains(needle)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ImageErrorKind::Unknown)
}

fn failure(variant: BackendVariant, raw_message: String) -> GenerationResult {
    let err = ImageGenerationError {
        kind: classify_failure(&raw_message),
        backend: variant,
        raw_message,
    };
    warn!("{err}");
    GenerationResult::Failure(err)
}

pub fn generate_image(
    transport: &dyn GenerativeTransport,
    config: &EngineConfig,
    prompt: &str,
    credential: &Credential,
    variant: BackendVariant,
) -> GenerationResult {
    let backend = backend_for(variant);
    let endpoint = backend.endpoint(config);
    let payload = backend.build_request(config, prompt);
    debug!("dispatching {} image request to {endpoint}", variant.as_str());

    let response = match transport.post_json(&endpoint, credential, &payload) {
        Ok(response) => response,
        Err(err) => return failure(variant, err.to_string()),
    };
    match backend.extract_image(&response) {
        Ok(Some(image)) => GenerationResult::Image(image),
        Ok(None) => GenerationResult::Empty,
        Err(err) => GenerationResult::Failure(ImageGenerationError {
            kind: ImageErrorKind::Unknown,
            backend: variant,
            raw_message: format!("{err:#}"),
        }),
    }
}
