use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backends::BackendVariant;

pub const PREVIEW_MIME_TYPE: &str = "image/png";

#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: PREVIEW_MIME_TYPE.to_string(),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageErrorKind {
    AccessDenied,
    ModelUnavailable,
    QuotaExceeded,
    SafetyBlocked,
    Unknown,
}

impl ImageErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageErrorKind::AccessDenied => "access_denied",
            ImageErrorKind::ModelUnavailable => "model_unavailable",
            ImageErrorKind::QuotaExceeded => "quota_exceeded",
            ImageErrorKind::SafetyBlocked => "safety_blocked",
            ImageErrorKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend} image generation failed ({}): {raw_message}", .kind.as_str())]
pub struct ImageGenerationError {
    pub kind: ImageErrorKind,
    pub backend: BackendVariant,
    pub raw_message: String,
}

impl ImageGenerationError {
    pub fn user_message(&self) -> String {
        let backend = self.backend.display_name();
        match self.kind {
            ImageErrorKind::AccessDenied => format!(
                "Access denied for {backend}. This backend may require a paid or allowlisted API key."
            ),
            ImageErrorKind::ModelUnavailable => {
                format!("{backend} model not found or not available in your region.")
            }
            ImageErrorKind::QuotaExceeded => {
                format!("Quota exceeded on {backend}. Please try again later.")
            }
            ImageErrorKind::SafetyBlocked => {
                format!("{backend} blocked the image with its safety filters.")
            }
            ImageErrorKind::Unknown => {
                if self.raw_message.trim().is_empty() {
                    format!("{backend} image generation failed.")
                } else {
                    self.raw_message.clone()
                }
            }
        }
    }

    pub fn suggested_backend(&self) -> BackendVariant {
        self.backend.alternative()
    }
}

/// Outcome of one image dispatch. Never carries both an image and a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Image(GeneratedImage),
    Empty,
    Failure(ImageGenerationError),
}

impl GenerationResult {
    pub fn image(&self) -> Option<&GeneratedImage> {
        match self {
            GenerationResult::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ImageGenerationError> {
        match self {
            GenerationResult::Failure(err) => Some(err),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GenerationResult::Image(_) => "image",
            GenerationResult::Empty => "empty",
            GenerationResult::Failure(_) => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GeneratedImage, GenerationResult, ImageErrorKind, ImageGenerationError};
    use crate::backends::BackendVariant;

    #[test]
    fn unknown_failure_surfaces_raw_message() {
        let err = ImageGenerationError {
            kind: ImageErrorKind::Unknown,
            backend: BackendVariant::StandardFast,
            raw_message: "socket closed".to_string(),
        };
        assert_eq!(err.user_message(), "socket closed");
        assert_eq!(err.suggested_backend(), BackendVariant::AlternateEngine);
    }

    #[test]
    fn classified_failure_names_backend() {
        let err = ImageGenerationError {
            kind: ImageErrorKind::QuotaExceeded,
            backend: BackendVariant::StandardPro,
            raw_message: "429 RESOURCE_EXHAUSTED".to_string(),
        };
        assert!(err.user_message().contains("Standard Pro"));
        assert!(err.to_string().contains("quota_exceeded"));
    }

    #[test]
    fn data_uri_uses_png_mime() {
        let image = GeneratedImage::png(vec![1, 2, 3]);
        assert_eq!(image.data_uri(), "data:image/png;base64,AQID");
        let result = GenerationResult::Image(image);
        assert!(result.failure().is_none());
        assert_eq!(result.label(), "image");
        assert!(format!("{result:?}").contains("<3 bytes>"));
    }
}
