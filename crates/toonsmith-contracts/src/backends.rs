use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Interchangeable image-generation configurations.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendVariant {
    StandardFast,
    #[default]
    StandardPro,
    AlternateEngine,
}

/// Request framing used by a backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportShape {
    /// Chat-completion call; the prompt is the only message part.
    Chat,
    /// Dedicated image-generation call with an image list in the response.
    Dedicated,
}

impl BackendVariant {
    pub const ALL: [BackendVariant; 3] = [
        BackendVariant::StandardFast,
        BackendVariant::StandardPro,
        BackendVariant::AlternateEngine,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendVariant::StandardFast => "fast",
            BackendVariant::StandardPro => "pro",
            BackendVariant::AlternateEngine => "alternate",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BackendVariant::StandardFast => "Standard (fast)",
            BackendVariant::StandardPro => "Standard Pro (2K)",
            BackendVariant::AlternateEngine => "Alternate engine",
        }
    }

    pub fn transport(self) -> TransportShape {
        match self {
            BackendVariant::StandardFast | BackendVariant::StandardPro => TransportShape::Chat,
            BackendVariant::AlternateEngine => TransportShape::Dedicated,
        }
    }

    /// Only the pro variant accepts the high-resolution image size flag.
    pub fn supports_high_resolution(self) -> bool {
        matches!(self, BackendVariant::StandardPro)
    }

    /// Model registry capability the variant's model must carry.
    pub fn capability(self) -> &'static str {
        match self.transport() {
            TransportShape::Chat => "image-chat",
            TransportShape::Dedicated => "image-dedicated",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            BackendVariant::StandardFast => "gemini-2.5-flash-image",
            BackendVariant::StandardPro => "gemini-3-pro-image-preview",
            BackendVariant::AlternateEngine => "imagen-4.0-generate-001",
        }
    }

    /// Variant worth trying next when this one fails.
    pub fn alternative(self) -> BackendVariant {
        match self {
            BackendVariant::StandardPro => BackendVariant::StandardFast,
            BackendVariant::StandardFast => BackendVariant::AlternateEngine,
            BackendVariant::AlternateEngine => BackendVariant::StandardFast,
        }
    }
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for BackendVariant {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fast" | "standard_fast" | "standard" | "flash" => Ok(BackendVariant::StandardFast),
            "pro" | "standard_pro" | "hd" => Ok(BackendVariant::StandardPro),
            "alternate" | "alternate_engine" | "alt" | "imagen" => {
                Ok(BackendVariant::AlternateEngine)
            }
            other => Err(format!(
                "Unknown backend '{other}'. Expected one of: fast, pro, alternate."
            )),
        }
    }
}
