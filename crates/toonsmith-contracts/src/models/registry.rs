use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// Known models in preference order; the first model carrying a capability
/// is the default for it.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

/// Built-in catalogue: (name, provider, capabilities).
const DEFAULT_MODELS: &[(&str, &str, &[&str])] = &[
    ("gemini-3-flash-preview", "gemini", &["text"]),
    ("gemini-3-pro-preview", "gemini", &["text"]),
    ("gemini-2.5-flash", "gemini", &["text"]),
    ("gemini-2.5-pro", "gemini", &["text"]),
    ("gemini-2.5-flash-image", "gemini", &["image-chat"]),
    ("gemini-3-pro-image-preview", "gemini", &["image-chat"]),
    ("imagen-4.0-generate-001", "imagen", &["image-dedicated"]),
    ("imagen-4.0-fast-generate-001", "imagen", &["image-dedicated"]),
    ("imagen-4.0-ultra-generate-001", "imagen", &["image-dedicated"]),
];

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    /// Lookup by bare name; a leading `models/` is ignored.
    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim().trim_start_matches("models/"))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.list()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        self.get(name)
            .filter(|model| model.supports(capability))
            .cloned()
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    DEFAULT_MODELS
        .iter()
        .map(|(name, provider, capabilities)| {
            let spec = ModelSpec {
                name: (*name).to_string(),
                provider: (*provider).to_string(),
                capabilities: capabilities.iter().map(|item| (*item).to_string()).collect(),
            };
            ((*name).to_string(), spec)
        })
        .collect()
}
