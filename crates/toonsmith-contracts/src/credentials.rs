use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const USER_KEY_FIELD: &str = "user_api_key";
const ACTIVE_SOURCE_FIELD: &str = "active_source";

pub const PLATFORM_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Key typed in by the user and saved in the store file.
    #[default]
    User,
    /// Key provided by the environment the tool runs in.
    Platform,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialSource::User => "user",
            CredentialSource::Platform => "platform",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialSource {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" | "personal" => Ok(CredentialSource::User),
            "platform" | "env" | "managed" => Ok(CredentialSource::Platform),
            other => Err(format!(
                "Unknown credential source '{other}'. Expected 'user' or 'platform'."
            )),
        }
    }
}

/// Opaque API key. `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    source: CredentialSource,
}

impl Credential {
    pub fn new(value: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            value: value.into().trim().to_string(),
            source,
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Last four characters, e.g. `…x9Qa`.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.value.chars().collect();
        if chars.len() <= 4 {
            return "…".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("…{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("value", &self.masked())
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} key {}", self.source, self.masked())
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no API key configured for the {origin} source")]
    Missing { origin: CredentialSource },
    #[error("credential store {} could not be written", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Never caches: every lookup re-reads the file and the environment.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    platform_env: Vec<String>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            platform_env: PLATFORM_KEY_ENV_VARS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
        }
    }

    /// Overrides the environment variables consulted for the platform key.
    pub fn with_platform_env<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platform_env = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn active_source(&self) -> CredentialSource {
        read_json_object(&self.path)
            .and_then(|payload| {
                payload
                    .get(ACTIVE_SOURCE_FIELD)
                    .and_then(Value::as_str)
                    .and_then(|raw| raw.parse().ok())
            })
            .unwrap_or_default()
    }

    pub fn set_active_source(&self, source: CredentialSource) -> Result<(), CredentialError> {
        self.update(|payload| {
            payload.insert(
                ACTIVE_SOURCE_FIELD.to_string(),
                Value::String(source.as_str().to_string()),
            );
        })
    }

    pub fn set_user_key(&self, key: &str) -> Result<(), CredentialError> {
        let trimmed = key.trim().to_string();
        self.update(|payload| {
            payload.insert(USER_KEY_FIELD.to_string(), Value::String(trimmed));
        })
    }

    pub fn clear_user_key(&self) -> Result<(), CredentialError> {
        self.update(|payload| {
            payload.remove(USER_KEY_FIELD);
        })
    }

    /// Reads the credential for `source` right now.
    pub fn credential(&self, source: CredentialSource) -> Result<Credential, CredentialError> {
        let value = match source {
            CredentialSource::User => read_json_object(&self.path).and_then(|payload| {
                payload
                    .get(USER_KEY_FIELD)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            }),
            CredentialSource::Platform => self
                .platform_env
                .iter()
                .find_map(|name| non_empty_env(name)),
        };
        value
            .map(|value| Credential::new(value, source))
            .ok_or(CredentialError::Missing { origin: source })
    }

    pub fn active_credential(&self) -> Result<Credential, CredentialError> {
        self.credential(self.active_source())
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> Result<(), CredentialError> {
        let mut payload = read_json_object(&self.path).unwrap_or_default();
        apply(&mut payload);
        write_json_object(&self.path, &payload).map_err(|source| CredentialError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
