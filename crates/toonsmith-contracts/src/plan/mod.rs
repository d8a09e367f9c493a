mod edits;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::styles::ArtStyle;

pub use edits::{PlanEdit, EDITABLE_FIELDS};

/// Number of story panels in every plan.
pub const PANEL_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    pub appearance: String,
    pub features: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outro {
    pub second_character: String,
    pub action: String,
    pub dialogue: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub subject: String,
    pub art_style: ArtStyle,
    pub character: Character,
    pub story_beats: [String; PANEL_COUNT],
    pub dialogues: [String; PANEL_COUNT],
    pub info_text: String,
    #[serde(default)]
    pub reference_sources: Vec<String>,
    pub outro: Outro,
    pub main_color: String,
    pub rendered_prompt: String,
    /// Fingerprint of the fields `rendered_prompt` was derived from.
    #[serde(default)]
    pub prompt_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan field '{field}' is empty")]
    Incomplete { field: String },
    #[error("panel {panel} is out of range (plans have 4 panels)")]
    PanelOutOfRange { panel: usize },
    #[error("unknown plan field '{0}'")]
    UnknownField(String),
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl Plan {
    /// Hash over every field except the rendered prompt itself.
    pub fn source_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.subject.as_bytes());
        hasher.update([0]);
        hasher.update(self.art_style.slug().as_bytes());
        for field in [
            &self.character.name,
            &self.character.appearance,
            &self.character.features,
        ] {
            hasher.update([0]);
            hasher.update(field.as_bytes());
        }
        for field in self.story_beats.iter().chain(self.dialogues.iter()) {
            hasher.update([1]);
            hasher.update(field.as_bytes());
        }
        hasher.update([2]);
        hasher.update(self.info_text.as_bytes());
        for source in &self.reference_sources {
            hasher.update([3]);
            hasher.update(source.as_bytes());
        }
        for field in [
            &self.outro.second_character,
            &self.outro.action,
            &self.outro.dialogue,
            &self.main_color,
        ] {
            hasher.update([4]);
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn is_prompt_stale(&self) -> bool {
        self.prompt_fingerprint != self.source_fingerprint()
    }

    /// Returns a copy carrying `prompt` as its rendered prompt, marked fresh.
    pub fn with_rendered_prompt(&self, prompt: impl Into<String>) -> Plan {
        let mut next = self.clone();
        next.rendered_prompt = prompt.into();
        next.prompt_fingerprint = next.source_fingerprint();
        next
    }

    /// Fails on the first blank field that prompt composition relies on.
    ///
    /// Dialogue lines may be blank: a panel without a speech bubble is valid.
    pub fn ensure_complete(&self) -> Result<(), PlanError> {
        let mut required: Vec<(String, &str)> = vec![
            ("subject".to_string(), self.subject.as_str()),
            ("character.name".to_string(), self.character.name.as_str()),
            (
                "character.appearance".to_string(),
                self.character.appearance.as_str(),
            ),
        ];
        for (idx, beat) in self.story_beats.iter().enumerate() {
            required.push((format!("beats.{}", idx + 1), beat.as_str()));
        }
        required.push(("info".to_string(), self.info_text.as_str()));
        required.push((
            "outro.character".to_string(),
            self.outro.second_character.as_str(),
        ));
        required.push(("outro.action".to_string(), self.outro.action.as_str()));
        required.push(("color".to_string(), self.main_color.as_str()));

        match required.into_iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(PlanError::Incomplete { field }),
            None => Ok(()),
        }
    }

    /// Info text as it appears inside the prompt: newlines collapsed to spaces.
    pub fn info_text_inline(&self) -> String {
        self.info_text
            .replace("\r\n", "\n")
            .replace('\n', " ")
            .trim()
            .to_string()
    }

    /// Every natural-language string that must reach the image prompt verbatim.
    pub fn quoted_texts(&self) -> Vec<String> {
        let mut quoted: Vec<String> = self
            .dialogues
            .iter()
            .map(|line| line.trim().to_string())
            .collect();
        quoted.push(self.info_text_inline());
        quoted.push(self.outro.dialogue.trim().to_string());
        quoted.retain(|text| !text.is_empty());
        quoted
    }
}
