use crate::styles::ArtStyle;

use super::{Plan, PlanError, PANEL_COUNT};

/// One field-level replacement. Panel indices are zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEdit {
    Subject(String),
    ArtStyle(ArtStyle),
    CharacterName(String),
    CharacterAppearance(String),
    CharacterFeatures(String),
    StoryBeat { panel: usize, text: String },
    Dialogue { panel: usize, text: String },
    InfoText(String),
    ReferenceSources(Vec<String>),
    OutroSecondCharacter(String),
    OutroAction(String),
    OutroDialogue(String),
    MainColor(String),
    RenderedPrompt(String),
}

/// Field paths accepted by [`PlanEdit::from_field`], in display order.
pub const EDITABLE_FIELDS: &[&str] = &[
    "subject",
    "style",
    "character.name",
    "character.appearance",
    "character.features",
    "beats.<1-4>",
    "dialogues.<1-4>",
    "info",
    "sources",
    "outro.character",
    "outro.action",
    "outro.dialogue",
    "color",
    "prompt",
];

impl PlanEdit {
    /// Builds an edit from a user-facing field path such as `dialogues.2`.
    ///
    /// Panel numbers in paths are 1-based. `sources` takes a comma or
    /// newline separated list.
    pub fn from_field(path: &str, value: &str) -> Result<PlanEdit, PlanError> {
        let normalized = path.trim().to_ascii_lowercase();
        let value = value.to_string();
        let (head, panel) = match normalized.split_once('.') {
            Some((head, tail)) if tail.chars().all(|ch| ch.is_ascii_digit()) => {
                let number = tail
                    .parse::<usize>()
                    .map_err(|_| PlanError::UnknownField(path.trim().to_string()))?;
                (head.to_string(), Some(number))
            }
            _ => (normalized.clone(), None),
        };

        if let Some(number) = panel {
            if number == 0 || number > PANEL_COUNT {
                return Err(PlanError::PanelOutOfRange { panel: number });
            }
            let panel = number - 1;
            return match head.as_str() {
                "beats" | "beat" | "story" | "panel" => {
                    Ok(PlanEdit::StoryBeat { panel, text: value })
                }
                "dialogues" | "dialogue" | "line" => Ok(PlanEdit::Dialogue { panel, text: value }),
                _ => Err(PlanError::UnknownField(path.trim().to_string())),
            };
        }

        match head.as_str() {
            "subject" => Ok(PlanEdit::Subject(value)),
            "style" | "artstyle" => value
                .parse::<ArtStyle>()
                .map(PlanEdit::ArtStyle)
                .map_err(|reason| PlanError::InvalidValue {
                    field: "style".to_string(),
                    reason,
                }),
            "character.name" | "name" => Ok(PlanEdit::CharacterName(value)),
            "character.appearance" | "appearance" => Ok(PlanEdit::CharacterAppearance(value)),
            "character.features" | "features" => Ok(PlanEdit::CharacterFeatures(value)),
            "info" | "infotext" => Ok(PlanEdit::InfoText(value)),
            "sources" | "references" => Ok(PlanEdit::ReferenceSources(
                value
                    .split([',', '\n'])
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            "outro.character" | "outro.second" => Ok(PlanEdit::OutroSecondCharacter(value)),
            "outro.action" => Ok(PlanEdit::OutroAction(value)),
            "outro.dialogue" => Ok(PlanEdit::OutroDialogue(value)),
            "color" | "maincolor" => Ok(PlanEdit::MainColor(value)),
            "prompt" => Ok(PlanEdit::RenderedPrompt(value)),
            _ => Err(PlanError::UnknownField(path.trim().to_string())),
        }
    }

    pub fn field_name(&self) -> String {
        match self {
            PlanEdit::Subject(_) => "subject".to_string(),
            PlanEdit::ArtStyle(_) => "style".to_string(),
            PlanEdit::CharacterName(_) => "character.name".to_string(),
            PlanEdit::CharacterAppearance(_) => "character.appearance".to_string(),
            PlanEdit::CharacterFeatures(_) => "character.features".to_string(),
            PlanEdit::StoryBeat { panel, .. } => format!("beats.{}", panel + 1),
            PlanEdit::Dialogue { panel, .. } => format!("dialogues.{}", panel + 1),
            PlanEdit::InfoText(_) => "info".to_string(),
            PlanEdit::ReferenceSources(_) => "sources".to_string(),
            PlanEdit::OutroSecondCharacter(_) => "outro.character".to_string(),
            PlanEdit::OutroAction(_) => "outro.action".to_string(),
            PlanEdit::OutroDialogue(_) => "outro.dialogue".to_string(),
            PlanEdit::MainColor(_) => "color".to_string(),
            PlanEdit::RenderedPrompt(_) => "prompt".to_string(),
        }
    }
}

impl Plan {
    /// Returns a new plan with exactly one field replaced.
    ///
    /// Replacing the rendered prompt marks it fresh; any other edit leaves
    /// the stored fingerprint alone, so the prompt reads as stale until it is
    /// recomposed.
    pub fn with_edit(&self, edit: PlanEdit) -> Result<Plan, PlanError> {
        let mut next = self.clone();
        match edit {
            PlanEdit::Subject(text) => next.subject = text,
            PlanEdit::ArtStyle(style) => next.art_style = style,
            PlanEdit::CharacterName(text) => next.character.name = text,
            PlanEdit::CharacterAppearance(text) => next.character.appearance = text,
            PlanEdit::CharacterFeatures(text) => next.character.features = text,
            PlanEdit::StoryBeat { panel, text } => {
                let slot = next
                    .story_beats
                    .get_mut(panel)
                    .ok_or(PlanError::PanelOutOfRange { panel: panel + 1 })?;
                *slot = text;
            }
            PlanEdit::Dialogue { panel, text } => {
                let slot = next
                    .dialogues
                    .get_mut(panel)
                    .ok_or(PlanError::PanelOutOfRange { panel: panel + 1 })?;
                *slot = text;
            }
            PlanEdit::InfoText(text) => next.info_text = text,
            PlanEdit::ReferenceSources(sources) => next.reference_sources = sources,
            PlanEdit::OutroSecondCharacter(text) => next.outro.second_character = text,
            PlanEdit::OutroAction(text) => next.outro.action = text,
            PlanEdit::OutroDialogue(text) => next.outro.dialogue = text,
            PlanEdit::MainColor(text) => next.main_color = text,
            PlanEdit::RenderedPrompt(text) => return Ok(next.with_rendered_prompt(text)),
        }
        Ok(next)
    }
}
