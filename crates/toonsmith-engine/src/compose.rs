use log::{debug, warn};
use serde_json::{json, Value};
use toonsmith_contracts::credentials::Credential;
use toonsmith_contracts::plan::Plan;

use crate::config::{EngineConfig, PORTRAIT_ASPECT_RATIO};
use crate::error::{GenerationError, GenerationPhase};
use crate::gemini::{
    generate_content_endpoint, response_text, system_instruction, user_text_contents,
};
use crate::transport::GenerativeTransport;

pub const QUALITY_TAGS: [&str; 4] = ["masterpiece", "best quality", "8k", "ultra detailed"];
pub const INFO_BLOCK_TITLE: &str = "TIPS & INFO";

const RECOMPOSE_INSTRUCTION: &str = "You are a prompt engineer. Return ONLY the final prompt. \
NEVER translate the text inside quotes; keep it in the user's original language.";

fn aspect_directive() -> String {
    format!("--ar {PORTRAIT_ASPECT_RATIO}")
}

/// The intermediate request handed to the text model. Field order is fixed.
pub fn compose_request_text(plan: &Plan) -> String {
    let mut lines = vec![
        "Generate an image generation prompt for a vertical webtoon.".to_string(),
        "STRICT RULE: Keep all dialogue, info text, and outro dialogue in the ORIGINAL LANGUAGE. \
         DO NOT TRANSLATE."
            .to_string(),
        String::new(),
        format!(
            "1. Character: {} ({})",
            plan.character.name.trim(),
            plan.character.appearance.trim()
        ),
    ];
    if !plan.character.features.trim().is_empty() {
        lines.push(format!("   Traits: {}", plan.character.features.trim()));
    }

    lines.push("2. 4-Panel Story:".to_string());
    for (idx, (beat, dialogue)) in plan.story_beats.iter().zip(&plan.dialogues).enumerate() {
        lines.push(format!(
            "Panel {}: Action: {} | Text in speech bubble: \"{}\"",
            idx + 1,
            beat.trim(),
            dialogue.trim()
        ));
    }

    lines.push(String::new());
    lines.push("3. Info Block (Below 4 panels):".to_string());
    lines.push(format!("Title: \"{INFO_BLOCK_TITLE}\""));
    lines.push(format!(
        "Content: \"{}\" (Include this exact text in a clean infographic box)",
        plan.info_text_inline()
    ));

    lines.push(String::new());
    lines.push("4. Outro Panel (Final Panel):".to_string());
    lines.push(format!("Second Character: {}", plan.outro.second_character.trim()));
    lines.push(format!("Action: {}", plan.outro.action.trim()));
    lines.push(format!("Dialogue: \"{}\"", plan.outro.dialogue.trim()));

    lines.push(String::new());
    lines.push(format!(
        "Style: {} ({}), Main Color: {}",
        plan.art_style.english_name(),
        plan.art_style.keywords(),
        plan.main_color.trim()
    ));

    lines.push(String::new());
    lines.push("Final Instruction:".to_string());
    lines.push("- Create a single, cohesive English prompt.".to_string());
    lines.push(
        "- Mention \"vertical comic strip\" and \"4-panel with an extra info block and outro at the bottom\"."
            .to_string(),
    );
    lines.push(format!("- Quality: {}.", QUALITY_TAGS.join(", ")));
    lines.push(format!("- End with {}.", aspect_directive()));
    lines.join("\n")
}

/// Deterministic prompt built without the text model.
pub fn draft_prompt(plan: &Plan) -> String {
    let mut parts = vec![
        format!("{}, {}", QUALITY_TAGS.join(", "), plan.art_style.keywords()),
        "vertical comic strip, 4-panel layout with an extra info block and outro at the bottom, \
         infographic style"
            .to_string(),
    ];
    let mut character = format!(
        "main character {}, {}",
        plan.character.name.trim(),
        plan.character.appearance.trim()
    );
    if !plan.character.features.trim().is_empty() {
        character.push_str(&format!(", {}", plan.character.features.trim()));
    }
    parts.push(character);

    for (idx, (beat, dialogue)) in plan.story_beats.iter().zip(&plan.dialogues).enumerate() {
        let mut panel = format!("panel {}: {}", idx + 1, beat.trim());
        if !dialogue.trim().is_empty() {
            panel.push_str(&format!(", speech bubble says \"{}\"", dialogue.trim()));
        }
        parts.push(panel);
    }
    parts.push(format!(
        "info block titled \"{INFO_BLOCK_TITLE}\" containing \"{}\"",
        plan.info_text_inline()
    ));
    let mut outro = format!(
        "outro panel: {} joins, {}",
        plan.outro.second_character.trim(),
        plan.outro.action.trim()
    );
    if !plan.outro.dialogue.trim().is_empty() {
        outro.push_str(&format!(", saying \"{}\"", plan.outro.dialogue.trim()));
    }
    parts.push(outro);
    parts.push(format!("main color {}, soft lighting", plan.main_color.trim()));

    finalize_prompt(plan, &parts.join(". "))
}

/// Local guarantees on every rendered prompt.
///
/// - missing quality tags are prepended
/// - each non-blank quote of the plan appears verbatim
/// - `--ar 9:16` is the final token
pub fn finalize_prompt(plan: &Plan, text: &str) -> String {
    let mut body = strip_aspect_directives(text).trim().to_string();

    let lowered = body.to_lowercase();
    let missing_tags: Vec<&str> = QUALITY_TAGS
        .iter()
        .copied()
        .filter(|tag| !lowered.contains(tag))
        .collect();
    if !missing_tags.is_empty() {
        body = if body.is_empty() {
            missing_tags.join(", ")
        } else {
            format!("{}, {}", missing_tags.join(", "), body)
        };
    }

    let mut additions: Vec<String> = Vec::new();
    for (idx, dialogue) in plan.dialogues.iter().enumerate() {
        let dialogue = dialogue.trim();
        if !dialogue.is_empty() && !contains_quote(&body, dialogue) {
            additions.push(format!(
                "Panel {} text in speech bubble: \"{dialogue}\"",
                idx + 1
            ));
        }
    }
    let info = plan.info_text_inline();
    if !info.is_empty() && !contains_quote(&body, &info) {
        additions.push(format!("Info box \"{INFO_BLOCK_TITLE}\" text: \"{info}\""));
    }
    let outro = plan.outro.dialogue.trim();
    if !outro.is_empty() && !contains_quote(&body, outro) {
        additions.push(format!("Outro dialogue: \"{outro}\""));
    }
    if !additions.is_empty() {
        debug!("re-attaching {} quote(s) dropped by the text model", additions.len());
        let separator = if body.ends_with('.') { " " } else { ". " };
        body = format!("{body}{separator}{}.", additions.join(". "));
    }

    format!("{body} {}", aspect_directive())
}

fn contains_quote(body: &str, text: &str) -> bool {
    body.contains(&format!("\"{text}\""))
}

/// Removes standalone `--ar W:H` directives. Text inside `"..."` spans and
/// `--ar` glued to a word are left alone.
fn strip_aspect_directives(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_quote = false;
    let mut idx = 0;
    while let Some(ch) = text[idx..].chars().next() {
        if !in_quote {
            if let Some(len) = aspect_directive_len(text, idx) {
                idx += len;
                continue;
            }
        }
        if ch == '"' {
            // an unmatched opening quote does not start a span
            in_quote = !in_quote && text[idx + 1..].contains('"');
        }
        out.push(ch);
        idx += ch.len_utf8();
    }
    out.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte length of the `--ar W:H` directive starting at `idx`, if one does.
fn aspect_directive_len(text: &str, idx: usize) -> Option<usize> {
    let rest = text[idx..].strip_prefix("--ar")?;
    let at_boundary = text[..idx]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);
    let ratio = rest.trim_start();
    if !at_boundary || ratio.len() == rest.len() {
        return None;
    }
    let digits = |value: &str| {
        value
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(value.len())
    };
    let width = digits(ratio);
    let after_colon = ratio[width..].strip_prefix(':')?;
    let height = digits(after_colon);
    let tail = &after_colon[height..];
    if width == 0 || height == 0 || tail.chars().next().is_some_and(char::is_alphanumeric) {
        return None;
    }
    Some("--ar".len() + rest.len() - tail.len())
}

fn recompose_payload(plan: &Plan) -> Value {
    json!({
        "contents": user_text_contents(&compose_request_text(plan)),
        "systemInstruction": system_instruction(RECOMPOSE_INSTRUCTION),
    })
}

/// Rebuilds the rendered prompt from the current plan fields.
///
/// An empty model reply keeps the plan's previous prompt. The plan itself is
/// never modified; the caller decides whether to store the result.
pub fn recompose(
    transport: &dyn GenerativeTransport,
    config: &EngineConfig,
    plan: &Plan,
    credential: &Credential,
) -> Result<String, GenerationError> {
    let phase = GenerationPhase::Recompose;
    plan.ensure_complete()
        .map_err(|source| GenerationError::Precondition { phase, source })?;

    let endpoint = generate_content_endpoint(&config.api_base, &config.text_model);
    let response = transport
        .post_json(&endpoint, credential, &recompose_payload(plan))
        .map_err(|source| GenerationError::Transport { phase, source })?;

    let text = response_text(&response);
    let text = text.trim();
    if text.is_empty() {
        if plan.rendered_prompt.trim().is_empty() {
            return Err(GenerationError::EmptyResponse { phase });
        }
        warn!("text model returned an empty prompt; keeping the previous one");
        return Ok(plan.rendered_prompt.clone());
    }
    Ok(finalize_prompt(plan, text))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toonsmith_contracts::credentials::{Credential, CredentialSource};
    use toonsmith_contracts::plan::{Plan, PlanEdit};

    use super::{compose_request_text, draft_prompt, finalize_prompt, recompose};
    use crate::config::EngineConfig;
    use crate::error::{GenerationError, GenerationPhase};
    use crate::testing::{sample_plan, text_reply};
    use crate::transport::scripted::{status_error, ScriptedTransport};

    fn credential() -> Credential {
        Credential::new("user-key-1234", CredentialSource::User)
    }

    #[test]
    fn request_text_lists_fields_in_fixed_order() {
        let plan = sample_plan();
        let text = compose_request_text(&plan);
        let character = text.find("1. Character: 코어짱").unwrap_or(usize::MAX);
        let panel_one = text.find("Panel 1: Action:").unwrap_or(usize::MAX);
        let panel_four = text.find("Panel 4: Action:").unwrap_or(usize::MAX);
        let info = text.find("Title: \"TIPS & INFO\"").unwrap_or(usize::MAX);
        let outro = text.find("Dialogue: \"안녕\"").unwrap_or(usize::MAX);
        let style = text.find("Style: Anime").unwrap_or(usize::MAX);
        assert!(character < panel_one);
        assert!(panel_one < panel_four);
        assert!(panel_four < info);
        assert!(info < outro);
        assert!(outro < style);
        assert!(text.contains(
            "Content: \"페라이트는 고주파 노이즈를 흡수합니다. 케이블 끝에 달아 주세요.\""
        ));
        assert!(text.contains("Text in speech bubble: \"내가 감싸줄게!\""));
    }

    #[test]
    fn finalize_restores_quotes_tags_and_directive() {
        let plan = sample_plan();
        let finalized = finalize_prompt(
            &plan,
            "--ar 9:16 A vertical comic strip about ferrite cores, \"Hello\" --ar 1:1",
        );
        assert!(finalized.starts_with("masterpiece, best quality, 8k, ultra detailed, "));
        assert!(finalized.ends_with(" --ar 9:16"));
        assert_eq!(finalized.matches("--ar").count(), 1);
        for quote in plan.quoted_texts() {
            assert!(finalized.contains(&format!("\"{quote}\"")), "{quote} missing");
        }
    }

    #[test]
    fn finalize_leaves_quoted_and_glued_ar_alone() {
        let mut plan = sample_plan();
        plan.outro.dialogue = "모드 --ar 1:1 끝".to_string();
        let finalized = finalize_prompt(
            &plan,
            "a guitar--arpeggio scene, outro says \"모드 --ar 1:1 끝\" --ar 9:16",
        );
        assert!(finalized.contains("guitar--arpeggio scene"));
        assert_eq!(finalized.matches("\"모드 --ar 1:1 끝\"").count(), 1);
        assert!(!finalized.contains("모드  끝"));
        assert!(!finalized.contains("Outro dialogue:"));
        assert!(finalized.ends_with(" --ar 9:16"));
        // one directive once the quoted line is taken out
        assert_eq!(
            finalized.replace("\"모드 --ar 1:1 끝\"", "").matches("--ar").count(),
            1
        );
    }

    #[test]
    fn finalize_strips_only_well_formed_directives() {
        let plan = sample_plan();
        let finalized = finalize_prompt(&plan, "scene --ar 4:3, wide --armor shot --ar 16:9x");
        assert!(!finalized.contains("--ar 4:3"));
        assert!(finalized.contains("--armor shot"));
        assert!(finalized.contains("--ar 16:9x"));
        assert!(finalized.ends_with(" --ar 9:16"));
    }

    #[test]
    fn short_dialogue_inside_longer_quote_is_reattached() {
        let mut plan = sample_plan();
        plan.dialogues[1] = "둘".to_string();
        let finalized = finalize_prompt(&plan, "panel 2 bubble \"둘째 줄\"");
        assert!(finalized.contains("Panel 2 text in speech bubble: \"둘\""));
    }

    #[test]
    fn finalize_keeps_prompt_that_already_complies() {
        let plan = sample_plan();
        let complete = draft_prompt(&plan);
        assert_eq!(finalize_prompt(&plan, &complete), complete);
    }

    #[test]
    fn draft_prompt_is_complete_and_deterministic() {
        let plan = sample_plan();
        let draft = draft_prompt(&plan);
        assert_eq!(draft, draft_prompt(&plan));
        assert!(draft.contains("vertical comic strip"));
        assert!(draft.contains("\"안녕\""));
        assert!(draft.ends_with("--ar 9:16"));
    }

    #[test]
    fn recompose_keeps_outro_dialogue_verbatim() {
        let plan = sample_plan();
        // model translated the outro line; the original must still be present
        let transport = ScriptedTransport::new().reply(text_reply(
            "masterpiece, best quality, 8k, ultra detailed, vertical comic strip, \
             outro says \"Bye\" --ar 9:16",
        ));
        let prompt = recompose(&transport, &EngineConfig::default(), &plan, &credential())
            .unwrap_or_default();
        assert!(prompt.contains("\"안녕\""));
        assert!(prompt.ends_with("--ar 9:16"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let sent = calls[0].payload["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or("");
        assert!(sent.contains("Dialogue: \"안녕\""));
        assert!(calls[0].payload["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .contains("NEVER translate"));
    }

    #[test]
    fn empty_reply_returns_previous_prompt() {
        let plan = sample_plan();
        let transport = ScriptedTransport::new().reply(text_reply("   "));
        let prompt = recompose(&transport, &EngineConfig::default(), &plan, &credential());
        assert_eq!(prompt, Ok(plan.rendered_prompt.clone()));
    }

    #[test]
    fn empty_reply_without_previous_prompt_is_an_error() {
        let plan = Plan {
            rendered_prompt: String::new(),
            ..sample_plan()
        };
        let transport = ScriptedTransport::new().reply(json!({"candidates": []}));
        let result = recompose(&transport, &EngineConfig::default(), &plan, &credential());
        assert_eq!(
            result,
            Err(GenerationError::EmptyResponse {
                phase: GenerationPhase::Recompose
            })
        );
    }

    #[test]
    fn backend_failure_is_a_recompose_error() {
        let plan = sample_plan();
        let transport = ScriptedTransport::new().fail(status_error(500, "INTERNAL"));
        let err = recompose(&transport, &EngineConfig::default(), &plan, &credential())
            .err()
            .map(|err| err.phase());
        assert_eq!(err, Some(GenerationPhase::Recompose));
    }

    #[test]
    fn incomplete_plan_fails_before_any_call() -> anyhow::Result<()> {
        let plan = sample_plan().with_edit(PlanEdit::MainColor("  ".to_string()))?;
        let transport = ScriptedTransport::new();
        let result = recompose(&transport, &EngineConfig::default(), &plan, &credential());
        assert!(matches!(result, Err(GenerationError::Precondition { .. })));
        assert!(transport.calls().is_empty());
        Ok(())
    }
}
