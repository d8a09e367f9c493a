use serde_json::{json, Value};

pub(crate) fn model_path(model: &str) -> String {
    let trimmed = model.trim();
    if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    }
}

pub fn generate_content_endpoint(api_base: &str, model: &str) -> String {
    format!("{}/{}:generateContent", api_base, model_path(model))
}

pub fn predict_endpoint(api_base: &str, model: &str) -> String {
    format!("{}/{}:predict", api_base, model_path(model))
}

/// A single user turn carrying `text` as its only part.
pub(crate) fn user_text_contents(text: &str) -> Value {
    json!([{
        "role": "user",
        "parts": [{ "text": text }],
    }])
}

pub(crate) fn system_instruction(text: &str) -> Value {
    json!({ "parts": [{ "text": text }] })
}

pub(crate) fn candidate_parts(response_payload: &Value) -> Vec<Value> {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(|candidates| {
            candidates
                .iter()
                .filter_map(|candidate| {
                    candidate
                        .get("content")
                        .and_then(|content| content.get("parts"))
                        .and_then(Value::as_array)
                })
                .flatten()
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Concatenated text of the first candidate, thought parts skipped.
pub(crate) fn response_text(response_payload: &Value) -> String {
    let Some(first) = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
    else {
        return String::new();
    };
    first
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Safety block reported by the backend in a successful (200) response.
pub(crate) fn safety_block_reason(response_payload: &Value) -> Option<String> {
    if let Some(reason) = response_payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Some(reason.to_string());
    }
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.get("finishReason").and_then(Value::as_str))
        .find(|reason| reason.contains("SAFETY") || *reason == "PROHIBITED_CONTENT")
        .map(str::to_string)
}

/// Strips one surrounding markdown code fence, with or without a language tag.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
