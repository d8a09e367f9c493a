use serde_json::{json, Value};
use toonsmith_contracts::plan::{Character, Outro, Plan};
use toonsmith_contracts::styles::ArtStyle;

use crate::compose::draft_prompt;

pub(crate) fn sample_plan() -> Plan {
    let plan = Plan {
        subject: "페라이트 코어의 원리".to_string(),
        art_style: ArtStyle::Anime,
        character: Character {
            name: "코어짱".to_string(),
            appearance: "ring-shaped ferrite mascot with big sparkling eyes".to_string(),
            features: "curious, loves explaining magnets".to_string(),
        },
        story_beats: [
            "Core-chan frowns at a buzzing cable".to_string(),
            "She hugs the cable tightly".to_string(),
            "Noise sparks bounce off her ring".to_string(),
            "A clean signal flows to the speaker".to_string(),
        ],
        dialogues: [
            "이 노이즈 뭐야?".to_string(),
            "내가 감싸줄게!".to_string(),
            "저리 가!".to_string(),
            "깨끗해졌다!".to_string(),
        ],
        info_text: "페라이트는 고주파 노이즈를 흡수합니다.\n케이블 끝에 달아 주세요.".to_string(),
        reference_sources: vec!["youtube.com".to_string()],
        outro: Outro {
            second_character: "a tiny capacitor friend".to_string(),
            action: "both wave at the reader".to_string(),
            dialogue: "안녕".to_string(),
        },
        main_color: "pastel mint".to_string(),
        rendered_prompt: String::new(),
        prompt_fingerprint: String::new(),
    };
    let prompt = draft_prompt(&plan);
    plan.with_rendered_prompt(prompt)
}

/// Planner reply in the wire shape, wrapped as a generateContent response.
pub(crate) fn planner_reply(english_prompt: &str) -> Value {
    let body = json!({
        "subject": "Ferrite cores",
        "artStyle": "Instatoon",
        "recommendedCharacter": {
            "name": "코어짱",
            "appearance": "ring-shaped ferrite mascot",
            "features": "curious"
        },
        "storySummary": ["beat one", "beat two", "beat three", "beat four"],
        "dialogues": ["하나", "둘", "셋", "넷"],
        "infoTextBlock": "첫째 줄\n둘째 줄",
        "referenceSources": ["youtube.com"],
        "outroDetails": {
            "secondCharacter": "capacitor friend",
            "action": "waving",
            "dialogue": "안녕"
        },
        "mainColor": "mint",
        "englishPrompt": english_prompt
    });
    text_reply(&body.to_string())
}

pub(crate) fn text_reply(text: &str) -> Value {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
}

pub(crate) fn image_reply(data: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"parts": [
                {"text": "Here is your comic"},
                {"inlineData": {"mimeType": "image/png", "data": data}}
            ]}
        }]
    })
}
