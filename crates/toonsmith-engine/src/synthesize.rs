use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use toonsmith_contracts::credentials::Credential;
use toonsmith_contracts::plan::{Character, Outro, Plan, PANEL_COUNT};
use toonsmith_contracts::styles::ArtStyle;

use crate::compose::{draft_prompt, finalize_prompt};
use crate::config::EngineConfig;
use crate::error::{GenerationError, GenerationPhase};
use crate::gemini::{
    generate_content_endpoint, response_text, safety_block_reason, strip_code_fence,
    system_instruction, user_text_contents,
};
use crate::transport::GenerativeTransport;

const PLANNER_INSTRUCTION: &str = r#"당신은 AI 이미지 생성용 세로형 웹툰을 기획하는 크리에이티브 디렉터입니다.
사용자가 주는 [주제]와 [화풍]으로 독창적인 4컷 웹툰 기획안을 JSON으로 작성하세요.

- recommendedCharacter: 캐릭터 이름, 외모 묘사, 성격 및 특징
- storySummary: 1~4컷 상황 (정확히 4개)
- dialogues: 1~4컷 대사 (정확히 4개, storySummary와 같은 순서)
- infoTextBlock: 4컷 아래에 들어갈 실용적인 팁이나 정보 (줄바꿈 포함 3~6줄)
- referenceSources: 참고한 출처나 URL 예시 (예: youtube.com)
- outroDetails: 아웃트로에 등장할 두 번째 캐릭터, 두 캐릭터의 포즈와 상황, 아웃트로 대사
- mainColor: 메인 컬러 테마
- englishPrompt: 이미지 생성 AI용 최적화 영어 프롬프트

englishPrompt 작성 절대 규칙:
1. dialogues, infoTextBlock, 아웃트로 대사는 절대로 번역하지 말고 원문 그대로 따옴표 안에 넣으세요. (예: speech bubble says "안녕하세요")
2. 구성 순서: 품질 태그, 화풍 키워드, 캐릭터 묘사, 4컷 레이아웃과 컷별 대사, 정보 텍스트 영역, 아웃트로 패널, 색감과 조명.
3. 품질 태그 masterpiece, best quality, 8k, ultra detailed 필수.
4. vertical comic strip, 4-panel layout, infographic style 명시.
5. 마지막에 반드시 --ar 9:16 추가."#;

/// Planner output as the backend sends it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePlan {
    recommended_character: Character,
    story_summary: [String; PANEL_COUNT],
    dialogues: [String; PANEL_COUNT],
    info_text_block: String,
    #[serde(default)]
    reference_sources: Vec<String>,
    outro_details: Outro,
    main_color: String,
    #[serde(default)]
    english_prompt: String,
}

fn string_array_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": { "type": "STRING" },
        "minItems": PANEL_COUNT,
        "maxItems": PANEL_COUNT,
    })
}

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "subject": { "type": "STRING" },
            "artStyle": { "type": "STRING" },
            "recommendedCharacter": {
                "type": "OBJECT",
                "properties": {
                    "name": { "type": "STRING" },
                    "appearance": { "type": "STRING" },
                    "features": { "type": "STRING" },
                },
                "required": ["name", "appearance", "features"],
            },
            "storySummary": string_array_schema(),
            "dialogues": string_array_schema(),
            "infoTextBlock": { "type": "STRING" },
            "referenceSources": { "type": "ARRAY", "items": { "type": "STRING" } },
            "outroDetails": {
                "type": "OBJECT",
                "properties": {
                    "secondCharacter": { "type": "STRING" },
                    "action": { "type": "STRING" },
                    "dialogue": { "type": "STRING" },
                },
                "required": ["secondCharacter", "action", "dialogue"],
            },
            "mainColor": { "type": "STRING" },
            "englishPrompt": { "type": "STRING" },
        },
        "required": [
            "subject",
            "artStyle",
            "recommendedCharacter",
            "storySummary",
            "dialogues",
            "infoTextBlock",
            "referenceSources",
            "outroDetails",
            "mainColor",
            "englishPrompt",
        ],
    })
}

pub(crate) fn planner_request_text(subject: &str, style: ArtStyle) -> String {
    format!("주제: \"{}\", 화풍: \"{}\"", subject.trim(), style.label())
}

fn synthesize_payload(subject: &str, style: ArtStyle) -> Value {
    json!({
        "contents": user_text_contents(&planner_request_text(subject, style)),
        "systemInstruction": system_instruction(PLANNER_INSTRUCTION),
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
        },
    })
}

fn parse_error(reason: impl Into<String>) -> GenerationError {
    GenerationError::Parse {
        phase: GenerationPhase::Synthesize,
        reason: reason.into(),
    }
}

/// Asks the text model for a complete plan. Either every field is present
/// and non-blank, or the whole call fails.
pub fn synthesize(
    transport: &dyn GenerativeTransport,
    config: &EngineConfig,
    subject: &str,
    style: ArtStyle,
    credential: &Credential,
) -> Result<Plan, GenerationError> {
    let phase = GenerationPhase::Synthesize;
    let endpoint = generate_content_endpoint(&config.api_base, &config.text_model);
    let response = transport
        .post_json(&endpoint, credential, &synthesize_payload(subject, style))
        .map_err(|source| GenerationError::Transport { phase, source })?;

    let text = response_text(&response);
    let body = strip_code_fence(&text);
    if body.is_empty() {
        if let Some(reason) = safety_block_reason(&response) {
            return Err(parse_error(format!("planner response blocked ({reason})")));
        }
        return Err(GenerationError::EmptyResponse { phase });
    }

    let wire: WirePlan =
        serde_json::from_str(body).map_err(|err| parse_error(err.to_string()))?;
    let plan = plan_from_wire(subject, style, wire);
    plan.ensure_complete()
        .map_err(|err| parse_error(err.to_string()))?;
    debug!(
        "planner returned '{}' with {} reference source(s)",
        plan.character.name,
        plan.reference_sources.len()
    );
    Ok(plan)
}

fn plan_from_wire(subject: &str, style: ArtStyle, wire: WirePlan) -> Plan {
    let plan = Plan {
        subject: subject.trim().to_string(),
        art_style: style,
        character: wire.recommended_character,
        story_beats: wire.story_summary,
        dialogues: wire.dialogues,
        info_text: wire.info_text_block,
        reference_sources: wire
            .reference_sources
            .into_iter()
            .map(|source| source.trim().to_string())
            .filter(|source| !source.is_empty())
            .collect(),
        outro: wire.outro_details,
        main_color: wire.main_color,
        rendered_prompt: String::new(),
        prompt_fingerprint: String::new(),
    };
    let prompt = if wire.english_prompt.trim().is_empty() {
        warn!("planner returned no englishPrompt; drafting one locally");
        draft_prompt(&plan)
    } else {
        finalize_prompt(&plan, &wire.english_prompt)
    };
    plan.with_rendered_prompt(prompt)
}
