use std::fmt;

use thiserror::Error;
use toonsmith_contracts::credentials::CredentialError;
use toonsmith_contracts::plan::PlanError;

/// Failure of one outbound HTTP call, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{provider} request failed ({status}): {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} request failed: {message}")]
    Network { provider: String, message: String },
    #[error("{provider} returned invalid JSON payload: {message}")]
    InvalidJson { provider: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    Synthesize,
    Recompose,
}

impl GenerationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationPhase::Synthesize => "synthesize",
            GenerationPhase::Recompose => "recompose",
        }
    }
}

impl fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("{phase} call failed")]
    Transport {
        phase: GenerationPhase,
        #[source]
        source: TransportError,
    },
    #[error("{phase} response could not be parsed: {reason}")]
    Parse {
        phase: GenerationPhase,
        reason: String,
    },
    #[error("{phase} response was empty")]
    EmptyResponse { phase: GenerationPhase },
    #[error("plan is not ready to {phase}")]
    Precondition {
        phase: GenerationPhase,
        #[source]
        source: PlanError,
    },
}

impl GenerationError {
    pub fn phase(&self) -> GenerationPhase {
        match self {
            GenerationError::Transport { phase, .. }
            | GenerationError::Parse { phase, .. }
            | GenerationError::EmptyResponse { phase }
            | GenerationError::Precondition { phase, .. } => *phase,
        }
    }

    pub fn user_message(&self) -> String {
        if let GenerationError::Precondition { source, .. } = self {
            return format!("기획안이 아직 완성되지 않았습니다: {source}");
        }
        match self.phase() {
            GenerationPhase::Synthesize => {
                "기획안 생성 중 오류가 발생했습니다. API 키를 확인해주세요.".to_string()
            }
            GenerationPhase::Recompose => "프롬프트 갱신 중 오류가 발생했습니다.".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("subject is empty")]
    EmptySubject,
    #[error("no plan yet; create one first")]
    NoPlan,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::EmptySubject => "주제를 입력해주세요!".to_string(),
            SessionError::NoPlan => "먼저 기획안을 만들어주세요.".to_string(),
            SessionError::Credential(CredentialError::Missing { .. }) => {
                "설정에서 Gemini API 키를 먼저 저장해주세요!".to_string()
            }
            SessionError::Credential(err) => err.to_string(),
            SessionError::Plan(err) => err.to_string(),
            SessionError::Generation(err) => err.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerationError, GenerationPhase, SessionError, TransportError};
    use toonsmith_contracts::credentials::{CredentialError, CredentialSource};

    #[test]
    fn phase_is_carried_by_every_variant() {
        let err = GenerationError::Transport {
            phase: GenerationPhase::Recompose,
            source: TransportError::Network {
                provider: "Gemini".to_string(),
                message: "connection reset".to_string(),
            },
        };
        assert_eq!(err.phase(), GenerationPhase::Recompose);
        assert!(err.user_message().contains("프롬프트"));

        let err = GenerationError::Parse {
            phase: GenerationPhase::Synthesize,
            reason: "missing field `mainColor`".to_string(),
        };
        assert_eq!(err.phase(), GenerationPhase::Synthesize);
        assert!(err.to_string().starts_with("synthesize response"));
    }

    #[test]
    fn missing_key_has_dedicated_message() {
        let err = SessionError::from(CredentialError::Missing {
            origin: CredentialSource::User,
        });
        assert!(err.user_message().contains("API 키"));
    }
}
