use std::sync::Arc;

use log::{info, warn};
use serde_json::{json, Map, Value};
use toonsmith_contracts::backends::BackendVariant;
use toonsmith_contracts::credentials::{Credential, CredentialStore};
use toonsmith_contracts::events::{self, EventLog, EventPayload};
use toonsmith_contracts::plan::{Plan, PlanEdit};
use toonsmith_contracts::results::{GeneratedImage, GenerationResult};
use toonsmith_contracts::styles::ArtStyle;

use crate::compose;
use crate::config::EngineConfig;
use crate::dispatch;
use crate::error::SessionError;
use crate::synthesize;
use crate::transport::GenerativeTransport;
use crate::verify;

/// Claim on the session state for one image dispatch.
#[derive(Debug, Clone)]
pub struct ImageTicket {
    token: u64,
    backend: BackendVariant,
    plan: Arc<Plan>,
}

impl ImageTicket {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn backend(&self) -> BackendVariant {
        self.backend
    }

    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }
}

/// The most recent accepted image and what produced it.
#[derive(Debug, Clone)]
pub struct SessionImage {
    pub image: GeneratedImage,
    pub backend: BackendVariant,
    pub model: String,
    pub plan: Arc<Plan>,
}

/// One live plan, its latest image, and the token that keeps late image
/// results from overwriting newer state.
pub struct Session {
    config: EngineConfig,
    store: CredentialStore,
    transport: Arc<dyn GenerativeTransport>,
    events: Option<EventLog>,
    plan: Option<Arc<Plan>>,
    image: Option<SessionImage>,
    token: u64,
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_else(Map::new)
}

impl Session {
    pub fn new(
        config: EngineConfig,
        store: CredentialStore,
        transport: Arc<dyn GenerativeTransport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            events: None,
            plan: None,
            image: None,
            token: 0,
        }
    }

    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn plan(&self) -> Option<Arc<Plan>> {
        self.plan.clone()
    }

    pub fn image(&self) -> Option<&SessionImage> {
        self.image.as_ref()
    }

    /// Latest request token; any ticket with an older token is stale.
    pub fn current_token(&self) -> u64 {
        self.token
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(event_type, map_object(payload)) {
            warn!("failed to record {event_type} event: {err:#}");
        }
    }

    fn require_plan(&self) -> Result<Arc<Plan>, SessionError> {
        self.plan.clone().ok_or(SessionError::NoPlan)
    }

    fn active_credential(&self) -> Result<Credential, SessionError> {
        Ok(self.store.active_credential()?)
    }

    /// Installs a plan that was loaded from disk. Pending images are orphaned.
    pub fn replace_plan(&mut self, plan: Plan) -> Arc<Plan> {
        self.token += 1;
        self.image = None;
        let plan = Arc::new(plan);
        self.plan = Some(plan.clone());
        plan
    }

    pub fn create_plan(
        &mut self,
        subject: &str,
        style: ArtStyle,
    ) -> Result<Arc<Plan>, SessionError> {
        if subject.trim().is_empty() {
            return Err(SessionError::EmptySubject);
        }
        let credential = self.active_credential()?;

        self.token += 1;
        self.plan = None;
        self.image = None;

        match synthesize::synthesize(
            self.transport.as_ref(),
            &self.config,
            subject,
            style,
            &credential,
        ) {
            Ok(plan) => {
                let plan = Arc::new(plan);
                info!("plan created for '{}' ({})", plan.subject, style.slug());
                self.emit(
                    events::PLAN_CREATED,
                    json!({
                        "subject": plan.subject,
                        "style": style.slug(),
                        "character": plan.character.name,
                        "fingerprint": plan.source_fingerprint(),
                        "credential": credential.masked(),
                    }),
                );
                self.plan = Some(plan.clone());
                Ok(plan)
            }
            Err(err) => {
                self.emit(
                    events::PLAN_FAILED,
                    json!({
                        "subject": subject.trim(),
                        "style": style.slug(),
                        "phase": err.phase().as_str(),
                        "error": err.to_string(),
                    }),
                );
                Err(err.into())
            }
        }
    }

    pub fn apply_edit(&mut self, edit: PlanEdit) -> Result<Arc<Plan>, SessionError> {
        let current = self.require_plan()?;
        let field = edit.field_name();
        let next = Arc::new(current.with_edit(edit)?);
        self.emit(
            events::PLAN_EDITED,
            json!({
                "field": field,
                "prompt_stale": next.is_prompt_stale(),
            }),
        );
        self.plan = Some(next.clone());
        Ok(next)
    }

    /// Rebuilds the prompt. On failure the live plan is left exactly as it was.
    pub fn recompose(&mut self) -> Result<Arc<Plan>, SessionError> {
        let current = self.require_plan()?;
        let credential = self.active_credential()?;
        match compose::recompose(
            self.transport.as_ref(),
            &self.config,
            &current,
            &credential,
        ) {
            Ok(prompt) if prompt == current.rendered_prompt => {
                self.emit(
                    events::PROMPT_RECOMPOSED,
                    json!({ "changed": false, "prompt_stale": current.is_prompt_stale() }),
                );
                Ok(current)
            }
            Ok(prompt) => {
                let next = Arc::new(current.with_rendered_prompt(prompt));
                self.emit(
                    events::PROMPT_RECOMPOSED,
                    json!({
                        "changed": true,
                        "prompt_chars": next.rendered_prompt.chars().count(),
                    }),
                );
                self.plan = Some(next.clone());
                Ok(next)
            }
            Err(err) => {
                self.emit(
                    events::PROMPT_RECOMPOSE_FAILED,
                    json!({ "phase": err.phase().as_str(), "error": err.to_string() }),
                );
                Err(err.into())
            }
        }
    }

    pub fn issue_image_ticket(
        &mut self,
        backend: BackendVariant,
    ) -> Result<ImageTicket, SessionError> {
        let plan = self.require_plan()?;
        self.token += 1;
        Ok(ImageTicket {
            token: self.token,
            backend,
            plan,
        })
    }

    /// Runs the dispatch for `ticket`. The credential is read now, not when
    /// the ticket was issued.
    pub fn dispatch_image(&self, ticket: &ImageTicket) -> Result<GenerationResult, SessionError> {
        let credential = self.active_credential()?;
        Ok(dispatch::generate_image(
            self.transport.as_ref(),
            &self.config,
            &ticket.plan.rendered_prompt,
            &credential,
            ticket.backend,
        ))
    }

    /// Stores `result` if `ticket` is still the latest; returns whether it was.
    pub fn accept_image(&mut self, ticket: ImageTicket, result: GenerationResult) -> bool {
        let backend = ticket.backend;
        if ticket.token != self.token {
            info!(
                "discarding {} result for token {} (latest is {})",
                result.label(),
                ticket.token,
                self.token
            );
            self.emit(
                events::IMAGE_DISCARDED,
                json!({
                    "backend": backend.as_str(),
                    "token": ticket.token,
                    "latest_token": self.token,
                    "result": result.label(),
                }),
            );
            return false;
        }

        let model = self.config.image_model(backend).to_string();
        match result {
            GenerationResult::Image(image) => {
                self.emit(
                    events::IMAGE_GENERATED,
                    json!({
                        "backend": backend.as_str(),
                        "model": model,
                        "mime_type": image.mime_type,
                        "bytes": image.bytes.len(),
                        "token": ticket.token,
                    }),
                );
                self.image = Some(SessionImage {
                    image,
                    backend,
                    model,
                    plan: ticket.plan,
                });
            }
            GenerationResult::Empty => {
                self.emit(
                    events::IMAGE_EMPTY,
                    json!({ "backend": backend.as_str(), "model": model, "token": ticket.token }),
                );
            }
            GenerationResult::Failure(err) => {
                self.emit(
                    events::IMAGE_FAILED,
                    json!({
                        "backend": backend.as_str(),
                        "model": model,
                        "kind": err.kind.as_str(),
                        "message": err.raw_message,
                        "suggested_backend": err.suggested_backend().as_str(),
                        "token": ticket.token,
                    }),
                );
            }
        }
        true
    }

    /// Issue, dispatch and accept in one go.
    pub fn generate_image(
        &mut self,
        backend: BackendVariant,
    ) -> Result<GenerationResult, SessionError> {
        let ticket = self.issue_image_ticket(backend)?;
        let result = self.dispatch_image(&ticket)?;
        self.accept_image(ticket, result.clone());
        Ok(result)
    }

    pub fn verify(&self, credential: &Credential) -> bool {
        let ok = verify::verify(self.transport.as_ref(), &self.config, credential);
        self.emit(
            events::CREDENTIAL_VERIFIED,
            json!({
                "source": credential.source().as_str(),
                "credential": credential.masked(),
                "ok": ok,
            }),
        );
        ok
    }

    pub fn verify_active(&self) -> Result<bool, SessionError> {
        let credential = self.active_credential()?;
        Ok(self.verify(&credential))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use toonsmith_contracts::backends::BackendVariant;
    use toonsmith_contracts::credentials::{CredentialSource, CredentialStore};
    use toonsmith_contracts::events::EventLog;
    use toonsmith_contracts::plan::PlanEdit;
    use toonsmith_contracts::results::{GenerationResult, ImageErrorKind};
    use toonsmith_contracts::styles::ArtStyle;

    use super::Session;
    use crate::config::EngineConfig;
    use crate::error::SessionError;
    use crate::testing::{image_reply, planner_reply, sample_plan, text_reply};
    use crate::transport::scripted::{status_error, ScriptedTransport};

    struct Harness {
        _temp: tempfile::TempDir,
        transport: Arc<ScriptedTransport>,
        events_path: std::path::PathBuf,
        session: Session,
    }

    fn harness(platform_env: &str) -> anyhow::Result<Harness> {
        let temp = tempfile::tempdir()?;
        let store = CredentialStore::new(temp.path().join("credentials.json"))
            .with_platform_env([platform_env]);
        store.set_user_key("user-key-1111")?;
        let transport = Arc::new(ScriptedTransport::new());
        let events_path = temp.path().join("events.jsonl");
        let session = Session::new(EngineConfig::default(), store, transport.clone())
            .with_event_log(EventLog::new(&events_path, "test-session"));
        Ok(Harness {
            _temp: temp,
            transport,
            events_path,
            session,
        })
    }

    fn event_types(path: &std::path::Path) -> anyhow::Result<Vec<String>> {
        let raw = std::fs::read_to_string(path)?;
        let mut out = Vec::new();
        for line in raw.lines() {
            let row: Value = serde_json::from_str(line)?;
            out.push(row["type"].as_str().unwrap_or_default().to_string());
        }
        Ok(out)
    }

    #[test]
    fn blank_subject_is_rejected_before_any_call() -> anyhow::Result<()> {
        let mut h = harness("TOONSMITH_TEST_SESSION_UNSET_A")?;
        let result = h.session.create_plan("   ", ArtStyle::Anime);
        assert!(matches!(result, Err(SessionError::EmptySubject)));
        assert!(h.transport.calls().is_empty());
        Ok(())
    }

    #[test]
    fn create_edit_recompose_flow() -> anyhow::Result<()> {
        let mut h = harness("TOONSMITH_TEST_SESSION_UNSET_B")?;
        h.transport.push(Ok(planner_reply("anime comic --ar 9:16")));
        let plan = h.session.create_plan("페라이트 코어의 원리", ArtStyle::Anime)?;
        assert_eq!(plan.art_style, ArtStyle::Anime);
        assert_eq!(plan.story_beats.len(), 4);

        let edited = h
            .session
            .apply_edit(PlanEdit::OutroDialogue("또 만나요".to_string()))?;
        assert!(edited.is_prompt_stale());
        // readers holding the old Arc still see the old plan
        assert_eq!(plan.outro.dialogue, "안녕");
        let edited = h.session.apply_edit(PlanEdit::Dialogue {
            panel: 0,
            text: "바뀐 대사".to_string(),
        })?;
        assert_ne!(plan.dialogues[0], edited.dialogues[0]);

        h.transport
            .push(Ok(text_reply("masterpiece, vertical comic strip --ar 9:16")));
        let recomposed = h.session.recompose()?;
        assert!(!recomposed.is_prompt_stale());
        assert!(recomposed.rendered_prompt.contains("\"바뀐 대사\""));

        assert_eq!(
            event_types(&h.events_path)?,
            vec!["plan_created", "plan_edited", "plan_edited", "prompt_recomposed"]
        );
        Ok(())
    }

    #[test]
    fn failed_synthesis_leaves_no_plan() -> anyhow::Result<()> {
        let mut h = harness("TOONSMITH_TEST_SESSION_UNSET_C")?;
        h.session.replace_plan(sample_plan());
        h.transport.push(Ok(text_reply("not json")));
        let result = h.session.create_plan("magnets", ArtStyle::Instatoon);
        assert!(matches!(result, Err(SessionError::Generation(_))));
        assert!(h.session.plan().is_none());
        assert_eq!(event_types(&h.events_path)?, vec!["plan_failed"]);
        Ok(())
    }

    #[test]
    fn failed_recompose_keeps_previous_prompt() -> anyhow::Result<()> {
        let mut h = harness("TOONSMITH_TEST_SESSION_UNSET_D")?;
        let original = h.session.replace_plan(sample_plan());
        let edited = h
            .session
            .apply_edit(PlanEdit::MainColor("deep navy".to_string()))?;
        h.transport.push(Err(status_error(500, "INTERNAL")));
        assert!(h.session.recompose().is_err());
        let live = h.session.plan();
        assert_eq!(
            live.as_ref().map(|plan| plan.rendered_prompt.clone()),
            Some(original.rendered_prompt.clone())
        );
        assert_eq!(live.map(|plan| plan.main_color.clone()), Some(edited.main_color.clone()));
        Ok(())
    }

    #[test]
    fn stale_image_results_are_discarded() -> anyhow::Result<()> {
        let mut h = harness("TOONSMITH_TEST_SESSION_UNSET_E")?;
        h.session.replace_plan(sample_plan());

        let old_ticket = h.session.issue_image_ticket(BackendVariant::StandardPro)?;
        h.transport.push(Ok(image_reply("AQID")));
        let old_result = h.session.dispatch_image(&old_ticket)?;

        // a newer plan supersedes the in-flight request
        h.transport.push(Ok(planner_reply("p")));
        h.session.create_plan("magnets", ArtStyle::ThreeD)?;
        assert!(!h.session.accept_image(old_ticket, old_result));
        assert!(h.session.image().is_none());

        h.transport.push(Ok(image_reply("BAUG")));
        let result = h.session.generate_image(BackendVariant::StandardFast)?;
        assert!(result.image().is_some());
        assert_eq!(
            h.session.image().map(|image| image.backend),
            Some(BackendVariant::StandardFast)
        );
        assert_eq!(
            event_types(&h.events_path)?,
            vec!["plan_created", "image_discarded", "image_generated"]
        );
        Ok(())
    }

    #[test]
    fn failure_keeps_last_good_image() -> anyhow::Result<()> {
        let mut h = harness("TOONSMITH_TEST_SESSION_UNSET_F")?;
        h.session.replace_plan(sample_plan());
        h.transport.push(Ok(image_reply("AQID")));
        h.session.generate_image(BackendVariant::StandardPro)?;

        h.transport
            .push(Err(status_error(403, "PERMISSION_DENIED")));
        let result = h.session.generate_image(BackendVariant::StandardPro)?;
        assert_eq!(
            result.failure().map(|err| err.kind),
            Some(ImageErrorKind::AccessDenied)
        );
        assert_eq!(
            h.session.image().map(|image| image.image.bytes.clone()),
            Some(vec![1, 2, 3])
        );

        h.transport.push(Ok(serde_json::json!({"candidates": []})));
        let result = h.session.generate_image(BackendVariant::AlternateEngine)?;
        assert_eq!(result, GenerationResult::Empty);
        Ok(())
    }

    #[test]
    fn credential_switch_applies_to_next_dispatch() -> anyhow::Result<()> {
        std::env::set_var("TOONSMITH_TEST_SESSION_PLATFORM_KEY", "platform-key-2222");
        let mut h = harness("TOONSMITH_TEST_SESSION_PLATFORM_KEY")?;
        h.session.replace_plan(sample_plan());

        h.transport.push(Ok(image_reply("AQID")));
        h.session.generate_image(BackendVariant::StandardFast)?;

        // switched through a second handle on the same file
        let other = CredentialStore::new(h.session.store().path());
        other.set_active_source(CredentialSource::Platform)?;

        h.transport.push(Ok(image_reply("AQID")));
        h.session.generate_image(BackendVariant::StandardFast)?;

        let used: Vec<String> = h
            .transport
            .calls()
            .into_iter()
            .map(|call| call.credential)
            .collect();
        assert_eq!(used, vec!["user-key-1111", "platform-key-2222"]);
        Ok(())
    }

    #[test]
    fn missing_credential_fails_before_network() -> anyhow::Result<()> {
        let mut h = harness("TOONSMITH_TEST_SESSION_UNSET_G")?;
        h.session.store().clear_user_key()?;
        h.session.replace_plan(sample_plan());
        assert!(matches!(
            h.session.generate_image(BackendVariant::StandardPro),
            Err(SessionError::Credential(_))
        ));
        assert!(matches!(
            h.session.create_plan("magnets", ArtStyle::Anime),
            Err(SessionError::Credential(_))
        ));
        assert!(matches!(h.session.verify_active(), Err(SessionError::Credential(_))));
        assert!(h.transport.calls().is_empty());
        // the plan survives a rejected create
        assert!(h.session.plan().is_some());
        Ok(())
    }

    #[test]
    fn verify_records_outcome_without_secret() -> anyhow::Result<()> {
        let h = harness("TOONSMITH_TEST_SESSION_UNSET_H")?;
        h.transport.push(Ok(serde_json::json!({})));
        assert!(h.session.verify_active()?);
        h.transport.push(Err(status_error(400, "API_KEY_INVALID")));
        assert!(!h.session.verify_active()?);

        let raw = std::fs::read_to_string(&h.events_path)?;
        assert!(!raw.contains("user-key-1111"));
        assert!(raw.contains("…1111"));
        Ok(())
    }
}
