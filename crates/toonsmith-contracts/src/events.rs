use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

pub const CREDENTIAL_VERIFIED: &str = "credential_verified";
pub const PLAN_CREATED: &str = "plan_created";
pub const PLAN_FAILED: &str = "plan_failed";
pub const PLAN_EDITED: &str = "plan_edited";
pub const PROMPT_RECOMPOSED: &str = "prompt_recomposed";
pub const PROMPT_RECOMPOSE_FAILED: &str = "prompt_recompose_failed";
pub const IMAGE_GENERATED: &str = "image_generated";
pub const IMAGE_EMPTY: &str = "image_empty";
pub const IMAGE_FAILED: &str = "image_failed";
pub const IMAGE_DISCARDED: &str = "image_discarded";

/// Append-only JSONL log for one session. Every row carries `type`,
/// `session_id`, a 1-based `seq` and `ts`; payload keys are applied on top.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    path: PathBuf,
    session_id: String,
    seq: AtomicU64,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                path: path.into(),
                session_id: session_id.into(),
                seq: AtomicU64::new(0),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Log with a fresh random session id.
    pub fn with_random_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, uuid::Uuid::new_v4().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut event: EventPayload = [
            ("type", Value::from(event_type)),
            ("session_id", Value::from(self.inner.session_id.as_str())),
            ("seq", Value::from(seq)),
            ("ts", Value::from(timestamp())),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
        event.extend(payload);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = EventLog::new(&path, "session-1");

        let mut payload = EventPayload::new();
        payload.insert("style".to_string(), Value::String("anime".to_string()));
        let emitted = log.emit(PLAN_CREATED, payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("plan_created".to_string()));
        assert_eq!(parsed["session_id"], Value::String("session-1".to_string()));
        assert_eq!(parsed["seq"], Value::from(1));
        assert_eq!(parsed["style"], Value::String("anime".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn sequence_increases_across_clones() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let log = EventLog::with_random_session(&path);
        let clone = log.clone();

        log.emit(PLAN_EDITED, EventPayload::new())?;
        clone.emit(IMAGE_FAILED, EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let rows: Vec<Value> = content
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["seq"], Value::from(1));
        assert_eq!(rows[1]["seq"], Value::from(2));
        assert_eq!(rows[0]["session_id"], rows[1]["session_id"]);
        assert_eq!(rows[1]["type"], Value::String("image_failed".to_string()));
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = EventLog::new(temp.path().join("events.jsonl"), "session-1");

        let mut payload = EventPayload::new();
        payload.insert(
            "session_id".to_string(),
            Value::String("override".to_string()),
        );
        let emitted = log.emit(PLAN_FAILED, payload)?;
        assert_eq!(emitted["session_id"], Value::String("override".to_string()));
        Ok(())
    }
}
