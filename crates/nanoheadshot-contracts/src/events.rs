use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Everything the workflow records about one session, as a closed
/// vocabulary. Upload outcomes only exist here: they are never part of
/// session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ImageSelected { mime_type: String, bytes: usize },
    ImageReadFailed { error: String },
    ImageCleared,
    StyleSelected { style: String },
    CustomPromptSet { chars: usize },
    GenerateStarted { style: String, backend: String },
    GenerateRejected { reason: String },
    GenerateSucceeded,
    GenerateFailed { error: String },
    UploadForwarded { filename: String },
    UploadFailed { filename: String, error: String },
    ResultReset,
}

impl WorkflowEvent {
    /// The `type` tag this event serializes under.
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::ImageSelected { .. } => "image_selected",
            WorkflowEvent::ImageReadFailed { .. } => "image_read_failed",
            WorkflowEvent::ImageCleared => "image_cleared",
            WorkflowEvent::StyleSelected { .. } => "style_selected",
            WorkflowEvent::CustomPromptSet { .. } => "custom_prompt_set",
            WorkflowEvent::GenerateStarted { .. } => "generate_started",
            WorkflowEvent::GenerateRejected { .. } => "generate_rejected",
            WorkflowEvent::GenerateSucceeded => "generate_succeeded",
            WorkflowEvent::GenerateFailed { .. } => "generate_failed",
            WorkflowEvent::UploadForwarded { .. } => "upload_forwarded",
            WorkflowEvent::UploadFailed { .. } => "upload_failed",
            WorkflowEvent::ResultReset => "result_reset",
        }
    }
}

/// Append-only JSONL diagnostic log for one workflow session: one compact
/// object per line, the event's own fields plus `session_id` and `ts`
/// (RFC 3339).
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn record(&self, event: &WorkflowEvent) -> Result<Value> {
        let mut row = match serde_json::to_value(event).context("event serialization failed")? {
            Value::Object(map) => map,
            other => anyhow::bail!("event did not serialize to an object: {other}"),
        };
        row.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        row.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&row)?;
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

        Ok(Value::Object(row))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
